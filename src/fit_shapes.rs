//! Collect prefit and postfit shapes of several analyses in one file
//!
//! For every analysis and channel the prefit shapes are copied to
//! `<analysis>/prefit/<channel>`. The postfit shapes from the fit result
//! are re-expressed on the prefit binning of the channel and written to
//! `<analysis>/postfit/<channel>`, together with a copy of the observed
//! data.
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::{read_yaml, ConfigError},
    container::{ContainerError, Directory, Entry, HistogramFile},
    histogram::{Histogram, HistogramError, RebinPolicy},
};

/// Name of the observed data histogram in prefit files
pub const DATA_OBS: &str = "data_obs";

/// Postfit objects that are not shapes
const POSTFIT_SKIP: [&str; 2] = ["data", "total_covar"];

/// Settings for collecting fit shapes
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FitShapesConfig {
    /// Analyses to collect
    pub analyses: Vec<AnalysisConfig>,
    /// How to bring postfit shapes onto the prefit binning
    #[serde(default = "default_rebin")]
    pub rebin: RebinPolicy,
}

fn default_rebin() -> RebinPolicy {
    RebinPolicy::Positional
}

/// One analysis with its channels and fit result
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Name of the analysis, used as top-level output directory
    pub name: String,
    /// File with the fit result
    pub fit_result: PathBuf,
    /// Channels by name
    pub channels: IndexMap<String, ChannelConfig>,
}

/// Input of one analysis channel
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// File with the prefit shapes
    pub prefit: PathBuf,
    /// Directory of the channel inside the fit result,
    /// e.g. `shapes_fit_s/WlnHbb_Wen_SR`
    pub fit_directory: String,
}

impl FitShapesConfig {
    /// Read settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_yaml(path.as_ref())
    }
}

/// Prefit shapes in a file
///
/// If the first object in the file is a directory, the shapes are taken
/// from that directory. Objects with `cms` in their name (ignoring case)
/// are nuisance templates and skipped.
pub fn prefit_shapes(file: &HistogramFile) -> Vec<(String, Histogram)> {
    let dir = match file.root().first() {
        Some((name, Entry::Directory(dir))) => {
            debug!("Reading prefit shapes from {:?}/{name}", file.path());
            dir
        }
        _ => file.root(),
    };
    dir.histograms()
        .filter(|(name, _)| !name.to_lowercase().contains("cms"))
        .map(|(name, h)| (name.to_owned(), h.clone()))
        .collect()
}

/// Postfit shapes in a directory of a fit result, on the given binning
pub fn postfit_shapes(
    file: &HistogramFile,
    directory: &str,
    edges: &[f64],
    policy: RebinPolicy,
) -> Result<Vec<(String, Histogram)>, FitShapesError> {
    let dir = file.directory(directory)?;
    dir.histograms()
        .filter(|(name, _)| !POSTFIT_SKIP.contains(name))
        .map(|(name, h)| {
            let rebinned = h.rebin_onto(edges, policy).map_err(|source| {
                FitShapesError::Rebin {
                    path: format!("{directory}/{name}"),
                    source,
                }
            })?;
            Ok((name.to_owned(), rebinned))
        })
        .collect()
}

struct Channel {
    edges: Vec<f64>,
    data: Histogram,
}

/// Collect all prefit and postfit shapes into one directory tree
pub fn extract_fit_shapes(
    cfg: &FitShapesConfig,
) -> Result<Directory, FitShapesError> {
    let mut res = Directory::new();
    for analysis in &cfg.analyses {
        info!("Collecting shapes for {}", analysis.name);
        let mut channels = IndexMap::new();
        for (channel, channel_cfg) in &analysis.channels {
            let file = HistogramFile::open(&channel_cfg.prefit)?;
            let shapes = prefit_shapes(&file);
            let Some((_, first)) = shapes.first() else {
                return Err(FitShapesError::NoShapes(channel_cfg.prefit.clone()));
            };
            let edges = first.edges().to_vec();
            let Some((_, data)) =
                shapes.iter().find(|(name, _)| name == DATA_OBS)
            else {
                return Err(FitShapesError::NoData(channel_cfg.prefit.clone()));
            };
            let data = data.clone();
            debug!("{channel}: {} prefit shapes", shapes.len());

            let outdir = res.mkdir(&format!("{}/prefit/{channel}", analysis.name))?;
            for (name, shape) in shapes {
                outdir.insert(name, shape);
            }
            channels.insert(channel, Channel { edges, data });
        }

        let fit = HistogramFile::open(&analysis.fit_result)?;
        for (channel, channel_cfg) in &analysis.channels {
            let Some(Channel { edges, data }) = channels.get(channel) else {
                continue;
            };
            let shapes =
                postfit_shapes(&fit, &channel_cfg.fit_directory, edges, cfg.rebin)?;
            debug!("{channel}: {} postfit shapes", shapes.len());

            let outdir =
                res.mkdir(&format!("{}/postfit/{channel}", analysis.name))?;
            for (name, shape) in shapes {
                outdir.insert(name, shape);
            }
            outdir.insert(DATA_OBS, data.clone());
        }
    }
    Ok(res)
}

/// Error collecting fit shapes
#[derive(Debug, Error)]
pub enum FitShapesError {
    /// Failed to read a histogram file
    #[error(transparent)]
    Container(#[from] ContainerError),
    /// Prefit file without shapes
    #[error("No prefit shapes in {0:?}")]
    NoShapes(PathBuf),
    /// Prefit file without observed data
    #[error("No data_obs histogram in {0:?}")]
    NoData(PathBuf),
    /// Postfit shape incompatible with the prefit binning
    #[error("Failed to rebin postfit shape {path}")]
    Rebin {
        /// Path inside the fit result
        path: String,
        /// Reason
        source: HistogramError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use crate::{compression::Compression, container::write_histogram_file};

    const ZNN_PREFIT: &str = "
Znn_13TeV_Signal:
  ZH_hbb:
    edges: [-0.8, 0, 1]
    contents: [1, 3]
  TT:
    edges: [-0.8, 0, 1]
    contents: [30, 4]
  TT_CMS_scale_jUp:
    edges: [-0.8, 0, 1]
    contents: [31, 4]
  data_obs:
    edges: [-0.8, 0, 1]
    contents: [33, 8]
";

    const WEN_PREFIT: &str = "
WH_hbb:
  edges: [-1, 0.5, 1]
  contents: [1, 2]
data_obs:
  edges: [-1, 0.5, 1]
  contents: [10, 5]
";

    const FIT: &str = "
shapes_fit_s:
  ZnnHbb_Signal:
    ZH_hbb:
      edges: [0, 1, 2]
      contents: [1.2, 3.5]
      errors: [0.1, 0.2]
    TT:
      edges: [0, 1, 2]
      contents: [28, 4.5]
    total_covar:
      edges: [0, 1, 2, 3, 4]
      contents: [1, 1, 1, 1]
    data:
      edges: [0, 1, 2]
      contents: [33, 8]
  WlnHbb_Wen_SR:
    WH_hbb:
      edges: [0, 1, 2]
      contents: [1.1, 2.1]
";

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn config(dir: &Path) -> FitShapesConfig {
        fs::write(dir.join("znn.yaml"), ZNN_PREFIT).unwrap();
        fs::write(dir.join("wen.yaml"), WEN_PREFIT).unwrap();
        fs::write(dir.join("mlfit.yaml"), FIT).unwrap();
        let yaml = format!(
            "
analyses:
  - name: VH
    fit_result: {dir}/mlfit.yaml
    channels:
      Znn:
        prefit: {dir}/znn.yaml
        fit_directory: shapes_fit_s/ZnnHbb_Signal
      Wen:
        prefit: {dir}/wen.yaml
        fit_directory: shapes_fit_s/WlnHbb_Wen_SR
",
            dir = dir.display()
        );
        let path = dir.join("fit_shapes.yaml");
        fs::write(&path, yaml).unwrap();
        FitShapesConfig::from_file(&path).unwrap()
    }

    #[test]
    fn prefit() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        assert_eq!(cfg.rebin, RebinPolicy::Positional);

        let znn = HistogramFile::open(&cfg.analyses[0].channels["Znn"].prefit)
            .unwrap();
        let names: Vec<_> =
            prefit_shapes(&znn).into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["ZH_hbb", "TT", "data_obs"]);

        let wen = HistogramFile::open(&cfg.analyses[0].channels["Wen"].prefit)
            .unwrap();
        assert_eq!(prefit_shapes(&wen).len(), 2);
    }

    #[test]
    fn extract() {
        log_init();
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        let shapes = extract_fit_shapes(&cfg).unwrap();

        let prefit = shapes.directory("VH/prefit/Znn").unwrap();
        assert_eq!(prefit.len(), 3);

        let postfit = shapes.directory("VH/postfit/Znn").unwrap();
        let names: Vec<_> = postfit.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["ZH_hbb", "TT", "data_obs"]);
        let zh = postfit.histogram("ZH_hbb").unwrap();
        assert_eq!(zh.edges(), &[-0.8, 0., 1.]);
        assert_eq!(zh.contents(), &[1.2, 3.5]);
        assert_eq!(zh.bin_error(2), 0.2);
        assert_eq!(
            postfit.histogram("data_obs").unwrap(),
            prefit.histogram("data_obs").unwrap()
        );

        let wh = shapes.histogram("VH/postfit/Wen/WH_hbb").unwrap();
        assert_eq!(wh.edges(), &[-1., 0.5, 1.]);

        let top: Vec<_> = shapes
            .directory("VH")
            .unwrap()
            .iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(top, ["prefit", "postfit"]);

        let out = tmp.path().join("fit_shapes.json.gz");
        write_histogram_file(&shapes, &out, Some(Compression::Gzip(6))).unwrap();
        assert_eq!(HistogramFile::open(&out).unwrap().root(), &shapes);
    }

    #[test]
    fn errors() {
        log_init();
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config(tmp.path());

        let mut strict = cfg.clone();
        strict.rebin = RebinPolicy::Strict;
        assert!(matches!(
            extract_fit_shapes(&strict),
            Err(FitShapesError::Rebin { .. })
        ));

        let no_data = "WH_hbb:\n  edges: [-1, 1]\n  contents: [3]\n";
        fs::write(tmp.path().join("wen.yaml"), no_data).unwrap();
        assert!(matches!(
            extract_fit_shapes(&cfg),
            Err(FitShapesError::NoData(_))
        ));

        cfg.analyses[0].channels["Znn"].fit_directory =
            "shapes_fit_b/ZnnHbb_Signal".to_owned();
        fs::write(tmp.path().join("wen.yaml"), WEN_PREFIT).unwrap();
        assert!(matches!(
            extract_fit_shapes(&cfg),
            Err(FitShapesError::Container(_))
        ));
    }
}
