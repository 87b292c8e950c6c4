use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::shapes::ShapeConfig;

/// Settings for adding S/(S+B) weights
///
/// Every setting has a default, so a configuration file only needs to
/// list the ones that differ.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where to find the signal and background shapes
    pub shapes: ShapeConfig,
    /// Column holding the discriminant score, e.g. `BDT.Nominal`
    pub score_column: String,
    /// Log progress after this many events
    pub progress_interval: u64,
    /// Warn about weights above this value
    pub anomaly_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shapes: ShapeConfig::default(),
            score_column: "BDT_Znn_HighPt.Nominal".to_owned(),
            progress_interval: 1000,
            anomaly_threshold: 10.,
        }
    }
}

impl Config {
    /// Read settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_yaml(path.as_ref())
    }
}

/// Read a YAML configuration file into `T`
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    debug!("Reading configuration from {path:?}");
    let file = File::open(path)
        .map_err(|err| ConfigError::Open(path.to_owned(), err))?;
    serde_yaml::from_reader(BufReader::new(file))
        .map_err(|err| ConfigError::Parse(path.to_owned(), err))
}

/// Error reading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to open the file
    #[error("Failed to open configuration file {0:?}")]
    Open(PathBuf, #[source] std::io::Error),
    /// Invalid YAML or unknown settings
    #[error("Failed to parse configuration file {0:?}")]
    Parse(PathBuf, #[source] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::histogram::RebinPolicy;

    #[test]
    fn defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.shapes.signal_region, "Znn_13TeV_Signal");
        assert_eq!(
            cfg.shapes.signal_processes,
            ["ZH_hbb", "WH_hbb", "ggZH_hbb"]
        );
        assert_eq!(cfg.shapes.fit_region, "Znn_SR");
        assert_eq!(cfg.shapes.rebin, RebinPolicy::Strict);
        assert_eq!(cfg.score_column, "BDT_Znn_HighPt.Nominal");
    }

    #[test]
    fn from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sb.yaml");
        std::fs::write(
            &path,
            "
shapes:
  signal_shapes: shapes/Wen.yaml
  signal_region: WenHighPt
  signal_processes: [WH_hbb]
  fit_region: WlnHbb_Wen_SR
  rebin: positional
score_column: BDT_Wen[0]
progress_interval: 10000
",
        )
        .unwrap();
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.shapes.signal_shapes, Path::new("shapes/Wen.yaml"));
        assert_eq!(cfg.shapes.signal_processes, ["WH_hbb"]);
        assert_eq!(cfg.shapes.fit_directory, "shapes_fit_s");
        assert_eq!(cfg.shapes.rebin, RebinPolicy::Positional);
        assert_eq!(cfg.score_column, "BDT_Wen[0]");
        assert_eq!(cfg.progress_interval, 10000);
        assert_eq!(cfg.anomaly_threshold, 10.);

        std::fs::write(&path, "shapes:\n  region: Znn\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse(..))
        ));
        assert!(matches!(
            Config::from_file(tmp.path().join("missing.yaml")),
            Err(ConfigError::Open(..))
        ));
    }
}
