use std::path::PathBuf;

use clap::Parser;
use sbweight::{
    compression::Compression,
    config::{Config, ConfigError},
    histogram::RebinPolicy,
};

use crate::opt_common::{COMPRESSION_HELP, LOGLEVEL_HELP};

#[derive(Debug, Parser)]
#[clap(about, author, version)]
pub(crate) struct Opt {
    /// Configuration file.
    ///
    /// Settings given on the command line take precedence.
    #[clap(short, long, value_parser)]
    pub(crate) config: Option<PathBuf>,

    /// Column with the discriminant score.
    ///
    /// Use 'name.leaf' for a field of a struct column and 'name[i]'
    /// for an element of a list column.
    #[clap(short, long)]
    pub(crate) score_column: Option<String>,

    /// File with the prefit signal shapes.
    #[clap(long, value_parser)]
    pub(crate) signal_shapes: Option<PathBuf>,

    /// File with the fit result.
    #[clap(long, value_parser)]
    pub(crate) fit_result: Option<PathBuf>,

    #[clap(
        long,
        help = "How to bring the postfit background onto the signal binning.
Possible settings are 'strict' (bin edges have to agree) and
'positional' (copy bin contents by index, the number of bins
has to agree)."
    )]
    pub(crate) rebin: Option<RebinPolicy>,

    #[clap(long, help = COMPRESSION_HELP)]
    pub(crate) compression: Option<Compression>,

    /// Verbosity level
    #[clap(short, long, default_value = "Info", help = LOGLEVEL_HELP)]
    pub(crate) loglevel: String,

    /// Input event table
    #[clap(name = "INFILE", value_parser)]
    pub(crate) infile: PathBuf,

    /// Output event table
    #[clap(name = "OUTFILE", value_parser)]
    pub(crate) outfile: PathBuf,
}

impl Opt {
    /// Settings from the configuration file, overridden by the command line
    pub(crate) fn settings(&self) -> Result<Config, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(score_column) = &self.score_column {
            cfg.score_column = score_column.clone();
        }
        if let Some(signal_shapes) = &self.signal_shapes {
            cfg.shapes.signal_shapes = signal_shapes.clone();
        }
        if let Some(fit_result) = &self.fit_result {
            cfg.shapes.fit_result = fit_result.clone();
        }
        if let Some(rebin) = self.rebin {
            cfg.shapes.rebin = rebin;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    #[test]
    fn command_line_overrides_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sb.yaml");
        std::fs::write(
            &path,
            "
shapes:
  signal_shapes: shapes/Wen.yaml
  fit_result: fits/mlfit.yaml
  rebin: positional
score_column: BDT_Wen.Nominal
progress_interval: 500
",
        )
        .unwrap();
        let config = path.to_str().unwrap();

        let opt = Opt::parse_from([
            "sb-weight",
            "--config",
            config,
            "--score-column",
            "BDT_Wen[1]",
            "--rebin",
            "strict",
            "in.parquet",
            "out.parquet",
        ]);
        let cfg = opt.settings().unwrap();
        assert_eq!(cfg.score_column, "BDT_Wen[1]");
        assert_eq!(cfg.shapes.rebin, RebinPolicy::Strict);
        assert_eq!(cfg.shapes.signal_shapes, Path::new("shapes/Wen.yaml"));
        assert_eq!(cfg.shapes.fit_result, Path::new("fits/mlfit.yaml"));
        assert_eq!(cfg.progress_interval, 500);
        assert_eq!(cfg.anomaly_threshold, Config::default().anomaly_threshold);
        assert_eq!(cfg.shapes.fit_region, Config::default().shapes.fit_region);

        let opt = Opt::parse_from([
            "sb-weight",
            "--fit-result",
            "other.yaml",
            "in.parquet",
            "out.parquet",
        ]);
        let cfg = opt.settings().unwrap();
        let defaults = Config::default();
        assert_eq!(cfg.shapes.fit_result, Path::new("other.yaml"));
        assert_eq!(cfg.shapes.signal_shapes, defaults.shapes.signal_shapes);
        assert_eq!(cfg.score_column, defaults.score_column);
        assert_eq!(cfg.shapes.rebin, RebinPolicy::Strict);
    }
}
