//! Total signal and background shapes of a signal region
use std::path::PathBuf;

use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    container::{ContainerError, HistogramFile},
    histogram::{Histogram, HistogramError, RebinPolicy},
};

/// Where to find the signal and background shapes
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShapeConfig {
    /// File with the prefit signal shapes
    pub signal_shapes: PathBuf,
    /// Directory of the signal region inside `signal_shapes`
    pub signal_region: String,
    /// Signal processes to sum up
    pub signal_processes: Vec<String>,
    /// File with the fit result
    pub fit_result: PathBuf,
    /// Directory with the postfit shapes inside `fit_result`
    pub fit_directory: String,
    /// Region inside `fit_directory`
    pub fit_region: String,
    /// Name of the total background shape
    pub background: String,
    /// How to bring the background onto the signal binning
    pub rebin: RebinPolicy,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            signal_shapes: "vhbb_TH_Znn_13TeV_Signal.yaml".into(),
            signal_region: "Znn_13TeV_Signal".to_owned(),
            signal_processes: ["ZH_hbb", "WH_hbb", "ggZH_hbb"]
                .map(String::from)
                .to_vec(),
            fit_result: "mlfit.yaml".into(),
            fit_directory: "shapes_fit_s".to_owned(),
            fit_region: "Znn_SR".to_owned(),
            background: "total_background".to_owned(),
            rebin: RebinPolicy::default(),
        }
    }
}

/// Sum of the prefit shapes of the given processes in a region
///
/// Every process has to be present as `<region>/<process>`.
pub fn total_signal_prefit<S: AsRef<str>>(
    file: &HistogramFile,
    region: &str,
    processes: &[S],
) -> Result<Histogram, ShapeError> {
    let Some((first, rest)) = processes.split_first() else {
        return Err(ShapeError::NoSignalProcesses);
    };
    debug!(
        "Summing signal processes {} in {region}",
        processes.iter().map(|p| p.as_ref()).join(", ")
    );
    let mut total = signal_shape(file, region, first.as_ref())?.clone();
    for process in rest {
        let shape = signal_shape(file, region, process.as_ref())?;
        total.add(shape).map_err(|source| ShapeError::Combine {
            process: process.as_ref().to_owned(),
            source,
        })?;
    }
    info!(
        "Total prefit signal in {region}: {} events in {} bins",
        total.integral(),
        total.nbins()
    );
    Ok(total)
}

fn signal_shape<'a>(
    file: &'a HistogramFile,
    region: &str,
    process: &str,
) -> Result<&'a Histogram, ShapeError> {
    Ok(file.histogram(&format!("{region}/{process}"))?)
}

/// Postfit background shape on the given bin edges
///
/// Reads `<directory>/<region>/<name>` from the fit result.
pub fn total_background_postfit(
    file: &HistogramFile,
    directory: &str,
    region: &str,
    name: &str,
    edges: &[f64],
    policy: RebinPolicy,
) -> Result<Histogram, ShapeError> {
    let path = format!("{directory}/{region}/{name}");
    let background = file.histogram(&path)?;
    debug!(
        "Rebinning {path} with {} bins onto {} bins ({policy})",
        background.nbins(),
        edges.len().saturating_sub(1)
    );
    let res = background
        .rebin_onto(edges, policy)
        .map_err(|source| ShapeError::Rebin { path, source })?;
    info!(
        "Total postfit background in {region}: {} events",
        res.integral()
    );
    Ok(res)
}

/// Signal and background shapes with identical binning
#[derive(Clone, Debug, PartialEq)]
pub struct SbShapes {
    /// Total prefit signal
    pub signal: Histogram,
    /// Total postfit background
    pub background: Histogram,
}

impl SbShapes {
    /// Load both shapes
    pub fn load(cfg: &ShapeConfig) -> Result<Self, ShapeError> {
        info!("Reading signal shapes from {:?}", cfg.signal_shapes);
        let signal_file = HistogramFile::open(&cfg.signal_shapes)?;
        let signal = total_signal_prefit(
            &signal_file,
            &cfg.signal_region,
            &cfg.signal_processes,
        )?;

        info!("Reading fit result from {:?}", cfg.fit_result);
        let fit_file = HistogramFile::open(&cfg.fit_result)?;
        let background = total_background_postfit(
            &fit_file,
            &cfg.fit_directory,
            &cfg.fit_region,
            &cfg.background,
            signal.edges(),
            cfg.rebin,
        )?;
        Ok(Self { signal, background })
    }
}

/// Error obtaining signal or background shapes
#[derive(Debug, Error)]
pub enum ShapeError {
    /// Failed to read a shape
    #[error(transparent)]
    Container(#[from] ContainerError),
    /// No signal processes to sum
    #[error("No signal processes given")]
    NoSignalProcesses,
    /// Signal process with a different binning
    #[error("Failed to add signal process {process}")]
    Combine {
        /// Offending process
        process: String,
        /// Reason
        source: HistogramError,
    },
    /// Background cannot be expressed on the signal binning
    #[error("Failed to rebin {path} onto the signal binning")]
    Rebin {
        /// Path of the background shape
        path: String,
        /// Reason
        source: HistogramError,
    },
}
