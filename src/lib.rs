//! `sbweight` adds per-event S/(S+B) weights to columnar event tables.
//!
//! The weight of an event is the ratio of the total prefit signal to
//! the sum of signal and total postfit background in the bin of the
//! signal-region discriminant containing the event's score. Weighting
//! events in this way emphasises the most signal-like regions when
//! plotting the discriminant or derived observables.
//!
//! # How to use
//!
//! The `sb-weight` binary covers the standard use case. Programmatically,
//! load the shapes, construct a weighter, and run an [annotate::Annotator]:
//!
//! ```no_run
//! use std::path::Path;
//! use sbweight::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let shapes = SbShapes::load(&ShapeConfig::default())?;
//! let weighter = SbWeighter::try_from(shapes)?;
//! let annotator = Annotator::builder()
//!     .score_column("BDT_Znn_HighPt.Nominal".parse()?)
//!     .build();
//! annotator.run(Path::new("in.parquet"), Path::new("out.parquet"), &weighter)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Most relevant modules
//!
//! - [shapes] extracts the signal and background shapes
//! - [weight] computes the S/(S+B) weights
//! - [annotate] adds the weights to an event table
//! - [table] reads and writes event tables
//! - [fit_shapes] collects prefit and postfit shapes of several analyses
//! - [kfold] splits event tables for cross-validation
//! - [decorrelate] splits jet energy variations into jet categories

/// Add weight columns to event tables
pub mod annotate;
/// Output compression
pub mod compression;
/// Configuration files
pub mod config;
/// Files of named histograms
pub mod container;
pub mod decorrelate;
pub mod fit_shapes;
/// Four-vectors
pub mod four_vector;
/// One-dimensional histograms
pub mod histogram;
pub mod kfold;
/// Most important exports
pub mod prelude;
/// Progress bar
pub mod progress_bar;
pub mod shapes;
pub mod table;
/// Common traits
pub mod traits;
/// S/(S+B) weights
pub mod weight;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_REV: Option<&str> = option_env!("VERGEN_GIT_SHA");
pub const GIT_BRANCH: Option<&str> = option_env!("VERGEN_GIT_BRANCH");
