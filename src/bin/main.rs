mod opt;
mod opt_common;

use crate::opt::Opt;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use sbweight::{
    annotate::Annotator, shapes::SbShapes, table::ScoreColumn,
    weight::SbWeighter,
};

fn main() -> Result<()> {
    let opt = Opt::parse_from(opt_common::args()?);
    opt_common::init_logging("sb-weight", &opt.loglevel);
    debug!("settings: {:#?}", opt);

    let cfg = opt.settings()?;
    debug!("configuration: {:#?}", cfg);
    let score_column: ScoreColumn = cfg.score_column.parse()?;

    let shapes = SbShapes::load(&cfg.shapes)
        .with_context(|| "Failed to load signal and background shapes")?;
    let weighter = SbWeighter::try_from(shapes)?;

    let annotator = Annotator::builder()
        .score_column(score_column)
        .progress_interval(cfg.progress_interval)
        .anomaly_threshold(cfg.anomaly_threshold)
        .compression(opt.compression)
        .build();
    annotator
        .run(&opt.infile, &opt.outfile, &weighter)
        .with_context(|| {
            format!("Failed to add weights to events in {:?}", opt.infile)
        })?;
    info!("done");
    Ok(())
}
