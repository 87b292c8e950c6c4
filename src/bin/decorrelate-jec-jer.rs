mod opt_common;
mod opt_decorrelate;

use crate::opt_decorrelate::Opt;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use sbweight::decorrelate::Decorrelator;

fn main() -> Result<()> {
    let opt = Opt::parse_from(opt_common::args()?);
    opt_common::init_logging("decorrelate-jec-jer", &opt.loglevel);
    debug!("settings: {:#?}", opt);

    let decorrelator = Decorrelator::builder()
        .progress_interval(opt.progress_interval)
        .compression(opt.compression)
        .build();
    decorrelator
        .run(&opt.infile, &opt.outfile)
        .with_context(|| {
            format!("Failed to decorrelate jet variations in {:?}", opt.infile)
        })?;
    info!("done");
    Ok(())
}
