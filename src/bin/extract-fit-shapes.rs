mod opt_common;
mod opt_fit_shapes;

use crate::opt_fit_shapes::Opt;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use sbweight::{
    container::write_histogram_file,
    fit_shapes::{extract_fit_shapes, FitShapesConfig},
};

fn main() -> Result<()> {
    let opt = Opt::parse_from(opt_common::args()?);
    opt_common::init_logging("extract-fit-shapes", &opt.loglevel);
    debug!("settings: {:#?}", opt);

    let cfg = FitShapesConfig::from_file(&opt.config)?;
    debug!("configuration: {:#?}", cfg);

    let shapes = extract_fit_shapes(&cfg)?;
    info!("Writing shapes to {:?}", opt.outfile);
    write_histogram_file(&shapes, &opt.outfile, opt.compression)
        .with_context(|| format!("Failed to write {:?}", opt.outfile))?;
    info!("done");
    Ok(())
}
