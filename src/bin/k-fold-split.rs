mod opt_common;
mod opt_kfold;

use crate::opt_kfold::Opt;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use sbweight::kfold::KFoldSplitter;

fn main() -> Result<()> {
    let opt = Opt::parse_from(opt_common::args()?);
    opt_common::init_logging("k-fold-split", &opt.loglevel);
    debug!("settings: {:#?}", opt);

    let splitter = KFoldSplitter::builder()
        .folds(opt.folds)
        .shuffle(opt.shuffle)
        .seed(opt.seed)
        .compression(opt.compression)
        .build();
    let folds = splitter
        .split(&opt.infile, &opt.outdir)
        .with_context(|| format!("Failed to split {:?}", opt.infile))?;
    for fold in folds {
        debug!("{:?} / {:?}", fold.train, fold.test);
    }
    info!("done");
    Ok(())
}
