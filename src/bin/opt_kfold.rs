use std::path::PathBuf;

use clap::Parser;
use sbweight::compression::Compression;

use crate::opt_common::{COMPRESSION_HELP, LOGLEVEL_HELP};

#[derive(Debug, Parser)]
#[clap(about, author, version)]
pub(crate) struct Opt {
    /// Number of folds.
    #[clap(short = 'k', long)]
    pub(crate) folds: usize,

    /// Output directory.
    #[clap(long, short, value_parser, default_value = "k_folds")]
    pub(crate) outdir: PathBuf,

    /// Randomly assign events to folds.
    #[clap(long)]
    pub(crate) shuffle: bool,

    /// Random number generator seed for shuffling.
    #[clap(short, long, default_value = "0")]
    pub(crate) seed: u64,

    #[clap(long, help = COMPRESSION_HELP)]
    pub(crate) compression: Option<Compression>,

    /// Verbosity level
    #[clap(short, long, default_value = "Info", help = LOGLEVEL_HELP)]
    pub(crate) loglevel: String,

    /// Input event table
    #[clap(name = "INFILE", value_parser)]
    pub(crate) infile: PathBuf,
}
