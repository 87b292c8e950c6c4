use std::path::PathBuf;

use clap::Parser;
use sbweight::compression::Compression;

use crate::opt_common::{COMPRESSION_HELP, LOGLEVEL_HELP};

#[derive(Debug, Parser)]
#[clap(about, author, version)]
pub(crate) struct Opt {
    /// Log progress after this many events.
    #[clap(long, default_value = "10000")]
    pub(crate) progress_interval: u64,

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
