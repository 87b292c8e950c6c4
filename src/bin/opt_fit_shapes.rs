use std::path::PathBuf;

use clap::Parser;
use sbweight::compression::Compression;

use crate::opt_common::{COMPRESSION_HELP, LOGLEVEL_HELP};

#[derive(Debug, Parser)]
#[clap(about, author, version)]
pub(crate) struct Opt {
    /// Configuration file listing analyses, channels, and fit results.
    #[clap(short, long, value_parser)]
    pub(crate) config: PathBuf,

    /// Output file.
    ///
    /// Files ending in '.json' (before any compression suffix) are
    /// written as JSON, everything else as YAML.
    #[clap(short, long, value_parser)]
    pub(crate) outfile: PathBuf,

    #[clap(long, help = COMPRESSION_HELP)]
    pub(crate) compression: Option<Compression>,

    /// Verbosity level
    #[clap(short, long, default_value = "Info", help = LOGLEVEL_HELP)]
    pub(crate) loglevel: String,
}
