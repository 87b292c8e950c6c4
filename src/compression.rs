use std::{io::Write, str::FromStr};

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use lazy_static::lazy_static;
use parquet::basic::{GzipLevel, ZstdLevel};
use regex::Regex;
use thiserror::Error;

const GZIP_DEFAULT_LEVEL: u8 = 6;
const LZ4_DEFAULT_LEVEL: u8 = 0;
const ZSTD_DEFAULT_LEVEL: u8 = 0;

lazy_static! {
    static ref COMPRESSION_RE: Regex =
        Regex::new(r"^(?P<algo>[[:alnum:]]+)(?P<lvl>_\d+)?$").unwrap();
}

/// Compression format
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Compression {
    /// The bzip2 format
    Bzip2,
    /// The gzip format with compression level as associated value
    Gzip(u8),
    /// The lz4 format with compression level as associated value
    Lz4(u8),
    /// The zstd format with compression level as associated value
    Zstd(u8),
}

impl FromStr for Compression {
    type Err = ParseCompressionErr;

    /// Parse settings like `gzip`, `zstd_5`, or `bz2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Compression::*;
        use ParseCompressionErr::*;

        let lower_case = s.to_ascii_lowercase();
        let Some(captures) = COMPRESSION_RE.captures(&lower_case) else {
            return Err(UnknownAlgorithm(s.to_owned()));
        };
        let algo = &captures["algo"];
        let lvl = captures.name("lvl").map(|lvl| lvl.as_str());
        let parse_lvl = |max: u8, default: u8| match lvl {
            None => Ok(default),
            Some(lvl_str) => match lvl_str[1..].parse::<u8>() {
                Ok(lvl) if lvl <= max => Ok(lvl),
                _ => Err(UnsupportedLevel(lvl_str.to_owned(), algo.to_owned())),
            },
        };
        match algo {
            "bzip2" | "bz2" => match lvl {
                Some(lvl_str) => {
                    Err(UnsupportedLevel(lvl_str.to_owned(), algo.to_owned()))
                }
                None => Ok(Bzip2),
            },
            "gzip" | "gz" => parse_lvl(9, GZIP_DEFAULT_LEVEL).map(Gzip),
            "lz4" => parse_lvl(16, LZ4_DEFAULT_LEVEL).map(Lz4),
            "zstd" | "zstandard" => {
                parse_lvl(19, ZSTD_DEFAULT_LEVEL).map(Zstd)
            }
            _ => Err(UnknownAlgorithm(s.to_owned())),
        }
    }
}

/// Convert into a writer that compresses to the given format
pub fn compress_writer<'a, W: 'a + Write>(
    writer: W,
    compression: Option<Compression>,
) -> Result<Box<dyn Write + 'a>, std::io::Error> {
    match compression {
        Some(Compression::Bzip2) => {
            let encoder = BzEncoder::new(writer, bzip2::Compression::best());
            Ok(Box::new(encoder))
        }
        Some(Compression::Gzip(lvl)) => {
            let encoder =
                GzEncoder::new(writer, flate2::Compression::new(lvl.into()));
            Ok(Box::new(encoder))
        }
        Some(Compression::Lz4(lvl)) => {
            let encoder = lz4::EncoderBuilder::new()
                .auto_flush(true)
                .level(lvl.into())
                .build(writer)?;
            Ok(Box::new(encoder))
        }
        Some(Compression::Zstd(lvl)) => {
            let encoder = zstd::Encoder::new(writer, lvl.into())?;
            Ok(Box::new(encoder.auto_finish()))
        }
        None => Ok(Box::new(writer)),
    }
}

/// Parquet column compression corresponding to the given setting
///
/// Without explicit compression, tables are written with snappy.
/// Parquet has no bzip2 codec and no lz4 levels.
pub fn parquet_compression(
    compression: Option<Compression>,
) -> Result<parquet::basic::Compression, ParquetCompressionErr> {
    use parquet::basic::Compression as PC;
    use ParquetCompressionErr::*;

    match compression {
        None => Ok(PC::SNAPPY),
        Some(Compression::Bzip2) => Err(Unsupported(Compression::Bzip2)),
        Some(Compression::Gzip(lvl)) => GzipLevel::try_new(lvl.into())
            .map(PC::GZIP)
            .map_err(|err| Level(Compression::Gzip(lvl), err)),
        Some(Compression::Lz4(_)) => Ok(PC::LZ4_RAW),
        Some(Compression::Zstd(lvl)) => ZstdLevel::try_new(lvl.into())
            .map(PC::ZSTD)
            .map_err(|err| Level(Compression::Zstd(lvl), err)),
    }
}

/// Error parsing a compression setting
#[derive(Debug, Clone, Error)]
pub enum ParseCompressionErr {
    /// Unknown algorithm
    #[error("Unknown compression algorithm: {0}")]
    UnknownAlgorithm(String),
    /// Level out of range for the algorithm
    #[error("Level {0} not supported for {1} compression")]
    UnsupportedLevel(String, String),
}

/// Compression setting that cannot be used for Parquet output
#[derive(Debug, Error)]
pub enum ParquetCompressionErr {
    /// No corresponding Parquet codec
    #[error("{0:?} compression is not supported for Parquet tables")]
    Unsupported(Compression),
    /// Level rejected by the Parquet codec
    #[error("Invalid level for {0:?} compression in Parquet tables")]
    Level(Compression, #[source] parquet::errors::ParquetError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        use Compression::*;
        assert_eq!("bzip2".parse::<Compression>().unwrap(), Bzip2);
        assert_eq!("BZ2".parse::<Compression>().unwrap(), Bzip2);
        assert_eq!("gz".parse::<Compression>().unwrap(), Gzip(6));
        assert_eq!("gzip_9".parse::<Compression>().unwrap(), Gzip(9));
        assert_eq!("lz4_16".parse::<Compression>().unwrap(), Lz4(16));
        assert_eq!("zstd".parse::<Compression>().unwrap(), Zstd(0));
        assert_eq!("zstandard_19".parse::<Compression>().unwrap(), Zstd(19));

        assert!(matches!(
            "gzip_10".parse::<Compression>(),
            Err(ParseCompressionErr::UnsupportedLevel(..))
        ));
        assert!(matches!(
            "bzip2_3".parse::<Compression>(),
            Err(ParseCompressionErr::UnsupportedLevel(..))
        ));
        assert!(matches!(
            "xz".parse::<Compression>(),
            Err(ParseCompressionErr::UnknownAlgorithm(_))
        ));
        assert!(matches!(
            "zstd-3".parse::<Compression>(),
            Err(ParseCompressionErr::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn parquet() {
        use parquet::basic::Compression as PC;

        assert_eq!(parquet_compression(None).unwrap(), PC::SNAPPY);
        assert_eq!(
            parquet_compression(Some(Compression::Lz4(3))).unwrap(),
            PC::LZ4_RAW
        );
        assert!(matches!(
            parquet_compression(Some(Compression::Zstd(5))).unwrap(),
            PC::ZSTD(_)
        ));
        assert!(matches!(
            parquet_compression(Some(Compression::Bzip2)),
            Err(ParquetCompressionErr::Unsupported(_))
        ));
    }
}
