use std::{
    ffi::OsStr,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use audec::auto_decompress;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::{
    compression::{compress_writer, Compression},
    histogram::{Histogram, HistogramError, HistogramRepr},
};

const COMPRESSION_SUFFIXES: [&str; 4] = ["gz", "bz2", "lz4", "zst"];

/// A named object in a histogram file
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    /// A histogram
    Histogram(Histogram),
    /// A directory with further entries
    Directory(Directory),
}

/// Directory of named histograms and subdirectories
///
/// Entries keep the order in which they were read or inserted.
/// Objects in nested directories are addressed with `/`-separated
/// paths, e.g. `shapes_fit_s/Znn_SR/total_background`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Directory {
    entries: IndexMap<String, Entry>,
}

impl Directory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries directly in this directory
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this directory has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries directly in this directory
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Iterate over the histograms directly in this directory
    pub fn histograms(&self) -> impl Iterator<Item = (&str, &Histogram)> {
        self.iter().filter_map(|(name, entry)| match entry {
            Entry::Histogram(h) => Some((name, h)),
            Entry::Directory(_) => None,
        })
    }

    /// The first entry in this directory
    pub fn first(&self) -> Option<(&str, &Entry)> {
        self.entries
            .first()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    /// Look up the object at the given path
    pub fn get(&self, path: &str) -> Result<&Entry, ContainerError> {
        let mut components = split_path(path);
        let Some(first) = components.next() else {
            return Err(ContainerError::NotFound(path.to_owned()));
        };
        let mut entry = self
            .entries
            .get(first)
            .ok_or_else(|| ContainerError::NotFound(path.to_owned()))?;
        for name in components {
            let Entry::Directory(dir) = entry else {
                return Err(ContainerError::NotFound(path.to_owned()));
            };
            entry = dir
                .entries
                .get(name)
                .ok_or_else(|| ContainerError::NotFound(path.to_owned()))?;
        }
        Ok(entry)
    }

    /// Look up the histogram at the given path
    pub fn histogram(&self, path: &str) -> Result<&Histogram, ContainerError> {
        match self.get(path)? {
            Entry::Histogram(h) => Ok(h),
            Entry::Directory(_) => {
                Err(ContainerError::NotAHistogram(path.to_owned()))
            }
        }
    }

    /// Look up the directory at the given path
    ///
    /// An empty path refers to this directory.
    pub fn directory(&self, path: &str) -> Result<&Directory, ContainerError> {
        if split_path(path).next().is_none() {
            return Ok(self);
        }
        match self.get(path)? {
            Entry::Directory(dir) => Ok(dir),
            Entry::Histogram(_) => {
                Err(ContainerError::NotADirectory(path.to_owned()))
            }
        }
    }

    /// Get the directory at the given path, creating it if needed
    pub fn mkdir(
        &mut self,
        path: &str,
    ) -> Result<&mut Directory, ContainerError> {
        let mut dir = self;
        for name in split_path(path) {
            let entry = dir
                .entries
                .entry(name.to_owned())
                .or_insert_with(|| Entry::Directory(Directory::new()));
            dir = match entry {
                Entry::Directory(dir) => dir,
                Entry::Histogram(_) => {
                    return Err(ContainerError::NotADirectory(path.to_owned()))
                }
            };
        }
        Ok(dir)
    }

    /// Insert a histogram directly into this directory
    ///
    /// An existing entry with the same name is replaced.
    pub fn insert(&mut self, name: impl Into<String>, histogram: Histogram) {
        self.entries
            .insert(name.into(), Entry::Histogram(histogram));
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// File containing named histograms, organised in directories
#[derive(Clone, Debug)]
pub struct HistogramFile {
    path: PathBuf,
    root: Directory,
}

impl HistogramFile {
    /// Read a (potentially compressed) YAML or JSON histogram file
    ///
    /// Files with a `.json` extension (before any compression suffix)
    /// are read as JSON, everything else as YAML.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContainerError> {
        use ContainerError::*;

        let path = path.as_ref().to_owned();
        let file = File::open(&path).map_err(|err| Open(path.clone(), err))?;
        let reader = auto_decompress(BufReader::new(file));
        let raw: IndexMap<String, RawEntry> = if is_json(&path) {
            debug!("Read {path:?} as JSON");
            serde_json::from_reader(reader)
                .map_err(|err| Json(path.clone(), err))?
        } else {
            debug!("Read {path:?} as YAML");
            serde_yaml::from_reader(reader)
                .map_err(|err| Yaml(path.clone(), err))?
        };
        let root = convert_dir(raw, "").map_err(|(name, source)| {
            InvalidHistogram {
                file: path.clone(),
                name,
                source,
            }
        })?;
        Ok(Self { path, root })
    }

    /// Path of the file this was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Top-level directory
    pub fn root(&self) -> &Directory {
        &self.root
    }

    /// Look up the histogram at the given path
    pub fn histogram(&self, path: &str) -> Result<&Histogram, ContainerError> {
        self.root.histogram(path).map_err(|err| self.in_file(err))
    }

    /// Look up the directory at the given path
    pub fn directory(&self, path: &str) -> Result<&Directory, ContainerError> {
        self.root.directory(path).map_err(|err| self.in_file(err))
    }

    fn in_file(&self, err: ContainerError) -> ContainerError {
        ContainerError::Lookup {
            file: self.path.clone(),
            source: Box::new(err),
        }
    }
}

/// Write a directory tree to a histogram file
///
/// The format follows the same extension rules as [HistogramFile::open].
pub fn write_histogram_file<P: AsRef<Path>>(
    root: &Directory,
    path: P,
    compression: Option<Compression>,
) -> Result<(), ContainerError> {
    use ContainerError::*;

    let path = path.as_ref();
    let file = File::create(path).map_err(|err| Create(path.to_owned(), err))?;
    let mut writer = compress_writer(BufWriter::new(file), compression)
        .map_err(|err| Create(path.to_owned(), err))?;
    if is_json(path) {
        serde_json::to_writer_pretty(&mut writer, root)
            .map_err(|err| Json(path.to_owned(), err))?;
    } else {
        serde_yaml::to_writer(&mut writer, root)
            .map_err(|err| Yaml(path.to_owned(), err))?;
    }
    writer.flush().map_err(|err| WriteOutput(path.to_owned(), err))
}

fn is_json(path: &Path) -> bool {
    let compressed = path
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| COMPRESSION_SUFFIXES.contains(&ext))
        .unwrap_or_default();
    let path = if compressed {
        path.with_extension("")
    } else {
        path.to_owned()
    };
    path.extension() == Some(OsStr::new("json"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Histogram(HistogramRepr),
    Directory(IndexMap<String, RawEntry>),
}

fn convert_dir(
    raw: IndexMap<String, RawEntry>,
    prefix: &str,
) -> Result<Directory, (String, HistogramError)> {
    let mut entries = IndexMap::with_capacity(raw.len());
    for (name, entry) in raw {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        let entry = match entry {
            RawEntry::Histogram(repr) => {
                let h = Histogram::try_from(repr).map_err(|err| (path, err))?;
                Entry::Histogram(h)
            }
            RawEntry::Directory(dir) => {
                Entry::Directory(convert_dir(dir, &path)?)
            }
        };
        entries.insert(name, entry);
    }
    Ok(Directory { entries })
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Entry::Histogram(h) => HistogramRepr::from(h).serialize(serializer),
            Entry::Directory(dir) => dir.serialize(serializer),
        }
    }
}

impl Serialize for Directory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter())
    }
}

/// Error reading, writing, or accessing histogram files
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to open input file
    #[error("Failed to open {0:?}")]
    Open(PathBuf, #[source] std::io::Error),
    /// Failed to create output file
    #[error("Failed to create {0:?}")]
    Create(PathBuf, #[source] std::io::Error),
    /// Failed to write to output file
    #[error("Failed to write to {0:?}")]
    WriteOutput(PathBuf, #[source] std::io::Error),
    /// YAML (de)serialisation error
    #[error("YAML error in {0:?}")]
    Yaml(PathBuf, #[source] serde_yaml::Error),
    /// JSON (de)serialisation error
    #[error("JSON error in {0:?}")]
    Json(PathBuf, #[source] serde_json::Error),
    /// Histogram with invalid binning or contents
    #[error("Invalid histogram {name} in {file:?}")]
    InvalidHistogram {
        /// File containing the histogram
        file: PathBuf,
        /// Path of the histogram inside the file
        name: String,
        /// What is wrong with the histogram
        source: HistogramError,
    },
    /// No object at the given path
    #[error("No object {0}")]
    NotFound(String),
    /// Expected a histogram
    #[error("{0} is not a histogram")]
    NotAHistogram(String),
    /// Expected a directory
    #[error("{0} is not a directory")]
    NotADirectory(String),
    /// Failed lookup in a histogram file
    #[error("Lookup in {file:?} failed")]
    Lookup {
        /// File in which the lookup was performed
        file: PathBuf,
        /// Reason for the failure
        source: Box<ContainerError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPES: &str = "
Znn_13TeV_Signal:
  ZH_hbb:
    edges: [-1, 0, 1]
    contents: [3, 6]
  WH_hbb:
    edges: [-1, 0, 1]
    contents: [2, 4]
    errors: [1, 2]
    overflow: 7
  data_obs:
    edges: [-1, 0, 1]
    contents: [20, 20]
";

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn lookup() {
        log_init();

        let raw: IndexMap<String, RawEntry> = serde_yaml::from_str(SHAPES).unwrap();
        let root = convert_dir(raw, "").unwrap();

        let zh = root.histogram("Znn_13TeV_Signal/ZH_hbb").unwrap();
        assert_eq!(zh.contents(), &[3., 6.]);
        let wh = root.histogram("/Znn_13TeV_Signal//WH_hbb").unwrap();
        assert_eq!(wh.bin_error(2), 2.);
        assert_eq!(wh.bin_content(3), 7.);

        let dir = root.directory("Znn_13TeV_Signal").unwrap();
        let names: Vec<_> = dir.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["ZH_hbb", "WH_hbb", "data_obs"]);
        assert_eq!(root.directory("").unwrap().len(), 1);

        assert!(matches!(
            root.histogram("Znn_13TeV_Signal"),
            Err(ContainerError::NotAHistogram(_))
        ));
        assert!(matches!(
            root.directory("Znn_13TeV_Signal/ZH_hbb"),
            Err(ContainerError::NotADirectory(_))
        ));
        assert!(matches!(
            root.histogram("Znn_13TeV_Signal/ggZH_hbb"),
            Err(ContainerError::NotFound(_))
        ));
        assert!(matches!(
            root.histogram("Znn_13TeV_Signal/ZH_hbb/x"),
            Err(ContainerError::NotFound(_))
        ));
    }

    #[test]
    fn invalid_histogram() {
        let yaml = "
region:
  bad:
    edges: [1, 0]
    contents: [3]
";
        let raw: IndexMap<String, RawEntry> = serde_yaml::from_str(yaml).unwrap();
        let (name, _) = convert_dir(raw, "").unwrap_err();
        assert_eq!(name, "region/bad");
    }

    #[test]
    fn write_and_read() {
        log_init();

        let tmp = tempfile::tempdir().unwrap();
        let mut root = Directory::new();
        let h = Histogram::from_contents(vec![0., 1., 2.], vec![1., 2.])
            .unwrap()
            .with_errors(vec![0.5, 0.5])
            .unwrap();
        root.mkdir("VH/prefit/Znn").unwrap().insert("ZH_hbb", h.clone());
        root.mkdir("VH/prefit/Znn").unwrap().insert("TT", h.clone());
        root.mkdir("VH/postfit").unwrap();
        assert!(matches!(
            root.mkdir("VH/prefit/Znn/TT/sub"),
            Err(ContainerError::NotADirectory(_))
        ));

        for (name, compression) in [
            ("shapes.yaml", None),
            ("shapes.json", None),
            ("shapes.json.gz", Some(Compression::Gzip(6))),
            ("shapes.yaml.zst", Some(Compression::Zstd(3))),
        ] {
            let path = tmp.path().join(name);
            write_histogram_file(&root, &path, compression).unwrap();
            let file = HistogramFile::open(&path).unwrap();
            assert_eq!(file.root(), &root);
            assert_eq!(file.histogram("VH/prefit/Znn/TT").unwrap(), &h);
            let names: Vec<_> = file
                .directory("VH/prefit/Znn")
                .unwrap()
                .histograms()
                .map(|(name, _)| name)
                .collect();
            assert_eq!(names, ["ZH_hbb", "TT"]);
            assert!(matches!(
                file.histogram("VH/postfit/TT"),
                Err(ContainerError::Lookup { .. })
            ));
        }
    }

    #[test]
    fn json_detection() {
        assert!(is_json(Path::new("a.json")));
        assert!(is_json(Path::new("a.json.gz")));
        assert!(!is_json(Path::new("a.yaml")));
        assert!(!is_json(Path::new("a.yaml.zst")));
        assert!(!is_json(Path::new("json")));
    }
}
