//! Split event tables into folds for cross-validation
use std::{
    fs,
    path::{Path, PathBuf},
};

use arrow::{
    array::UInt64Array, compute::take_record_batch, error::ArrowError,
    record_batch::RecordBatch,
};
use log::{debug, info};
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::{
    compression::Compression,
    progress_bar::{Progress, ProgressBar},
    table::{TableError, TableReader, TableWriter},
};

/// Row ranges of the folds
///
/// Fold `j` (zero-based) covers the rows `res[j]..res[j + 1]`. All folds
/// have `n_rows / k` rows, except for the first `n_rows % k` folds which
/// get one additional row each.
pub fn fold_boundaries(n_rows: usize, k: usize) -> Result<Vec<usize>, KFoldError> {
    if k == 0 {
        return Err(KFoldError::NoFolds);
    }
    if k > n_rows {
        return Err(KFoldError::TooManyFolds { folds: k, rows: n_rows });
    }
    let size = n_rows / k;
    let remainder = n_rows % k;
    let boundaries = (0..=k).map(|j| j * size + j.min(remainder)).collect();
    Ok(boundaries)
}

/// Output tables for one fold
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fold {
    /// All rows outside the fold
    pub train: PathBuf,
    /// The rows inside the fold
    pub test: PathBuf,
}

/// Writes train and test tables for k-fold cross-validation
#[derive(Clone, Debug, TypedBuilder)]
pub struct KFoldSplitter {
    /// Number of folds
    folds: usize,
    /// Randomly assign rows to folds instead of using consecutive ranges
    #[builder(default)]
    shuffle: bool,
    /// Seed for the random assignment
    #[builder(default)]
    seed: u64,
    /// Output compression
    #[builder(default)]
    compression: Option<Compression>,
}

impl KFoldSplitter {
    /// Split the table `src`, writing to the directory `outdir`
    ///
    /// For fold `j` of `k` the output files are
    /// `CVFold_<j>_of_<k>_train.parquet` and
    /// `CVFold_<j>_of_<k>_test.parquet`, counting from one. Rows keep
    /// their input order within each output table.
    pub fn split(&self, src: &Path, outdir: &Path) -> Result<Vec<Fold>, KFoldError> {
        info!("Reading events from {src:?}");
        let events = TableReader::open(src)?.read_all()?;
        let n_rows = events.num_rows();
        let boundaries = fold_boundaries(n_rows, self.folds)?;
        debug!("Fold boundaries: {boundaries:?}");

        let mut order: Vec<u64> = (0..n_rows as u64).collect();
        if self.shuffle {
            debug!("Shuffling {n_rows} rows with seed {}", self.seed);
            let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
            order.shuffle(&mut rng);
        }

        fs::create_dir_all(outdir)
            .map_err(|err| KFoldError::CreateDir(outdir.to_owned(), err))?;

        let k = self.folds;
        let progress = ProgressBar::new(k as u64, "Writing folds:");
        let res = boundaries
            .windows(2)
            .enumerate()
            .map(|(j, range)| {
                let fold = self.write_fold(&events, &order, j, range, outdir)?;
                progress.inc(1);
                Ok(fold)
            })
            .collect::<Result<Vec<_>, KFoldError>>();
        // restores the log level, also if writing failed
        progress.finish();
        let res = res?;
        info!("Wrote {k} folds to {outdir:?}");
        Ok(res)
    }

    fn write_fold(
        &self,
        events: &RecordBatch,
        order: &[u64],
        j: usize,
        range: &[usize],
        outdir: &Path,
    ) -> Result<Fold, KFoldError> {
        let (start, end) = (range[0], range[1]);
        let mut test = order[start..end].to_vec();
        let mut train: Vec<_> =
            order[..start].iter().chain(&order[end..]).copied().collect();
        test.sort_unstable();
        train.sort_unstable();

        let stem = format!("CVFold_{}_of_{}", j + 1, self.folds);
        let fold = Fold {
            train: outdir.join(format!("{stem}_train.parquet")),
            test: outdir.join(format!("{stem}_test.parquet")),
        };
        self.write_rows(events, train, &fold.train)?;
        self.write_rows(events, test, &fold.test)?;
        Ok(fold)
    }

    fn write_rows(
        &self,
        events: &RecordBatch,
        rows: Vec<u64>,
        path: &Path,
    ) -> Result<(), KFoldError> {
        debug!("Writing {} rows to {path:?}", rows.len());
        let selected = take_record_batch(events, &UInt64Array::from(rows))
            .map_err(KFoldError::Select)?;
        let mut writer =
            TableWriter::create(path, events.schema(), self.compression)?;
        writer.write(&selected)?;
        writer.close()?;
        Ok(())
    }
}

/// Error splitting a table into folds
#[derive(Debug, Error)]
pub enum KFoldError {
    /// Failed to read or write a table
    #[error(transparent)]
    Table(#[from] TableError),
    /// Zero folds requested
    #[error("Number of folds has to be positive")]
    NoFolds,
    /// More folds than rows
    #[error("Cannot split {rows} rows into {folds} folds")]
    TooManyFolds {
        /// Requested number of folds
        folds: usize,
        /// Number of rows in the table
        rows: usize,
    },
    /// Failed to create the output directory
    #[error("Failed to create output directory {0:?}")]
    CreateDir(PathBuf, #[source] std::io::Error),
    /// Failed to select rows
    #[error("Failed to select rows")]
    Select(#[source] ArrowError),
}
