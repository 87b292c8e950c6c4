use std::{path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, Float64Array},
    datatypes::{DataType, Field, FieldRef, Schema, SchemaRef},
    error::ArrowError,
    record_batch::RecordBatch,
};
use log::{debug, info, warn};
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::{
    compression::Compression,
    table::{ScoreColumn, TableError, TableReader, TableWriter},
    traits::ScoreWeight,
};

/// Name of the column holding the S/(S+B) weights
pub const WEIGHT_COLUMN: &str = "sb_weight";

/// Copies an event table, appending a weight column computed from a score
#[derive(Clone, Debug, TypedBuilder)]
pub struct Annotator {
    /// Where to find the score of each event
    score_column: ScoreColumn,
    /// Log progress after this many events
    #[builder(default = 1000)]
    progress_interval: u64,
    /// Warn about weights above this value
    #[builder(default = 10.)]
    anomaly_threshold: f64,
    /// Output compression
    #[builder(default)]
    compression: Option<Compression>,
}

/// Outcome of annotating one table
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AnnotateSummary {
    /// Number of events processed
    pub rows: u64,
    /// Number of events with a weight above the anomaly threshold
    pub anomalous: u64,
}

impl Annotator {
    /// Write a copy of `src` to `dst` with an additional weight column
    ///
    /// An existing column with the same name is replaced. All other
    /// columns and the auxiliary objects are copied unchanged.
    pub fn run<W: ScoreWeight>(
        &self,
        src: &Path,
        dst: &Path,
        weighter: W,
    ) -> Result<AnnotateSummary, AnnotateError> {
        info!("Reading events from {src:?}");
        let reader = TableReader::open(src)?;
        let in_schema = reader.schema();
        for key in in_schema.metadata().keys() {
            debug!("Copying {key}");
        }

        let keep: Vec<usize> = in_schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| field.name() != WEIGHT_COLUMN)
            .map(|(idx, _)| idx)
            .collect();
        if keep.len() < in_schema.fields().len() {
            warn!("Replacing existing column {WEIGHT_COLUMN} in {src:?}");
        }
        let out_schema = output_schema(&in_schema, &keep);

        info!("Writing events with {WEIGHT_COLUMN} to {dst:?}");
        let mut writer =
            TableWriter::create(dst, out_schema.clone(), self.compression)?;
        let mut summary = AnnotateSummary::default();
        for batch in reader {
            let batch = batch?;
            let scores = self.score_column.extract(&batch)?;
            let weights: Vec<f64> = scores
                .values()
                .iter()
                .map(|&score| self.weigh(&weighter, score, &mut summary))
                .collect();
            let mut columns: Vec<ArrayRef> =
                keep.iter().map(|&idx| batch.column(idx).clone()).collect();
            columns.push(Arc::new(Float64Array::from(weights)));
            let batch = RecordBatch::try_new(out_schema.clone(), columns)
                .map_err(AnnotateError::Batch)?;
            writer.write(&batch)?;
        }
        let written = writer.close()?;
        debug_assert_eq!(written as u64, summary.rows);
        info!(
            "Weighted {} events, {} with {WEIGHT_COLUMN} > {}",
            summary.rows, summary.anomalous, self.anomaly_threshold
        );
        Ok(summary)
    }

    fn weigh<W: ScoreWeight>(
        &self,
        weighter: &W,
        score: f64,
        summary: &mut AnnotateSummary,
    ) -> f64 {
        summary.rows += 1;
        let weight = weighter.weight(score);
        let n = summary.rows;
        if weight > self.anomaly_threshold {
            summary.anomalous += 1;
            warn!("Event #{n}: score = {score}, {WEIGHT_COLUMN} = {weight}");
        } else if self.progress_interval > 0 && n % self.progress_interval == 0
        {
            info!("Processing event #{n}: score = {score}, {WEIGHT_COLUMN} = {weight}");
        }
        weight
    }
}

fn output_schema(input: &SchemaRef, keep: &[usize]) -> SchemaRef {
    let mut fields: Vec<FieldRef> =
        keep.iter().map(|&idx| input.fields()[idx].clone()).collect();
    fields.push(Arc::new(Field::new(WEIGHT_COLUMN, DataType::Float64, false)));
    Arc::new(Schema::new(fields).with_metadata(input.metadata().clone()))
}

/// Error adding weights to an event table
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// Failed to read or write a table
    #[error(transparent)]
    Table(#[from] TableError),
    /// Failed to assemble the output rows
    #[error("Failed to assemble output record batch")]
    Batch(#[source] ArrowError),
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow::array::{AsArray, Int32Array};
    use arrow::datatypes::Float64Type;

    use crate::{
        histogram::Histogram,
        table::tests::{event_batch, write_batch},
        weight::SbWeighter,
    };

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn weighter() -> SbWeighter {
        let signal =
            Histogram::from_contents(vec![-1., 0., 1.], vec![5., 10.]).unwrap();
        let background =
            Histogram::from_contents(vec![-1., 0., 1.], vec![15., 10.])
                .unwrap();
        SbWeighter::new(signal, background).unwrap()
    }

    fn weights(path: &Path) -> Vec<f64> {
        let table = TableReader::open(path).unwrap().read_all().unwrap();
        table
            .column_by_name(WEIGHT_COLUMN)
            .unwrap()
            .as_primitive::<Float64Type>()
            .values()
            .to_vec()
    }

    #[test]
    fn annotate() {
        log_init();
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.parquet");
        let dst = tmp.path().join("out.parquet");
        let batch = event_batch();
        write_batch(&src, &batch);

        for score in ["BDT.Nominal", "score32", "jets[1]"] {
            let annotator = Annotator::builder()
                .score_column(score.parse().unwrap())
                .progress_interval(2)
                .build();
            let summary = annotator.run(&src, &dst, &weighter()).unwrap();
            assert_eq!(summary, AnnotateSummary { rows: 3, anomalous: 0 });

            let out = TableReader::open(&dst).unwrap();
            assert_eq!(out.metadata(), batch.schema().metadata());
            let out = out.read_all().unwrap();
            assert_eq!(out.num_rows(), batch.num_rows());
            assert_eq!(out.num_columns(), batch.num_columns() + 1);
            for (idx, field) in batch.schema().fields().iter().enumerate() {
                assert_eq!(out.schema().field(idx), field.as_ref());
                assert_eq!(out.column(idx), batch.column(idx));
            }
            let field = out.schema().field_with_name(WEIGHT_COLUMN).unwrap().clone();
            assert_eq!(field.data_type(), &DataType::Float64);
            assert!(!field.is_nullable());
            assert_eq!(weights(&dst), [0.25, 0.5, 0.25]);
        }
    }

    #[test]
    fn replace_existing() {
        log_init();
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.parquet");
        let dst = tmp.path().join("out.parquet");
        let batch = RecordBatch::try_from_iter(vec![
            (
                WEIGHT_COLUMN,
                Arc::new(Int32Array::from(vec![7, 7])) as ArrayRef,
            ),
            (
                "score",
                Arc::new(Float64Array::from(vec![0.5, -0.5])) as ArrayRef,
            ),
        ])
        .unwrap();
        write_batch(&src, &batch);

        let annotator = Annotator::builder()
            .score_column(ScoreColumn::Scalar("score".to_owned()))
            .build();
        annotator.run(&src, &dst, weighter()).unwrap();

        let out = TableReader::open(&dst).unwrap().read_all().unwrap();
        let names: Vec<_> =
            out.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, ["score", WEIGHT_COLUMN]);
        assert_eq!(weights(&dst), [0.5, 0.25]);
    }

    struct Constant(f64);

    impl ScoreWeight for Constant {
        fn weight(&self, _score: f64) -> f64 {
            self.0
        }
    }

    #[test]
    fn anomalous() {
        log_init();
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.parquet");
        let dst = tmp.path().join("out.parquet");
        write_batch(&src, &event_batch());

        let annotator = Annotator::builder()
            .score_column("run".parse().unwrap())
            .build();
        let summary = annotator.run(&src, &dst, Constant(11.)).unwrap();
        assert_eq!(summary, AnnotateSummary { rows: 3, anomalous: 3 });
        assert_eq!(weights(&dst), [11., 11., 11.]);
    }

    #[test]
    fn empty_table() {
        log_init();
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.parquet");
        let dst = tmp.path().join("out.parquet");
        write_batch(&src, &event_batch().slice(0, 0));

        let annotator = Annotator::builder()
            .score_column("BDT.Nominal".parse().unwrap())
            .build();
        let summary = annotator.run(&src, &dst, weighter()).unwrap();
        assert_eq!(summary.rows, 0);
        assert!(weights(&dst).is_empty());
    }

    #[test]
    fn missing_score() {
        log_init();
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.parquet");
        let dst = tmp.path().join("out.parquet");
        write_batch(&src, &event_batch());

        let annotator = Annotator::builder()
            .score_column("BDT_Znn_HighPt.Nominal".parse().unwrap())
            .build();
        assert!(matches!(
            annotator.run(&src, &dst, weighter()),
            Err(AnnotateError::Table(TableError::MissingColumn(_)))
        ));
    }
}
