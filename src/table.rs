//! Columnar event tables stored as Parquet files
//!
//! Auxiliary objects accompanying the events (count histograms, summary
//! counters, free-form metadata) live in the key/value metadata of the
//! Arrow schema. Readers expose them and writers store whatever
//! metadata the output schema carries, so they survive every derived
//! table unchanged.
use std::{
    collections::HashMap,
    fmt::{self, Display},
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use arrow::{
    array::{
        Array, ArrayRef, AsArray, Float64Array, GenericListArray,
        OffsetSizeTrait, UInt64Array,
    },
    compute::{cast, take},
    datatypes::{DataType, Float64Type, SchemaRef},
    error::ArrowError,
    record_batch::RecordBatch,
};
use log::{debug, trace};
use parquet::{
    arrow::{
        arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder},
        ArrowWriter,
    },
    errors::ParquetError,
    file::properties::WriterProperties,
};
use thiserror::Error;

use crate::compression::{parquet_compression, Compression, ParquetCompressionErr};

/// Metadata key used by the Parquet writer for the serialised Arrow schema
const ARROW_SCHEMA_KEY: &str = "ARROW:schema";

/// Reader for an event table, yielding record batches
pub struct TableReader {
    path: PathBuf,
    schema: SchemaRef,
    num_rows: usize,
    batches: ParquetRecordBatchReader,
}

impl TableReader {
    /// Open a Parquet event table
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        use TableError::*;

        let path = path.as_ref().to_owned();
        let file = File::open(&path).map_err(|err| Open(path.clone(), err))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|err| Parquet(path.clone(), err))?;
        let num_rows = builder.metadata().file_metadata().num_rows();
        let num_rows = usize::try_from(num_rows).unwrap_or_default();
        let schema = without_arrow_schema_key(builder.schema());
        debug!(
            "{path:?}: {num_rows} rows, {} columns, {} auxiliary objects",
            schema.fields().len(),
            schema.metadata().len()
        );
        let batches = builder
            .build()
            .map_err(|err| Parquet(path.clone(), err))?;
        Ok(Self {
            path,
            schema,
            num_rows,
            batches,
        })
    }

    /// Path of the table
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arrow schema of the table, including the auxiliary metadata
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Auxiliary objects stored alongside the events
    pub fn metadata(&self) -> &HashMap<String, String> {
        self.schema.metadata()
    }

    /// Total number of rows according to the file metadata
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Read all remaining rows into a single record batch
    pub fn read_all(self) -> Result<RecordBatch, TableError> {
        let schema = self.schema.clone();
        let path = self.path.clone();
        let batches: Vec<_> = self.collect::<Result<_, _>>()?;
        let batch = arrow::compute::concat_batches(&schema, &batches)
            .map_err(|err| TableError::Arrow(path, err))?;
        Ok(batch)
    }
}

impl Iterator for TableReader {
    type Item = Result<RecordBatch, TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.batches.next()?;
        Some(
            batch
                .and_then(|batch| batch.with_schema(self.schema.clone()))
                .map_err(|err| TableError::Arrow(self.path.clone(), err)),
        )
    }
}

fn without_arrow_schema_key(schema: &SchemaRef) -> SchemaRef {
    if !schema.metadata().contains_key(ARROW_SCHEMA_KEY) {
        return schema.clone();
    }
    let mut metadata = schema.metadata().clone();
    metadata.remove(ARROW_SCHEMA_KEY);
    Arc::new(schema.as_ref().clone().with_metadata(metadata))
}

/// Writer for an event table
pub struct TableWriter {
    path: PathBuf,
    schema: SchemaRef,
    writer: ArrowWriter<File>,
    rows: usize,
}

impl TableWriter {
    /// Create a new Parquet table
    ///
    /// The key/value metadata of `schema` is stored in the file.
    pub fn create<P: AsRef<Path>>(
        path: P,
        schema: SchemaRef,
        compression: Option<Compression>,
    ) -> Result<Self, TableError> {
        use TableError::*;

        let path = path.as_ref().to_owned();
        let compression = parquet_compression(compression)?;
        let props = WriterProperties::builder()
            .set_compression(compression)
            .build();
        let file = File::create(&path).map_err(|err| Create(path.clone(), err))?;
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
            .map_err(|err| Parquet(path.clone(), err))?;
        Ok(Self {
            path,
            schema,
            writer,
            rows: 0,
        })
    }

    /// Schema of the output table
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Append a record batch
    pub fn write(&mut self, batch: &RecordBatch) -> Result<(), TableError> {
        trace!("Writing {} rows to {:?}", batch.num_rows(), self.path);
        self.writer
            .write(batch)
            .map_err(|err| TableError::Parquet(self.path.clone(), err))?;
        self.rows += batch.num_rows();
        Ok(())
    }

    /// Write the file footer and close the table
    ///
    /// Returns the number of rows written.
    pub fn close(self) -> Result<usize, TableError> {
        self.writer
            .close()
            .map_err(|err| TableError::Parquet(self.path.clone(), err))?;
        debug!("Wrote {} rows to {:?}", self.rows, self.path);
        Ok(self.rows)
    }
}

/// Location of a per-event score inside an event table
///
/// Parsed from strings of the form
/// - `name`: a scalar numeric column,
/// - `name.leaf`: field `leaf` of the struct column `name`, or a flat
///   column literally called `name.leaf`,
/// - `name[i]`: element `i` of a list column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScoreColumn {
    /// Scalar column
    Scalar(String),
    /// Field of a struct column
    Field {
        /// Struct column
        column: String,
        /// Field name
        field: String,
    },
    /// Element of a list column
    Element {
        /// List column
        column: String,
        /// Zero-based position in each list
        index: usize,
    },
}

impl FromStr for ScoreColumn {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TableError::InvalidScoreColumn(s.to_owned());
        if s.is_empty() {
            return Err(invalid());
        }
        if let Some(rest) = s.strip_suffix(']') {
            let (column, index) = rest.split_once('[').ok_or_else(invalid)?;
            let index = index.trim().parse().map_err(|_| invalid())?;
            if column.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Element {
                column: column.to_owned(),
                index,
            });
        }
        if s.contains(['[', ']']) {
            return Err(invalid());
        }
        match s.split_once('.') {
            Some((column, field)) if !column.is_empty() && !field.is_empty() => {
                Ok(Self::Field {
                    column: column.to_owned(),
                    field: field.to_owned(),
                })
            }
            Some(_) => Err(invalid()),
            None => Ok(Self::Scalar(s.to_owned())),
        }
    }
}

impl Display for ScoreColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(column) => write!(f, "{column}"),
            Self::Field { column, field } => write!(f, "{column}.{field}"),
            Self::Element { column, index } => write!(f, "{column}[{index}]"),
        }
    }
}

impl ScoreColumn {
    /// Extract the scores of all rows in the batch as `f64`
    ///
    /// Any numeric type is accepted. Null scores are an error.
    pub fn extract(&self, batch: &RecordBatch) -> Result<Float64Array, TableError> {
        let values = match self {
            Self::Scalar(name) => column(batch, name)?.clone(),
            Self::Field { column: name, field } => {
                match batch.column_by_name(name) {
                    Some(col) => {
                        let Some(fields) = col.as_struct_opt() else {
                            return Err(TableError::NotAStruct(name.clone()));
                        };
                        let values =
                            fields.column_by_name(field).ok_or_else(|| {
                                TableError::MissingField {
                                    column: name.clone(),
                                    field: field.clone(),
                                }
                            })?;
                        // a null struct row masks whatever its fields hold
                        if let Some(row) =
                            (0..fields.len()).find(|&row| fields.is_null(row))
                        {
                            return Err(TableError::NullScore {
                                column: self.to_string(),
                                row,
                            });
                        }
                        values.clone()
                    }
                    None => column(batch, &self.to_string())?.clone(),
                }
            }
            Self::Element { column: name, index } => {
                let col = column(batch, name)?;
                list_element(col, name, *index)?
            }
        };
        self.to_f64(&values)
    }

    fn to_f64(&self, values: &ArrayRef) -> Result<Float64Array, TableError> {
        let data_type = values.data_type();
        if !data_type.is_numeric() {
            return Err(TableError::NonNumeric {
                column: self.to_string(),
                data_type: data_type.clone(),
            });
        }
        if values.null_count() > 0 {
            let row = (0..values.len())
                .find(|&row| values.is_null(row))
                .unwrap_or_default();
            return Err(TableError::NullScore {
                column: self.to_string(),
                row,
            });
        }
        let values = cast(values, &DataType::Float64).map_err(|source| {
            TableError::Cast {
                column: self.to_string(),
                source,
            }
        })?;
        Ok(values.as_primitive::<Float64Type>().clone())
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, TableError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| TableError::MissingColumn(name.to_owned()))
}

fn list_element(
    col: &ArrayRef,
    name: &str,
    index: usize,
) -> Result<ArrayRef, TableError> {
    if let Some(list) = col.as_list_opt::<i32>() {
        let positions = list_positions(list, name, index)?;
        take_values(list.values(), positions, name)
    } else if let Some(list) = col.as_list_opt::<i64>() {
        let positions = list_positions(list, name, index)?;
        take_values(list.values(), positions, name)
    } else if let Some(list) = col.as_fixed_size_list_opt() {
        let len = list.value_length() as usize;
        let mut positions = Vec::with_capacity(list.len());
        for row in 0..list.len() {
            if list.is_null(row) {
                return Err(TableError::NullScore {
                    column: name.to_owned(),
                    row,
                });
            }
            if index >= len {
                return Err(TableError::IndexOutOfRange {
                    column: name.to_owned(),
                    index,
                    row,
                    len,
                });
            }
            positions.push((list.value_offset(row) as usize + index) as u64);
        }
        take_values(list.values(), positions, name)
    } else {
        Err(TableError::NotAList(name.to_owned()))
    }
}

fn list_positions<O: OffsetSizeTrait>(
    list: &GenericListArray<O>,
    name: &str,
    index: usize,
) -> Result<Vec<u64>, TableError> {
    let offsets = list.value_offsets();
    let mut positions = Vec::with_capacity(list.len());
    for row in 0..list.len() {
        if list.is_null(row) {
            return Err(TableError::NullScore {
                column: name.to_owned(),
                row,
            });
        }
        let start = offsets[row].as_usize();
        let len = offsets[row + 1].as_usize() - start;
        if index >= len {
            return Err(TableError::IndexOutOfRange {
                column: name.to_owned(),
                index,
                row,
                len,
            });
        }
        positions.push((start + index) as u64);
    }
    Ok(positions)
}

fn take_values(
    values: &ArrayRef,
    positions: Vec<u64>,
    name: &str,
) -> Result<ArrayRef, TableError> {
    take(values, &UInt64Array::from(positions), None).map_err(|source| {
        TableError::Cast {
            column: name.to_owned(),
            source,
        }
    })
}

/// Numeric list column with all entries converted to `f64`
///
/// Used for per-object quantities such as jet momenta, where each row
/// holds one entry per object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListColumn {
    offsets: Vec<usize>,
    values: Vec<f64>,
}

impl ListColumn {
    /// Read the list column `name` from a batch
    ///
    /// Lists, large lists, and fixed-size lists of any numeric type are
    /// accepted. Null rows and null entries are an error.
    pub fn from_batch(batch: &RecordBatch, name: &str) -> Result<Self, TableError> {
        let col = column(batch, name)?;
        let (offsets, values) = if let Some(list) = col.as_list_opt::<i32>() {
            (list_offsets(list, name)?, list.values())
        } else if let Some(list) = col.as_list_opt::<i64>() {
            (list_offsets(list, name)?, list.values())
        } else if let Some(list) = col.as_fixed_size_list_opt() {
            if let Some(row) = (0..list.len()).find(|&row| list.is_null(row)) {
                return Err(TableError::NullValue {
                    column: name.to_owned(),
                    row,
                });
            }
            let offsets = (0..=list.len())
                .map(|row| list.value_offset(row) as usize)
                .collect();
            (offsets, list.values())
        } else {
            return Err(TableError::NotAList(name.to_owned()));
        };

        let data_type = values.data_type();
        if !data_type.is_numeric() {
            return Err(TableError::NonNumeric {
                column: name.to_owned(),
                data_type: data_type.clone(),
            });
        }
        let values = cast(values, &DataType::Float64).map_err(|source| {
            TableError::Cast {
                column: name.to_owned(),
                source,
            }
        })?;
        let values = values.as_primitive::<Float64Type>();
        let (first, last) = (offsets[0], offsets[offsets.len() - 1]);
        if let Some(pos) = (first..last).find(|&pos| values.is_null(pos)) {
            let row = offsets.partition_point(|&start| start <= pos) - 1;
            return Err(TableError::NullValue {
                column: name.to_owned(),
                row,
            });
        }
        Ok(Self {
            offsets,
            values: values.values().to_vec(),
        })
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in the given row
    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[self.offsets[row]..self.offsets[row + 1]]
    }
}

fn list_offsets<O: OffsetSizeTrait>(
    list: &GenericListArray<O>,
    name: &str,
) -> Result<Vec<usize>, TableError> {
    if let Some(row) = (0..list.len()).find(|&row| list.is_null(row)) {
        return Err(TableError::NullValue {
            column: name.to_owned(),
            row,
        });
    }
    Ok(list.value_offsets().iter().map(|o| o.as_usize()).collect())
}

/// Error reading or writing event tables
#[derive(Debug, Error)]
pub enum TableError {
    /// Failed to open input file
    #[error("Failed to open {0:?}")]
    Open(PathBuf, #[source] std::io::Error),
    /// Failed to create output file
    #[error("Failed to create {0:?}")]
    Create(PathBuf, #[source] std::io::Error),
    /// Parquet error
    #[error("Parquet error in {0:?}")]
    Parquet(PathBuf, #[source] ParquetError),
    /// Arrow error
    #[error("Arrow error in {0:?}")]
    Arrow(PathBuf, #[source] ArrowError),
    /// Unsupported output compression
    #[error(transparent)]
    Compression(#[from] ParquetCompressionErr),
    /// Malformed score column
    #[error("Invalid score column '{0}': expected 'name', 'name.leaf', or 'name[index]'")]
    InvalidScoreColumn(String),
    /// No column with the given name
    #[error("No column '{0}' in event table")]
    MissingColumn(String),
    /// Struct column without the requested field
    #[error("Column '{column}' has no field '{field}'")]
    MissingField {
        /// Struct column
        column: String,
        /// Requested field
        field: String,
    },
    /// Column is not a struct
    #[error("Column '{0}' is not a struct column")]
    NotAStruct(String),
    /// Column is not a list
    #[error("Column '{0}' is not a list column")]
    NotAList(String),
    /// List shorter than the requested index
    #[error("Cannot access element {index} of column '{column}' in row {row}: list has length {len}")]
    IndexOutOfRange {
        /// List column
        column: String,
        /// Requested element
        index: usize,
        /// Row with the short list
        row: usize,
        /// Length of the list in this row
        len: usize,
    },
    /// Column does not hold numbers
    #[error("Column '{column}' has non-numeric type {data_type}")]
    NonNumeric {
        /// Score column
        column: String,
        /// Actual type
        data_type: DataType,
    },
    /// Missing score
    #[error("Score '{column}' is null in row {row}")]
    NullScore {
        /// Score column
        column: String,
        /// Row with the null entry
        row: usize,
    },
    /// Missing entry in a list column
    #[error("Column '{column}' has a null entry in row {row}")]
    NullValue {
        /// List column
        column: String,
        /// Row with the null entry
        row: usize,
    },
    /// Failed to convert scores
    #[error("Failed to convert '{column}' to double precision")]
    Cast {
        /// Score column
        column: String,
        /// Reason
        source: ArrowError,
    },
}
