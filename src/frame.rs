//! Time-series frames (Arrow/Parquet backed)
//!
//! A [`TimeSeriesFrame`] is an ordered table of rows in time order with a fixed
//! set of named numeric columns. Two kinds of missing cells are distinguished:
//!
//! - **sentinel** cells: the source said "no value" (the `None` token in text
//!   columns, or an Arrow null). Repair replaces them with zero.
//! - **gaps**: NaN cells. Repair fills them by linear interpolation when asked.
//!
//! Sentinels are written back to Arrow as nulls and gaps as NaN, so a frame
//! survives a Parquet round trip unchanged.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use ndarray::{s, Array2};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::{Error, Result};

/// Token that marks a sentinel (missing) cell in text columns.
pub const MISSING_TOKEN: &str = "None";

/// Named numeric columns over time-ordered rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFrame {
    columns: Vec<String>,
    values: Array2<f64>,
    // (row, column), sorted, unique; the value slot holds NaN
    sentinels: Vec<(usize, usize)>,
}

impl TimeSeriesFrame {
    /// Create a frame from column names and a `rows x columns` matrix.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the name count differs from the matrix
    /// width, or `InvalidData` for duplicate column names.
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(Error::DimensionMismatch {
                expected: values.ncols(),
                got: columns.len(),
            });
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(Error::InvalidData(format!("duplicate column {name:?}")));
            }
        }
        Ok(Self {
            columns,
            values,
            sentinels: Vec::new(),
        })
    }

    /// Mark cells as sentinel-missing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if a cell lies outside the frame.
    pub fn with_sentinels(
        mut self,
        cells: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self> {
        let (rows, cols) = self.values.dim();
        for (row, col) in cells {
            if row >= rows || col >= cols {
                return Err(Error::InvalidData(format!(
                    "sentinel cell ({row}, {col}) outside a {rows}x{cols} frame"
                )));
            }
            self.values[[row, col]] = f64::NAN;
            self.sentinels.push((row, col));
        }
        self.sentinels.sort_unstable();
        self.sentinels.dedup();
        Ok(self)
    }

    /// Column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Cell values; sentinel cells and gaps read as NaN.
    #[must_use]
    pub const fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Consume the frame, returning its matrix.
    #[must_use]
    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    /// Sentinel cells as `(row, column)`, sorted.
    #[must_use]
    pub fn sentinels(&self) -> &[(usize, usize)] {
        &self.sentinels
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    /// Whether the frame has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Multivariate width (column count).
    #[must_use]
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// Whether any cell is NaN (gap or sentinel).
    #[must_use]
    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }

    /// The last `rows` rows (or the whole frame if shorter).
    #[must_use]
    pub fn tail(&self, rows: usize) -> Self {
        let start = self.len().saturating_sub(rows);
        Self {
            columns: self.columns.clone(),
            values: self.values.slice(s![start.., ..]).to_owned(),
            sentinels: self
                .sentinels
                .iter()
                .filter(|(row, _)| *row >= start)
                .map(|&(row, col)| (row - start, col))
                .collect(),
        }
    }

    pub(crate) fn replace_values(&self, values: Array2<f64>) -> Self {
        Self {
            columns: self.columns.clone(),
            values,
            sentinels: Vec::new(),
        }
    }

    /// Build a frame from Arrow record batches sharing one schema.
    ///
    /// Numeric columns are cast to `f64` (nulls become sentinels). Text
    /// columns parse as numbers; the [`MISSING_TOKEN`] and nulls become
    /// sentinels, anything unparsable becomes a gap.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a selected column is missing or not
    /// convertible to numbers.
    pub fn from_record_batches(
        schema: &Schema,
        batches: &[RecordBatch],
        usecols: Option<&[&str]>,
    ) -> Result<Self> {
        let selected: Vec<(usize, String)> = match usecols {
            Some(names) => names
                .iter()
                .map(|name| {
                    schema
                        .index_of(name)
                        .map(|idx| (idx, (*name).to_string()))
                        .map_err(|_| {
                            Error::StorageError(format!("column {name:?} not found in schema"))
                        })
                })
                .collect::<Result<_>>()?,
            None => schema
                .fields()
                .iter()
                .enumerate()
                .map(|(idx, field)| (idx, field.name().clone()))
                .collect(),
        };

        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        let width = selected.len();
        let mut values = Array2::<f64>::zeros((rows, width));
        let mut sentinels = Vec::new();

        let mut offset = 0;
        for batch in batches {
            if batch.schema().fields() != schema.fields() {
                return Err(Error::StorageError(format!(
                    "Schema mismatch: expected {schema:?}, got {:?}",
                    batch.schema()
                )));
            }
            for (col, (idx, name)) in selected.iter().enumerate() {
                let cells = column_cells(name, batch.column(*idx))?;
                for (row, cell) in cells.into_iter().enumerate() {
                    match cell {
                        Cell::Value(v) => values[[offset + row, col]] = v,
                        Cell::Sentinel => {
                            values[[offset + row, col]] = f64::NAN;
                            sentinels.push((offset + row, col));
                        }
                    }
                }
            }
            offset += batch.num_rows();
        }
        sentinels.sort_unstable();

        let columns = selected.into_iter().map(|(_, name)| name).collect();
        let mut frame = Self::new(columns, values)?;
        frame.sentinels = sentinels;
        Ok(frame)
    }

    /// Convert to a single Arrow record batch of nullable `Float64` columns.
    ///
    /// # Errors
    ///
    /// Returns error if Arrow rejects the batch
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(
            self.columns
                .iter()
                .map(|name| Field::new(name, DataType::Float64, true))
                .collect::<Vec<_>>(),
        ));

        let arrays: Vec<ArrayRef> = (0..self.width())
            .map(|col| {
                let column = self.values.column(col);
                let array: Float64Array = column
                    .iter()
                    .enumerate()
                    .map(|(row, &v)| {
                        if self.sentinels.binary_search(&(row, col)).is_ok() {
                            None
                        } else {
                            Some(v)
                        }
                    })
                    .collect();
                Arc::new(array) as ArrayRef
            })
            .collect();

        Ok(RecordBatch::try_new(schema, arrays)?)
    }

    /// Load a frame from a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened, parsed, or converted
    pub fn read_parquet<P: AsRef<Path>>(path: P, usecols: Option<&[&str]>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::StorageError(format!(
                "Failed to open Parquet file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;
        read_batches(builder, usecols)
    }

    /// Write the frame to a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_parquet_to(file)
    }

    /// Encode the frame as Parquet bytes.
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn to_parquet_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_parquet_to(&mut buf)?;
        Ok(buf)
    }

    /// Decode a frame from Parquet bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a readable Parquet file
    pub fn from_parquet_bytes(bytes: Vec<u8>) -> Result<Self> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))?;
        read_batches(builder, None)
    }

    fn write_parquet_to<W: std::io::Write + Send>(&self, sink: W) -> Result<()> {
        let batch = self.to_record_batch()?;
        let mut writer = ArrowWriter::try_new(sink, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

enum Cell {
    Value(f64),
    Sentinel,
}

fn read_batches<T>(
    builder: ParquetRecordBatchReaderBuilder<T>,
    usecols: Option<&[&str]>,
) -> Result<TimeSeriesFrame>
where
    T: parquet::file::reader::ChunkReader + 'static,
{
    let schema = builder.schema().clone();
    let reader = builder
        .build()
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

    // Read all batches into memory
    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch
            .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
        batches.push(batch);
    }

    TimeSeriesFrame::from_record_batches(&schema, &batches, usecols)
}

fn column_cells(name: &str, array: &ArrayRef) -> Result<Vec<Cell>> {
    match array.data_type() {
        DataType::Utf8 => Ok(text_cells(array.as_string::<i32>().iter())),
        DataType::LargeUtf8 => Ok(text_cells(array.as_string::<i64>().iter())),
        _ => {
            let floats = cast(array, &DataType::Float64).map_err(|e| {
                Error::StorageError(format!("column {name:?} is not numeric: {e}"))
            })?;
            Ok(floats
                .as_primitive::<Float64Type>()
                .iter()
                .map(|v| v.map_or(Cell::Sentinel, Cell::Value))
                .collect())
        }
    }
}

fn text_cells<'a>(cells: impl Iterator<Item = Option<&'a str>>) -> Vec<Cell> {
    cells
        .map(|cell| match cell.map(str::trim) {
            None | Some(MISSING_TOKEN) => Cell::Sentinel,
            Some(text) => Cell::Value(text.parse().unwrap_or(f64::NAN)),
        })
        .collect()
}
