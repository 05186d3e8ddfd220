//! Simulation output tables (Arrow/Parquet)
//!
//! OpenSim writes `.sto`/`.mot` files as a free-text preamble followed by a
//! whitespace-delimited header row and numeric rows. The header sits at a
//! fixed, format-dependent line ([`TableKind::header_line`]). Every file is
//! read into a [`DataTable`]: one Arrow `RecordBatch` of nullable `Float64`
//! columns, where null means "missing sample".
//!
//! Tables are append-only values: transformations return or replace whole
//! columns, never single cells.

use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Output file formats and where their header row sits (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Force-plate record (`_GRF.mot`)
    GroundReaction,
    /// Inverse kinematics motion (`_IK.mot`) and kinematics `q/u/dudt`
    Motion,
    /// Inverse dynamics (`_ID.sto`)
    InverseDynamics,
    /// Actuation force/speed/power
    Actuation,
    /// Controls
    Controls,
    /// Position errors (`_pErr.sto`)
    PositionError,
    /// States
    States,
}

impl TableKind {
    /// 1-based line holding the column names.
    #[must_use]
    pub const fn header_line(self) -> usize {
        match self {
            Self::GroundReaction => 14,
            Self::Motion => 11,
            Self::InverseDynamics | Self::Controls | Self::PositionError | Self::States => 7,
            Self::Actuation => 23,
        }
    }
}

/// A named-column numeric table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    source: PathBuf,
    batch: RecordBatch,
}

fn float_schema(names: &[String]) -> Arc<Schema> {
    Arc::new(Schema::new(
        names
            .iter()
            .map(|n| Field::new(n.as_str(), DataType::Float64, true))
            .collect::<Vec<_>>(),
    ))
}

impl DataTable {
    /// Read a whitespace-delimited table whose header is on `header_line` (1-based).
    ///
    /// Rows after the header are data; blank lines are skipped.
    ///
    /// # Errors
    ///
    /// - `Io` if the file cannot be read
    /// - `Numeric` naming the file and line if the header is missing, a row
    ///   has the wrong width, or a token is not a number
    pub fn read_delimited<P: AsRef<Path>>(path: P, header_line: usize) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::parse_delimited(path, &text, header_line)
    }

    /// Read an output file of a known format.
    ///
    /// # Errors
    ///
    /// See [`Self::read_delimited`]
    pub fn read<P: AsRef<Path>>(path: P, kind: TableKind) -> Result<Self> {
        Self::read_delimited(path, kind.header_line())
    }

    /// Parse `text` as if read from `path`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_delimited`]
    pub fn parse_delimited(path: &Path, text: &str, header_line: usize) -> Result<Self> {
        let mut lines = text.lines().enumerate().skip(header_line.saturating_sub(1));
        let names: Vec<String> = match lines.next() {
            Some((_, line)) if !line.trim().is_empty() => {
                line.split_whitespace().map(str::to_string).collect()
            }
            _ => {
                return Err(Error::numeric(
                    path,
                    format!("no header on line {header_line}"),
                ))
            }
        };

        let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); names.len()];
        for (idx, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != names.len() {
                return Err(Error::numeric(
                    path,
                    format!(
                        "line {}: {} fields, header has {}",
                        idx + 1,
                        tokens.len(),
                        names.len()
                    ),
                ));
            }
            for (column, token) in columns.iter_mut().zip(tokens) {
                let value: f64 = token.parse().map_err(|_| {
                    Error::numeric(path, format!("line {}: `{token}` is not a number", idx + 1))
                })?;
                column.push(Some(value));
            }
        }

        Self::from_columns(path, names.into_iter().zip(columns).collect())
    }

    /// Build a table from `(name, values)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the columns differ in length
    pub fn from_columns(
        source: impl Into<PathBuf>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self> {
        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        let arrays: Vec<ArrayRef> = columns
            .into_iter()
            .map(|(_, values)| Arc::new(Float64Array::from(values)) as ArrayRef)
            .collect();
        Self::from_arrays(source, &names, arrays)
    }

    fn from_arrays(source: impl Into<PathBuf>, names: &[String], arrays: Vec<ArrayRef>) -> Result<Self> {
        let source = source.into();
        if let Some(first) = arrays.first() {
            let rows = first.len();
            if let Some((i, _)) = arrays.iter().enumerate().find(|(_, a)| a.len() != rows) {
                return Err(Error::StorageError(format!(
                    "Column length mismatch in {}: `{}` has {} rows, expected {rows}",
                    source.display(),
                    names[i],
                    arrays[i].len()
                )));
            }
        }
        let batch = if arrays.is_empty() {
            RecordBatch::new_empty(float_schema(names))
        } else {
            RecordBatch::try_new(float_schema(names), arrays)?
        };
        Ok(Self { source, batch })
    }

    /// File the table came from (or will be written as).
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Underlying Arrow batch.
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of samples.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Column names in file order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Whether a column named `name` exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.batch.schema().index_of(name).is_ok()
    }

    /// Column `name`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` if the table has no such column
    pub fn column(&self, name: &str) -> Result<&Float64Array> {
        let index = self
            .batch
            .schema()
            .index_of(name)
            .map_err(|_| Error::mismatch(name, self.source_name()))?;
        self.batch
            .column(index)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| Error::StorageError(format!("column `{name}` is not Float64")))
    }

    /// Column `name` as plain values; missing samples become NaN.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` if the table has no such column
    pub fn values(&self, name: &str) -> Result<Vec<f64>> {
        Ok(self
            .column(name)?
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect())
    }

    /// The `time` column.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` if the table has no `time` column
    pub fn time(&self) -> Result<Vec<f64>> {
        self.values("time")
    }

    /// Table restricted to `names`, in that order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` for the first name the table lacks
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let mut arrays = Vec::with_capacity(names.len());
        for name in names {
            arrays.push(Arc::new(self.column(name)?.clone()) as ArrayRef);
        }
        let owned: Vec<String> = names.iter().map(|n| (*n).to_string()).collect();
        Self::from_arrays(self.source.clone(), &owned, arrays)
    }

    /// Rename columns; `rename` returns the new name or `None` to keep it.
    ///
    /// # Errors
    ///
    /// Returns `Arrow` if the batch cannot be rebuilt
    pub fn rename_columns<F>(&mut self, rename: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let names: Vec<String> = self
            .names()
            .into_iter()
            .map(|n| rename(&n).unwrap_or(n))
            .collect();
        let arrays = self.batch.columns().to_vec();
        self.batch = if arrays.is_empty() {
            RecordBatch::new_empty(float_schema(&names))
        } else {
            RecordBatch::try_new(float_schema(&names), arrays)?
        };
        Ok(())
    }

    /// Replace column `name` with `values`.
    ///
    /// # Errors
    ///
    /// - `ConfigMismatch` if the column does not exist
    /// - `StorageError` if `values` has the wrong length
    pub fn replace_column(&mut self, name: &str, values: Float64Array) -> Result<()> {
        let index = self
            .batch
            .schema()
            .index_of(name)
            .map_err(|_| Error::mismatch(name, self.source_name()))?;
        let mut arrays = self.batch.columns().to_vec();
        arrays[index] = Arc::new(values);
        let names = self.names();
        *self = Self::from_arrays(self.source.clone(), &names, arrays)?;
        Ok(())
    }

    /// Append a column.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if `values` has the wrong length
    pub fn push_column(&mut self, name: &str, values: Float64Array) -> Result<()> {
        let mut names = self.names();
        let mut arrays = self.batch.columns().to_vec();
        names.push(name.to_string());
        arrays.push(Arc::new(values));
        *self = Self::from_arrays(self.source.clone(), &names, arrays)?;
        Ok(())
    }

    /// Write the table as Parquet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the file cannot be created or written
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use parquet::arrow::ArrowWriter;
        use std::fs::File;

        let file = File::create(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet file: {e}")))?;
        let mut writer = ArrowWriter::try_new(file, self.batch.schema(), None)
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet writer: {e}")))?;
        writer
            .write(&self.batch)
            .map_err(|e| Error::StorageError(format!("Failed to write record batch: {e}")))?;
        writer
            .close()
            .map_err(|e| Error::StorageError(format!("Failed to finish Parquet file: {e}")))?;
        Ok(())
    }

    /// Load a table previously written with [`Self::write_parquet`].
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::fs::File;

        let file = File::open(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;
        let schema = builder.schema().clone();
        let reader = builder
            .build()
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
            batches.push(batch);
        }
        let batch = arrow::compute::concat_batches(&schema, &batches)?;
        Ok(Self {
            source: path.as_ref().to_path_buf(),
            batch,
        })
    }

    fn source_name(&self) -> String {
        self.source.file_name().map_or_else(
            || self.source.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STO: &str = "pErr\nversion=1\nnRows=3\nnColumns=3\ninDegrees=no\nendheader\n\
time\tpelvis_tx\thip_flexion_r\n\
0.00\t0.010\t0.02\n\
0.01\t-0.020\t0.01\n\
\n\
0.02\t0.005\t-0.03\n";

    #[test]
    fn test_parse_delimited() {
        let table = DataTable::parse_delimited(Path::new("t_pErr.sto"), STO, 7).unwrap();
        assert_eq!(table.names(), vec!["time", "pelvis_tx", "hip_flexion_r"]);
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.values("pelvis_tx").unwrap(), vec![0.010, -0.020, 0.005]);
        assert_eq!(table.time().unwrap(), vec![0.0, 0.01, 0.02]);
    }

    #[test]
    fn test_non_numeric_token_names_file_and_line() {
        let bad = STO.replace("-0.020", "abc");
        let err = DataTable::parse_delimited(Path::new("t_pErr.sto"), &bad, 7).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("t_pErr.sto"));
        assert!(msg.contains("line 9"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_short_row_rejected() {
        let bad = STO.replace("0.01\t-0.020\t0.01", "0.01\t-0.020");
        let err = DataTable::parse_delimited(Path::new("x.sto"), &bad, 7).unwrap_err();
        assert!(matches!(err, Error::Numeric { .. }));
    }

    #[test]
    fn test_missing_header() {
        let err = DataTable::parse_delimited(Path::new("x.sto"), "a\nb\n", 7).unwrap_err();
        assert!(format!("{err}").contains("no header on line 7"));
    }

    #[test]
    fn test_missing_column_is_mismatch() {
        let table = DataTable::parse_delimited(Path::new("t_pErr.sto"), STO, 7).unwrap();
        let err = table.column("knee_angle_r").unwrap_err();
        assert_eq!(
            format!("{err}"),
            "Configuration mismatch: knee_angle_r not found in t_pErr.sto"
        );
    }

    #[test]
    fn test_select_and_rename() {
        let mut table = DataTable::parse_delimited(Path::new("t.sto"), STO, 7).unwrap();
        table
            .rename_columns(|n| (n == "pelvis_tx").then(|| "tx".to_string()))
            .unwrap();
        let picked = table.select(&["tx", "time"]).unwrap();
        assert_eq!(picked.names(), vec!["tx", "time"]);
        assert!(!picked.has_column("hip_flexion_r"));
    }

    #[test]
    fn test_replace_column_length_checked() {
        let mut table = DataTable::parse_delimited(Path::new("t.sto"), STO, 7).unwrap();
        let result = table.replace_column("pelvis_tx", Float64Array::from(vec![1.0]));
        assert!(result.unwrap_err().to_string().contains("Column length mismatch"));
        table
            .replace_column("pelvis_tx", Float64Array::from(vec![None, Some(1.0), None]))
            .unwrap();
        assert_eq!(table.column("pelvis_tx").unwrap().null_count(), 2);
    }

    #[test]
    fn test_parquet_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let table = DataTable::from_columns(
            "summary",
            vec![
                ("percentCycle".to_string(), vec![Some(0.0), Some(50.0), Some(100.0)]),
                ("mean".to_string(), vec![Some(1.5), None, Some(2.5)]),
            ],
        )
        .unwrap();
        let path = dir.path().join("summary.parquet");
        table.write_parquet(&path).unwrap();
        let loaded = DataTable::load_parquet(&path).unwrap();
        assert_eq!(loaded.names(), table.names());
        assert_eq!(loaded.column("mean").unwrap().null_count(), 1);
        assert_eq!(loaded.values("percentCycle").unwrap(), vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn test_header_lines() {
        assert_eq!(TableKind::GroundReaction.header_line(), 14);
        assert_eq!(TableKind::Motion.header_line(), 11);
        assert_eq!(TableKind::PositionError.header_line(), 7);
        assert_eq!(TableKind::Actuation.header_line(), 23);
    }
}
