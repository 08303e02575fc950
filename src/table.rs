use crate::error::{ChartError, ColumnRole, DataError, Result};
use crate::record::{BenchmarkRecord, KeyValue, PartitionKey};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Which input columns feed each part of a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRoles {
    /// Columns splitting the table into one chart each (may be empty)
    pub partition_by: Vec<String>,
    /// Column holding the series label
    pub series_by: String,
    pub x: String,
    pub y: String,
}

impl Default for ColumnRoles {
    fn default() -> Self {
        Self {
            partition_by: Vec::new(),
            series_by: "method".to_string(),
            x: "threads".to_string(),
            y: "time_seconds".to_string(),
        }
    }
}

/// A delimited file held fully in memory.
#[derive(Debug, Clone)]
pub struct Table {
    source: PathBuf,
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl Table {
    /// Load a comma-separated file with a header row.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ChartError::io("open", path, e))?;
        Self::read(file, path)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::read(reader, Path::new("<reader>"))
    }

    fn read<R: Read>(reader: R, source: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| read_error(source, e))?
            .clone();

        let rows = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| read_error(source, e))?;

        Ok(Self {
            source: source.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str, role: ColumnRole) -> std::result::Result<usize, DataError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::MissingColumn {
                column: name.to_string(),
                role,
            })
    }

    /// Resolve `roles` against the header and type every row.
    ///
    /// All columns are checked before any row is read, so a missing column
    /// is reported even for a header-only file.
    pub fn records(&self, roles: &ColumnRoles) -> std::result::Result<Vec<BenchmarkRecord>, DataError> {
        let partition_columns = roles
            .partition_by
            .iter()
            .map(|name| {
                self.column(name, ColumnRole::Partition)
                    .map(|idx| (name.as_str(), idx))
            })
            .collect::<std::result::Result<Vec<_>, DataError>>()?;
        let series_column = self.column(&roles.series_by, ColumnRole::Series)?;
        let x_column = self.column(&roles.x, ColumnRole::X)?;
        let y_column = self.column(&roles.y, ColumnRole::Y)?;

        if self.rows.is_empty() {
            return Err(DataError::EmptyTable);
        }

        let mut records = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let line = row.position().map_or(0, |p| p.line());

            let mut partition = Vec::with_capacity(partition_columns.len());
            for &(name, idx) in &partition_columns {
                partition.push(KeyValue::parse(cell(row, line, idx, name)?));
            }

            records.push(BenchmarkRecord {
                line,
                series: cell(row, line, series_column, &roles.series_by)?.to_string(),
                partition: PartitionKey(partition),
                x: number(row, line, x_column, &roles.x)?,
                y: number(row, line, y_column, &roles.y)?,
            });
        }

        Ok(records)
    }
}

fn cell<'r>(
    row: &'r StringRecord,
    line: u64,
    idx: usize,
    column: &str,
) -> std::result::Result<&'r str, DataError> {
    match row.get(idx) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DataError::MissingValue {
            line,
            column: column.to_string(),
        }),
    }
}

fn number(
    row: &StringRecord,
    line: u64,
    idx: usize,
    column: &str,
) -> std::result::Result<f64, DataError> {
    let value = cell(row, line, idx, column)?;
    value.parse().map_err(|_| DataError::InvalidNumber {
        line,
        column: column.to_string(),
        value: value.to_string(),
    })
}

fn read_error(source: &Path, err: csv::Error) -> ChartError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(e) => ChartError::io("read", source, e),
        _ => DataError::Malformed(message).into(),
    }
}
