use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Role a column plays when building charts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Partition,
    Series,
    X,
    Y,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnRole::Partition => "partition",
            ColumnRole::Series => "series",
            ColumnRole::X => "x axis",
            ColumnRole::Y => "y axis",
        };
        f.write_str(name)
    }
}

/// Problems with the content of the input table or the charts built from it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("input table has no data rows")]
    EmptyTable,

    #[error("missing required {role} column `{column}`")]
    MissingColumn { column: String, role: ColumnRole },

    #[error("line {line}: missing value in column `{column}`")]
    MissingValue { line: u64, column: String },

    #[error("line {line}: cannot parse `{value}` in column `{column}` as a number")]
    InvalidNumber {
        line: u64,
        column: String,
        value: String,
    },

    #[error("malformed row: {0}")]
    Malformed(String),

    #[error("cannot average an empty group of `{series}` points at x = {x}")]
    EmptyGroup { series: String, x: f64 },

    #[error("{axis} value {value} in series `{series}` cannot be drawn on a logarithmic axis")]
    NonPositiveOnLogAxis {
        axis: &'static str,
        series: String,
        value: f64,
    },

    #[error("charts for partitions {first} and {second} would both be written to `{file}`")]
    FileNameCollision {
        file: String,
        first: String,
        second: String,
    },
}

/// Errors surfaced by loading, building and rendering charts.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("failed to {action} `{}`", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Data(#[from] DataError),
}

impl ChartError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ChartError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, ChartError::Data(_))
    }
}

pub type Result<T, E = ChartError> = std::result::Result<T, E>;
