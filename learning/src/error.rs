use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used in the entire learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Csv(csv::Error),
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    MissingColumn {
        table: String,
        column: String,
    },
    DuplicateKey {
        table: String,
        key: String,
    },
    InvalidValue {
        table: String,
        row: usize,
        column: String,
        value: String,
    },
    UnknownLabel(String),
    EmptyDataset,
    InvalidPartitions(usize),
    InvalidSplit(f32),
    NotInitialized,
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            MlErr::Csv(e) => write!(f, "csv error: {e}"),
            MlErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
            ),
            MlErr::MissingColumn { table, column } => {
                write!(f, "table {table} has no column named {column}")
            }
            MlErr::DuplicateKey { table, key } => {
                write!(f, "table {table} has the join key {key} more than once")
            }
            MlErr::InvalidValue {
                table,
                row,
                column,
                value,
            } => write!(
                f,
                "table {table} row {row} column {column}: {value:?} is not a number"
            ),
            MlErr::UnknownLabel(label) => write!(f, "the label {label:?} was never fitted"),
            MlErr::EmptyDataset => f.write_str("the dataset has no samples"),
            MlErr::InvalidPartitions(n) => {
                write!(f, "can't split a dataset into {n} partitions")
            }
            MlErr::InvalidSplit(size) => {
                write!(f, "the test size must be within (0, 1), got {size}")
            }
            MlErr::NotInitialized => {
                f.write_str("the model parameters haven't been initialized")
            }
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io { source, .. } => Some(source),
            MlErr::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<csv::Error> for MlErr {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}
