use deltalake::arrow::error::ArrowError;
use deltalake::datafusion::error::DataFusionError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Delta Lake error: {0}")]
    DeltaTable(#[from] deltalake::DeltaTableError),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Cannot reshape {len} bytes into shape {shape:?}")]
    ShapeMismatch { shape: Vec<i64>, len: usize },

    #[error("Unsupported value: {0}")]
    UnsupportedType(String),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("{0}")]
    Other(String),
}

impl From<DataFusionError> for Error {
    fn from(err: DataFusionError) -> Self {
        Error::Query(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
