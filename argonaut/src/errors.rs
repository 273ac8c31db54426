use std::io;
use std::result;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    IO(#[from] io::Error),

    /// The dataset's dimensions don't match either the points or the profiles layout.
    #[error("argo dataset structure not recognized: {0}")]
    InvalidStructure(String),

    #[error("no variable or coordinate named {0:?}")]
    BadName(String),

    #[error("invalid query: {0}")]
    BadQuery(String),

    /// The queried scope doesn't exist at the data source.
    #[error("not found: {0}")]
    NotFound(String),

    /// A snapshot file that was looked for doesn't exist.
    #[error("file not found: {0}")]
    MissingFile(String),

    #[error("unable to cast value {value:?} in {variable:?}")]
    BadCast { variable: String, value: String },

    #[error("unable to parse date: {0:?}")]
    BadDate(String),

    /// A failure reported by the underlying data source.
    #[error("data source error: {0}")]
    Source(String),

    /// Another task performing the same load failed. The original error is returned to the task
    /// that performed the load.
    #[error("concurrent load failed")]
    Load,
}

pub type Result<T> = result::Result<T, Error>;
