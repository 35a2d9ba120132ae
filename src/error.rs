use std::path::PathBuf;

use polars::prelude::PolarsError;
use smartcore::error::Failed;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HeartRiskError>;

#[derive(Error, Debug)]
pub enum HeartRiskError {
    #[error("reference dataset not found at {path:?}")]
    DatasetNotFound { path: PathBuf },
    #[error("model artifact not found at {path:?}")]
    ModelNotFound { path: PathBuf },
    #[error("dataset schema mismatch: missing columns {missing:?}, unexpected columns {unexpected:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("reference dataset has no rows")]
    EmptyDataset,
    #[error("missing value in column {column:?} at row {row}")]
    MissingValue { column: String, row: usize },
    #[error("invalid label {value:?} in row {row}, expected \"Yes\" or \"No\"")]
    InvalidLabel { value: String, row: usize },
    #[error("reference dataset needs both labels to train, found only {label}")]
    SingleClass { label: i32 },
    #[error("unknown survey field {name:?}")]
    UnknownField { name: String },
    #[error("invalid number {value:?} for field {field:?}")]
    InvalidNumber { field: String, value: String },
    #[error("value {value} for field {field:?} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("value {value:?} is not an allowed choice for field {field:?}")]
    UnknownCategory { field: String, value: String },
    #[error("option {value:?} for field {field:?} does not occur in the reference dataset")]
    UncoveredCategory { field: String, value: String },
    #[error("encoded feature vector has {actual} columns, the model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("encoded column {position} is {actual:?}, the model was trained on {expected:?}")]
    FeatureMismatch {
        position: usize,
        expected: String,
        actual: String,
    },
    #[error("model has no trees")]
    EmptyModel,
    #[error("background task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Model(#[from] Failed),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HeartRiskError {
    /// Whether the error was caused by the submitted answers rather than by
    /// the loaded dataset or model.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            HeartRiskError::UnknownField { .. }
                | HeartRiskError::InvalidNumber { .. }
                | HeartRiskError::OutOfRange { .. }
                | HeartRiskError::UnknownCategory { .. }
        )
    }
}
