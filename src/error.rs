use crate::models::ModelKind;
use thiserror::Error;

/// Engine error taxonomy. The first two variants are expected,
/// data-insufficiency conditions that callers resolve through the fallback
/// path; the rest are operational failures tracked by the circuit breaker.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} model has not been trained")]
    ModelNotTrained(ModelKind),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("model training failed: {0}")]
    ModelTraining(String),

    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error("circuit breaker is open - recommendations temporarily disabled")]
    CircuitOpen,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    /// Expected conditions that should not trip the circuit breaker: the
    /// caller simply falls back instead of counting a failure.
    pub fn is_data_insufficiency(&self) -> bool {
        matches!(
            self,
            EngineError::ModelNotTrained(_) | EngineError::InsufficientData(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
