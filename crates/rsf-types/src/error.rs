use thiserror::Error;

#[derive(Error, Debug)]
pub enum RsfError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Forward solver failed at t={time:e}: {message}")]
    SolverError { time: f64, message: String },

    #[error("Fit failed after {iterations} iterations: {message}")]
    FitError { iterations: usize, message: String },

    #[error("Linear algebra error: {0}")]
    LinAlg(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RsfError {
    /// True for errors the caller can fix by adjusting inputs.
    pub fn is_config(&self) -> bool {
        matches!(self, RsfError::ConfigError(_))
    }
}

pub type RsfResult<T> = Result<T, RsfError>;
