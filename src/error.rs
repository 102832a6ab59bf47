use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid horizon {0}: months_ahead must be between 0 and {max}", max = crate::MAX_MONTHS_AHEAD)]
    InvalidHorizon(i32),

    #[error("Forecasting model failure: {0}")]
    ModelFailure(String),

    #[error("Insufficient data: {points} monthly points, at least {required} required")]
    InsufficientData { points: usize, required: usize },

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Series training exceeded its time budget")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
