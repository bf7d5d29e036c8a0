use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The date has no market data, or the provider itself could not be reached.
    /// Fatal for the run; never retried here.
    #[error("Market data unavailable for {date}: {reason}")]
    DataUnavailable { date: String, reason: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Wrap any provider failure for `date` as `DataUnavailable`.
    pub fn data_unavailable(date: impl std::fmt::Display, source: impl std::fmt::Display) -> Self {
        AppError::DataUnavailable {
            date: date.to_string(),
            reason: source.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
