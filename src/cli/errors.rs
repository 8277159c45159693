use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config file {path} not found. Pass one with -c/--config.")]
    MissingConfig { path: String },

    #[error("Invalid log file {path}")]
    InvalidLogfile { path: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Geefetch(#[from] geefetch::Error),
}
