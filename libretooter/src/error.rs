//! Error types for Retooter

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetooterError>;

/// Exit code used for every error that reaches the top level
pub const EXIT_FAILURE: i32 = 27;

#[derive(Error, Debug)]
pub enum RetooterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Watermark error: {0}")]
    Watermark(#[from] WatermarkError),

    #[error("Failed to read authorization code: {0}")]
    Prompt(#[source] std::io::Error),
}

impl RetooterError {
    /// Returns the process exit code for this error
    ///
    /// Every failure is fatal for the current run and shares one sentinel, so a
    /// scheduler can tell "retooter gave up" from a crash.
    pub fn exit_code(&self) -> i32 {
        match self {
            RetooterError::Config(_)
            | RetooterError::NotAuthenticated(_)
            | RetooterError::Api(_)
            | RetooterError::Watermark(_)
            | RetooterError::Prompt(_) => EXIT_FAILURE,
        }
    }

    /// Whether the operator has to change the environment before a rerun helps
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            RetooterError::Config(_) | RetooterError::NotAuthenticated(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set or invalid, check configuration")]
    NoAccountNameDefined(String),

    #[error("No {0} found, check configuration")]
    NoAllowedAccountsDefined(String),

    #[error("{0} is set to an invalid value, check configuration")]
    InvalidApiBaseUrl(String),

    #[error("Could not connect to the instance's API at {url}, consider defining {variable}")]
    UnsupportedInstance { url: String, variable: String },

    #[error("{0} is not valid UTF-8, check configuration")]
    NotUnicode(String),
}

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unsupported API version: {0}")]
    UnsupportedVersion(String),

    #[error("Unexpected response: {0}")]
    Response(String),
}

#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
