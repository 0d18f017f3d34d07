use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// The explore page rendered no destinations, usually because the site
    /// blocked the session.
    #[error("No results on explore page (blocked or empty): {locator}")]
    BlockedOrEmptyResult { locator: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Link shortening failed: {0}")]
    Shortener(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
