use thiserror::Error;

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store record is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("could not prepare store directory: {0}")]
    Io(#[from] std::io::Error),

    /// No reachable page, or the page is not the CRM.
    #[error("page context unavailable: {0}")]
    ContextUnavailable(String),

    /// The coordinator task has shut down.
    #[error("coordinator is not running")]
    CoordinatorGone,

    #[error("{0}")]
    Page(String),
}
