use thiserror::Error;

/// Domain failures that callers (CLI, HTTP handlers) need to tell apart.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no report link found on {0}")]
    ReportNotFound(String),

    #[error("{url} returned HTTP {status}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("{0} values are unavailable")]
    MissingValues(&'static str),

    #[error("{0}")]
    IncompleteValues(String),

    #[error("unknown prefecture: {0}")]
    UnknownPrefecture(String),

    #[error("unable to find sheet tab: {0}")]
    TabNotFound(String),

    #[error("google api error ({status}): {message}")]
    GoogleApi { status: u16, message: String },

    #[error("invalid image data: {0}")]
    InvalidImage(String),
}
