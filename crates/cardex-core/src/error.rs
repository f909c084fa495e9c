use thiserror::Error;

/// Failure taxonomy shared by every pipeline component.
///
/// The split that matters operationally: `Transient` is the only retryable
/// variant; everything else is surfaced to the caller immediately.
#[derive(Debug, Error)]
pub enum Error {
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("embedding width drifted within one batch: expected {expected}, got {got}")]
    InconsistentDimension { expected: usize, got: usize },

    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("transient service error: {0}")]
    Transient(String),

    #[error("service rejected request: {0}")]
    Service(String),

    #[error("bulk upload left {} record(s) unindexed", .failed.len())]
    PartialUpload { failed: Vec<String> },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("operation requires pipeline state '{expected}', current state is '{actual}'")]
    State {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wrap a foreign error that has no dedicated variant.
    pub fn other<E: Into<anyhow::Error>>(err: E) -> Self {
        Error::Other(err.into())
    }

    /// True for errors a caller may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
