use thiserror::Error;

/// Failure of a statistics query.
///
/// Every variant is reported to HTTP callers the same way; the variants only
/// exist so logs say where the query broke.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Database(#[from] diesel::result::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("unexpected result: {0}")]
    UnexpectedResult(String),
}

impl QueryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }
}
