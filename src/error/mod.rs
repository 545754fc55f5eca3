use thiserror::Error;

/// Failure kinds surfaced by the catalog layer.
///
/// Callers are expected to map each kind to its own message: `EmptyResult`
/// is an ordinary "no matches" outcome, `NetworkFailure` is worth a retry,
/// and the two format variants mean the provider changed its payload.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The provider answered with an empty `ITEMS` array, or no title
    /// survived the local filters.
    #[error("No titles matched the selected filters")]
    EmptyResult,

    /// The transport could not complete the request.
    #[error("Network request failed: {0}")]
    NetworkFailure(String),

    /// The payload is missing `ITEMS` or a title is missing a field.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A genre or region listing could not be decoded.
    #[error("Unexpected response format: {0}")]
    UnexpectedFormat(String),

    /// Reading or writing the response cache failed.
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The caller handed the core something it must never receive.
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),
}

impl CatalogError {
    /// The provider's payload no longer matches what this program understands.
    pub fn needs_update(&self) -> bool {
        matches!(
            self,
            CatalogError::MalformedResponse(_) | CatalogError::UnexpectedFormat(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::NetworkFailure(_))
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, CatalogError::EmptyResult)
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CatalogError::NetworkFailure(format!("request timed out: {}", err))
        } else {
            CatalogError::NetworkFailure(err.to_string())
        }
    }
}
