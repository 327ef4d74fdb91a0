/// The narrow error surface this crate exposes.
///
/// Every fallible operation here is a contract violation caught at
/// construction time (a bad quantile, an empty target list, a non-positive
/// window) or a rejected non-finite sample; nothing here is retryable.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration or input, with a human-readable explanation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
