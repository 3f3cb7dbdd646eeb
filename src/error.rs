//! Error types for the image cache and its storage backends.
//!
//! Every fallible operation in the library returns [`Error`], so the API
//! layer can tell "not found" and "upload in progress" apart from backend
//! failures and map them to protocol responses via [`Error::status_code`].

/// Result type for image cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Image cache errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The image does not exist, or the caller may not see it.
    #[error("image not found")]
    NoImage,

    /// An upload is already in flight for this image.
    #[error("image being uploaded")]
    ImageSaving,

    /// The image record was rejected before reaching any backend.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A stored metadata record could not be decoded.
    #[error("failed to decode image record '{key}': {reason}")]
    Decode { key: String, reason: String },

    /// An image could not be encoded for storage.
    #[error("failed to encode image '{id}': {reason}")]
    Encode { id: String, reason: String },

    /// Metadata database failure with context.
    #[error("metadata database error in {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: redb::Error,
    },

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A blocking backend task panicked or was cancelled.
    #[error("backend task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a database error with context.
    pub fn database(context: impl Into<String>, source: impl Into<redb::Error>) -> Self {
        Self::Database {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Create an invalid image error.
    pub fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage(reason.into())
    }

    /// Returns true if this error means the image is absent or hidden.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoImage)
    }

    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoImage => 404,
            Self::ImageSaving => 409,
            Self::InvalidImage(_) => 400,
            Self::Decode { .. }
            | Self::Encode { .. }
            | Self::Database { .. }
            | Self::Io { .. }
            | Self::Task(_) => 500,
        }
    }
}

/// Returns a closure that wraps a redb error with the given context.
///
/// Keeps the `map_err` calls in the redb backend on one line.
pub(crate) fn db_err<E: Into<redb::Error>>(context: &'static str) -> impl FnOnce(E) -> Error {
    move |source| Error::database(context, source)
}
