use std::path::PathBuf;

/// Errors that can occur while provisioning Sentry resources.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to a `miette` report at the boundary.
///
/// # Examples
///
/// ```
/// use provision_core::ProvisionError;
///
/// let err = ProvisionError::Config("AUTH_TOKEN not set".into());
/// assert!(err.to_string().contains("AUTH_TOKEN"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The Sentry API answered with a non-success status.
    #[error("Sentry API error {status}: {body}")]
    Http {
        /// HTTP status code returned by the API.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The request never produced a response (connect, timeout, decode).
    #[error("request failed: {0}")]
    Request(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Template substitution failure.
    #[error("template error: {0}")]
    Template(String),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl ProvisionError {
    /// Returns `true` when the API rejected the request with an HTTP status.
    pub fn is_http(&self) -> bool {
        matches!(self, ProvisionError::Http { .. })
    }

    /// HTTP status code, if this error came from an API response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProvisionError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
