//! Error handling for promshard
//!
//! Provides the unified error type shared by the builders, the cache and the
//! daemon. The variants follow the failure classes of a generation cycle:
//! validation and lookup failures are scoped to one pool or job, serialization
//! failures to one `(pool, instance)` pair, and store failures abort the cycle.

/// Result type alias for promshard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for promshard
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed pool timing, URL or relabel input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced receiver or send group cannot be found
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Document marshaling failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backing repository is unreachable
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration source errors
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a lookup error
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether this error must abort a whole generation cycle.
    ///
    /// Only store failures qualify: without the pool or child lists there is
    /// no safe partial state to publish.
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, Error::Store(_))
    }

    /// Get the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Lookup(_) => "lookup",
            Error::Serialization(_) => "serialization",
            Error::Store(_) => "store",
            Error::InvalidConfiguration(_) => "configuration",
            Error::Io(_) => "io",
            Error::Yaml(_) => "yaml",
            Error::Url(_) => "url",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

/// Extension trait for adding context to Results
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure
    fn with_context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| wrap(context.into(), e.into()))
    }

    fn with_context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(f(), e.into()))
    }
}

/// Prefix the message while keeping the failure class, so callers can still
/// tell a store outage from a validation problem after context is attached.
fn wrap(context: String, err: Error) -> Error {
    match err {
        Error::Validation(msg) => Error::Validation(format!("{}: {}", context, msg)),
        Error::Lookup(msg) => Error::Lookup(format!("{}: {}", context, msg)),
        Error::Serialization(msg) => Error::Serialization(format!("{}: {}", context, msg)),
        Error::Store(msg) => Error::Store(format!("{}: {}", context, msg)),
        Error::InvalidConfiguration(msg) => {
            Error::InvalidConfiguration(format!("{}: {}", context, msg))
        }
        Error::Yaml(e) => Error::Validation(format!("{}: {}", context, e)),
        Error::Url(e) => Error::Validation(format!("{}: {}", context, e)),
        other => Error::Other(anyhow::anyhow!("{}: {}", context, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::validation("scrape timeout exceeds interval");
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation error: scrape timeout exceeds interval"
        );
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::validation("test").category(), "validation");
        assert_eq!(Error::lookup("test").category(), "lookup");
        assert_eq!(Error::serialization("test").category(), "serialization");
        assert_eq!(Error::store("test").category(), "store");
    }

    #[test]
    fn test_only_store_errors_abort_cycle() {
        assert!(Error::store("connection refused").aborts_cycle());
        assert!(!Error::validation("bad timeout").aborts_cycle());
        assert!(!Error::lookup("missing receiver").aborts_cycle());
        assert!(!Error::serialization("bad yaml").aborts_cycle());
    }

    #[test]
    fn test_error_context_keeps_class() {
        let result: Result<()> = Err(Error::store("connection refused"));
        let err = result.with_context("listing jobs for pool 3").unwrap_err();

        assert!(err.aborts_cycle());
        assert!(err.to_string().contains("listing jobs for pool 3"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_context_from_url() {
        let result = url::Url::parse("not a url");
        let err = result
            .with_context_fn(|| format!("remote write url of pool {}", "edge-1"))
            .unwrap_err();

        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("edge-1"));
    }

    #[test]
    fn test_error_context_from_io() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let err = result.with_context("failed to read inventory").unwrap_err();

        assert!(matches!(err, Error::Other(_)));
        assert!(err.to_string().contains("failed to read inventory"));
        assert!(err.to_string().contains("file not found"));
    }
}
