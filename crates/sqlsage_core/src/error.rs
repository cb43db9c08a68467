use thiserror::Error;

/// Structured error payload extracted from a database backend.
///
/// Adapters fill in as much as their driver exposes (PostgreSQL's DETAIL
/// and HINT fields, SQLSTATE codes, Oracle error numbers). The error
/// analyzer consumes `message` verbatim; the rest enriches logs and the
/// error envelope returned to callers.
#[derive(Debug, Clone, Default)]
pub struct FormattedError {
    /// Primary error message as reported by the backend.
    pub message: String,

    /// Additional detail (e.g. PostgreSQL's DETAIL field).
    pub detail: Option<String>,

    /// Backend-provided fix suggestion (e.g. PostgreSQL's HINT field).
    pub hint: Option<String>,

    /// Error code (SQLSTATE, MySQL errno, ORA-xxxxx).
    pub code: Option<String>,
}

impl FormattedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Single-line rendering used by `Display` and the error history.
    pub fn to_display_string(&self) -> String {
        let mut parts = vec![self.message.clone()];

        if let Some(ref detail) = self.detail {
            parts.push(format!("Detail: {}", detail));
        }

        if let Some(ref hint) = self.hint {
            parts.push(format!("Hint: {}", hint));
        }

        if let Some(ref code) = self.code {
            parts.push(format!("Code: {}", code));
        }

        parts.join(". ")
    }
}

impl std::fmt::Display for FormattedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// Database and registry operation errors.
///
/// Every adapter, pool, and session operation returns this type so the
/// rest of the system handles failures uniformly. Variants carrying
/// `FormattedError` preserve the backend's native message, which the
/// error analyzer parses for retry hints.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish a connection to the database.
    #[error("Connection failed: {0}")]
    ConnectionFailed(FormattedError),

    /// Query execution failed.
    #[error("{0}")]
    QueryFailed(FormattedError),

    /// Authentication failed (wrong password, expired credentials).
    #[error("Authentication failed: {0}")]
    AuthFailed(FormattedError),

    /// Operation exceeded its deadline.
    #[error("Operation timed out")]
    Timeout,

    /// Operation was cancelled via a `CancelToken`.
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation not supported by this backend.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Connection parameters are malformed or missing required fields.
    #[error("Invalid connection parameters: {0}")]
    InvalidParams(String),

    /// Requested database type is not one of the supported dialects.
    #[error("Unsupported database type: {0}")]
    UnsupportedDatabase(String),

    /// Pool has reached its maximum size with every handle checked out.
    #[error("Connection pool exhausted for {key}")]
    PoolExhausted { key: String },

    /// No session bound to the request, or the session expired.
    #[error("No active session: {0}")]
    NoActiveSession(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Filesystem or network I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DbError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(FormattedError::new(msg))
    }

    pub fn query_failed(msg: impl Into<String>) -> Self {
        Self::QueryFailed(FormattedError::new(msg))
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthFailed(FormattedError::new(msg))
    }

    /// Access the structured payload, if the variant carries one.
    pub fn formatted(&self) -> Option<&FormattedError> {
        match self {
            Self::ConnectionFailed(f) | Self::QueryFailed(f) | Self::AuthFailed(f) => Some(f),
            _ => None,
        }
    }

    /// The backend's native message, used by the error analyzer.
    ///
    /// Falls back to the `Display` rendering for variants without a
    /// structured payload.
    pub fn native_message(&self) -> String {
        match self.formatted() {
            Some(f) => f.message.clone(),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_error_display_joins_parts() {
        let err = FormattedError::new("syntax error")
            .with_detail("near 'FROM'")
            .with_code("42601");

        assert_eq!(
            err.to_display_string(),
            "syntax error. Detail: near 'FROM'. Code: 42601"
        );
    }

    #[test]
    fn native_message_prefers_backend_text() {
        let err = DbError::QueryFailed(
            FormattedError::new("column \"amount\" does not exist").with_code("42703"),
        );
        assert_eq!(err.native_message(), "column \"amount\" does not exist");
    }

    #[test]
    fn native_message_falls_back_to_display() {
        assert_eq!(DbError::Timeout.native_message(), "Operation timed out");
    }
}
