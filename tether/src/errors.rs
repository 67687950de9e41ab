use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic, Value};

/// Error kinds for Tether operations
///
/// This enum represents all possible error types that can occur while mapping
/// documents. Each kind describes a specific category of failure, enabling
/// precise error handling.
///
/// # Examples
///
/// ```rust,ignore
/// use tether::errors::{TetherError, ErrorKind, TetherResult};
///
/// fn example() -> TetherResult<()> {
///     Err(TetherError::new("schema not bound", ErrorKind::Config))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// Operation attempted before the owning schema was bound to a database
    Config,
    /// Malformed argument: bad index keys, wrong-schema batch element,
    /// malformed id-formatter template
    Argument,
    /// A field value violates its contract at save/upsert time
    Validation,
    /// A stored value's shape cannot be converted back to the declared field kind
    Deserialization,
    /// A unique index constraint was violated
    UniqueViolation,
    /// A retried storage operation ran out of attempts
    RetryExhausted,
    /// Any other failure reported by the storage collaborator
    Store,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => write!(f, "Configuration error"),
            ErrorKind::Argument => write!(f, "Argument error"),
            ErrorKind::Validation => write!(f, "Validation error"),
            ErrorKind::Deserialization => write!(f, "Deserialization error"),
            ErrorKind::UniqueViolation => write!(f, "Unique constraint violation"),
            ErrorKind::RetryExhausted => write!(f, "Retry exhausted"),
            ErrorKind::Store => write!(f, "Store error"),
        }
    }
}

/// Custom Tether error type.
///
/// `TetherError` encapsulates error information including the error message,
/// kind, and optional cause. It supports error chaining and backtraces for
/// debugging.
///
/// # Examples
///
/// ```rust,ignore
/// use tether::errors::{TetherError, ErrorKind};
///
/// // Create a simple error
/// let err = TetherError::new("unknown field 'age'", ErrorKind::Argument);
///
/// // Create an error with a cause
/// let cause = TetherError::new("counter table unreachable", ErrorKind::Store);
/// let err = TetherError::new_with_cause("counter increment failed", ErrorKind::RetryExhausted, cause);
/// ```
///
/// # Type alias
///
/// The `TetherResult<T>` type alias is equivalent to `Result<T, TetherError>`
/// and is used throughout the codebase for operations that can fail.
#[derive(Clone)]
pub struct TetherError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<TetherError>>,
    backtrace: Atomic<Backtrace>,
}

impl TetherError {
    /// Creates a new `TetherError` with the specified message and error kind.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    ///
    /// # Returns
    ///
    /// A new `TetherError` instance.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        TetherError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `TetherError` with a cause error.
    ///
    /// This creates an error chain where the cause error is preserved for
    /// debugging.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    /// * `cause` - The underlying error that caused this error
    ///
    /// # Returns
    ///
    /// A new `TetherError` instance with the cause error attached.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: TetherError) -> Self {
        TetherError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a validation error carrying the document type, field name and
    /// offending value, in that order.
    pub fn validation(type_name: &str, field: &str, value: &Value) -> Self {
        TetherError::new(
            &format!(
                "Validation failed on {}: trying to set {} <- {:?}",
                type_name, field, value
            ),
            ErrorKind::Validation,
        )
    }

    /// Creates a deserialization error for a stored value whose shape does not
    /// match the declared field kind.
    pub fn deserialization(field: &str, value: &Value) -> Self {
        TetherError::new(
            &format!("Can't deserialize value for field {}: {:?}", field, value),
            ErrorKind::Deserialization,
        )
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&TetherError> {
        self.cause.as_deref()
    }
}

impl Display for TetherError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {})", cause)?;
        }
        Ok(())
    }
}

impl Debug for TetherError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}: {}", self.error_kind, self.message)?;
        if let Some(cause) = &self.cause {
            writeln!(f, "caused by: {:?}", cause)?;
        }
        write!(f, "{:?}", self.backtrace.read())
    }
}

impl Error for TetherError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as &(dyn Error + 'static))
    }
}

/// Result type used throughout Tether.
pub type TetherResult<T> = Result<T, TetherError>;
