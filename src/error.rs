use thiserror::Error;

use crate::runtime::MethodId;

macro_rules! lookup_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::LookupFailure {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::LookupFailure {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Lookup Errors
/// - [`Error::LookupFailure`] - A structural lookup found nothing
/// - [`Error::ClassNotFound`] - A class is not loaded in the foreign runtime
/// - [`Error::FieldNotFound`] - No field matched the requested name or type
/// - [`Error::FieldIndexOutOfRange`] - A positional field selector overran the declared fields
/// - [`Error::MethodNotFound`] - No method matched the requested name or shape
/// - [`Error::NullValue`] - A field that should reference an object holds null
/// - [`Error::AccessDenied`] - The runtime refused forced access to a private member
///
/// All of the above abort the current chain attempt without affecting the host, see
/// [`Error::is_lookup_failure`].
///
/// ## Invocation Errors
/// - [`Error::InvocationFailure`] - A reflective call into foreign code failed
/// - [`Error::TypeMismatch`] - Arguments or receiver do not fit the target member
/// - [`Error::HookError`] - A hook callback reported an error
///
/// ## Configuration Errors
/// - [`Error::SpeedOutOfRange`] - A speed outside `[0.2, 8.0]` was submitted
/// - [`Error::InvalidSpeed`] - The submitted text is not a number
/// - [`Error::FileError`] - Filesystem I/O errors on the preference store
/// - [`Error::XmlError`] - The preference store is not valid XML
///
/// ## Internal Errors
/// - [`Error::LockError`] - A lock was poisoned by a panicking thread
#[derive(Error, Debug)]
pub enum Error {
    /// A structural lookup did not find any matching member.
    ///
    /// Carries the source location where the lookup gave up, which helps when
    /// re-tuning a binding descriptor against a new foreign release.
    #[error("Lookup failed - {file}:{line}: {message}")]
    LookupFailure {
        /// The message to be printed for the LookupFailure error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The named class is not loaded in the foreign runtime.
    #[error("Class not found - {0}")]
    ClassNotFound(String),

    /// No field on the class (or its ancestors, where walked) matched.
    #[error("Field not found on {class} - {criteria}")]
    FieldNotFound {
        /// The class where the search started
        class: String,
        /// Description of the search criteria
        criteria: String,
    },

    /// A positional selector asked for a field that is not declared.
    #[error("Field index {index} out of range on {class} ({count} declared)")]
    FieldIndexOutOfRange {
        /// The class that was inspected
        class: String,
        /// The requested declaration index
        index: usize,
        /// The number of declared fields
        count: usize,
    },

    /// No method on the class matched the requested name or shape.
    #[error("Method not found on {class} - {criteria}")]
    MethodNotFound {
        /// The class where the search started
        class: String,
        /// Description of the search criteria
        criteria: String,
    },

    /// A field expected to hold an object reference holds null or a primitive.
    #[error("Expected an object in {0}")]
    NullValue(String),

    /// The runtime refused forced access to a private member.
    #[error("Access denied to {0}")]
    AccessDenied(String),

    /// The reflective call into foreign code failed.
    #[error("Invocation of {method} failed: {message}")]
    InvocationFailure {
        /// The method that was invoked
        method: MethodId,
        /// Description of the failure
        message: String,
    },

    /// Receiver or arguments do not fit the member being accessed.
    #[error("Type mismatch - {0}")]
    TypeMismatch(String),

    /// A hook callback reported an error.
    #[error("{0}")]
    HookError(String),

    /// The submitted speed lies outside the accepted range.
    #[error("Speed {0} is outside [0.2, 8.0]")]
    SpeedOutOfRange(f32),

    /// The submitted speed is not a valid number.
    #[error("Invalid speed value - {0}")]
    InvalidSpeed(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The preference store could not be parsed or written as XML.
    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Returns `true` for errors that mean "the chain cannot proceed this cycle".
    ///
    /// Access failures are classified as lookup failures: the member exists but is
    /// unreachable, which has the same consequence for the chain.
    #[must_use]
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            Error::LookupFailure { .. }
                | Error::ClassNotFound(_)
                | Error::FieldNotFound { .. }
                | Error::FieldIndexOutOfRange { .. }
                | Error::MethodNotFound { .. }
                | Error::NullValue(_)
                | Error::AccessDenied(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::LockError
    }
}
