//! Error types for the host boundary.
//!
//! Two worlds meet here. The host runtime reports failures through a pending
//! error indicator holding a [`HostException`]; native code reports failures
//! as [`BindError`] values. The boundary shim converts between the two:
//!
//! ```text
//! host call fails ──(null handle)──> BindError::HostErrorOccurred (indicator fetched)
//! BindError ──(restore)──> pending HostException ──(null handle)──> host caller
//! ```

use std::fmt;

use thiserror::Error;

use crate::runtime;

/// Result alias used throughout the crate family.
pub type BindResult<T> = Result<T, BindError>;

/// Exception classes understood by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    TypeError,
    ValueError,
    AttributeError,
    IndexError,
    KeyError,
    OverflowError,
    ReferenceError,
    NotImplementedError,
    RuntimeError,
    SystemError,
}

impl ExceptionKind {
    /// Returns the host-visible class name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::ReferenceError => "ReferenceError",
            ExceptionKind::NotImplementedError => "NotImplementedError",
            ExceptionKind::RuntimeError => "RuntimeError",
            ExceptionKind::SystemError => "SystemError",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exception as stored in the host runtime's pending error indicator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct HostException {
    pub kind: ExceptionKind,
    pub message: String,
}

impl HostException {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Failures detected on either side of the boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    /// The host runtime has (had) a pending error: a null handle was produced
    /// or a call into the host raised. The pending exception has been moved
    /// out of the indicator into this value.
    #[error("host error occurred{}: {exception}", location_suffix(.location))]
    HostErrorOccurred {
        location: Option<String>,
        exception: HostException,
    },

    /// A runtime type tag or native conversion expectation was violated.
    #[error("type mismatch{}: expected {expected}, got {actual}", location_suffix(.location))]
    TypeMismatch {
        expected: String,
        actual: String,
        location: Option<String>,
    },

    /// Positional argument count does not match the declared arity.
    #[error("{function}() takes {expected} arguments but {actual} were given")]
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },

    /// A required parameter was supplied neither positionally nor by keyword.
    #[error("{function}() missing required argument '{name}'")]
    MissingArgument { function: String, name: String },

    /// A keyword argument names no declared parameter.
    #[error("{function}() got an unexpected keyword argument '{name}'")]
    UnexpectedKeyword { function: String, name: String },

    /// A parameter was supplied both positionally and by keyword.
    #[error("{function}() got multiple values for argument '{name}'")]
    DuplicateArgument { function: String, name: String },

    /// An integer does not fit the native target type.
    #[error("integer {value} out of range for {target}{}", location_suffix(.location))]
    Overflow {
        value: i128,
        target: &'static str,
        location: Option<String>,
    },

    /// The host-side proxy behind a back-reference has been destroyed.
    #[error("{method}(): back-reference to host object has expired")]
    DanglingOverrideReference { method: String },

    /// The live host-side proxy does not define the expected override.
    #[error("{method}(): pure virtual, but not defined in subclass")]
    OverrideNotFound { method: String },

    /// A native type was used before its type object was created.
    #[error("native type '{type_name}' is not registered with the host runtime")]
    UnregisteredType { type_name: String },

    /// A registration call arrived after the module was finalized.
    #[error("{operation}() called on module '{module}' after finalize()")]
    AlreadyFinalized {
        module: String,
        operation: &'static str,
    },

    /// The module was finalized twice.
    #[error("double call to finalize() on module '{module}'")]
    DoubleFinalize { module: String },

    /// Malformed registration (empty names, duplicates, bad parameter lists).
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    /// A native callable panicked while crossing the boundary.
    #[error("native code panicked: {message}")]
    Panic { message: String },

    /// Failure raised by native code itself.
    #[error("{message}")]
    Native { message: String },
}

fn location_suffix(location: &Option<String>) -> String {
    match location {
        Some(location) => format!(" in {location}"),
        None => String::new(),
    }
}

impl BindError {
    /// Capture the host runtime's pending error.
    ///
    /// The indicator is cleared. If nothing was pending the host broke its own
    /// protocol, which is reported as a `SystemError`.
    pub fn host_error(location: Option<&str>) -> Self {
        let exception = runtime::err_fetch().unwrap_or_else(|| {
            HostException::new(
                ExceptionKind::SystemError,
                "null handle returned without a pending error",
            )
        });
        BindError::HostErrorOccurred {
            location: location.map(str::to_owned),
            exception,
        }
    }

    pub fn type_mismatch(
        expected: impl Into<String>,
        actual: impl Into<String>,
        location: Option<&str>,
    ) -> Self {
        BindError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
            location: location.map(str::to_owned),
        }
    }

    pub fn native(message: impl Into<String>) -> Self {
        BindError::Native {
            message: message.into(),
        }
    }

    /// The host exception carried by `HostErrorOccurred`, if any.
    pub fn exception(&self) -> Option<&HostException> {
        match self {
            BindError::HostErrorOccurred { exception, .. } => Some(exception),
            _ => None,
        }
    }

    /// The exception class this error surfaces as on the host side.
    pub fn kind(&self) -> ExceptionKind {
        match self {
            BindError::HostErrorOccurred { exception, .. } => exception.kind,
            BindError::TypeMismatch { .. }
            | BindError::ArityMismatch { .. }
            | BindError::MissingArgument { .. }
            | BindError::UnexpectedKeyword { .. }
            | BindError::DuplicateArgument { .. }
            | BindError::UnregisteredType { .. } => ExceptionKind::TypeError,
            BindError::Overflow { .. } => ExceptionKind::OverflowError,
            BindError::DanglingOverrideReference { .. } => ExceptionKind::ReferenceError,
            BindError::OverrideNotFound { .. } => ExceptionKind::NotImplementedError,
            BindError::AlreadyFinalized { .. }
            | BindError::DoubleFinalize { .. }
            | BindError::InvalidRegistration(_)
            | BindError::Panic { .. }
            | BindError::Native { .. } => ExceptionKind::RuntimeError,
        }
    }

    /// Translate into the exception the host caller will observe.
    pub fn to_exception(&self) -> HostException {
        match self {
            BindError::HostErrorOccurred { exception, .. } => exception.clone(),
            other => HostException::new(other.kind(), other.to_string()),
        }
    }

    /// Hand this error back to the host by setting the pending indicator.
    pub fn restore(self) {
        let exception = match self {
            BindError::HostErrorOccurred { exception, .. } => exception,
            other => other.to_exception(),
        };
        runtime::err_restore(exception);
    }
}
