//! Core error types for Xylem.

use thiserror::Error;

use crate::ErrorCode;

/// Result type alias using `XylemError`.
pub type XylemResult<T> = std::result::Result<T, XylemError>;

/// Generic boxed error for external error sources.
pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// Core error type for Xylem operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum XylemError {
    /// Compile-time error detected by type-checking or rewriting.
    #[error("StaticError [{code}]: {message}")]
    Static { code: ErrorCode, message: String },

    /// Error raised while a plan is executing.
    #[error("DynamicError [{code}]: {message}")]
    Dynamic { code: ErrorCode, message: String },

    /// Codegen was asked to build a call with the wrong number of arguments.
    #[error("ArityMismatch: {function} expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Execution was cancelled cooperatively.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration (unknown rule name, zero pass ceiling, ...).
    #[error("InvalidConfig: {0}")]
    InvalidConfig(String),

    /// Plan persistence failure, including schema version mismatches.
    #[error("PlanCodecError: {0}")]
    PlanCodec(String),

    /// Internal invariant violation (bug in Xylem).
    #[error("InternalError: {0}")]
    Internal(String),

    /// IO error.
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Binary serialization error.
    #[error("BincodeError: {0}")]
    BincodeError(#[from] bincode::Error),

    /// External error from third-party libraries.
    #[error("ExternalError: {0}")]
    ExternalError(GenericError),
}

impl XylemError {
    /// Create a new static error.
    pub fn static_error<S: Into<String>>(code: ErrorCode, msg: S) -> Self {
        Self::Static {
            code,
            message: msg.into(),
        }
    }

    /// Create a new dynamic error.
    pub fn dynamic<S: Into<String>>(code: ErrorCode, msg: S) -> Self {
        Self::Dynamic {
            code,
            message: msg.into(),
        }
    }

    /// Create a static type error (`XPTY0004`).
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        Self::static_error(ErrorCode::XPTY0004, msg)
    }

    /// Create an arity mismatch error.
    pub fn arity_mismatch<F: Into<String>, E: Into<String>>(
        function: F,
        expected: E,
        actual: usize,
    ) -> Self {
        Self::ArityMismatch {
            function: function.into(),
            expected: expected.into(),
            actual,
        }
    }

    /// Create a new `Internal` error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a cancellation error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a plan codec error.
    pub fn codec<S: Into<String>>(msg: S) -> Self {
        Self::PlanCodec(msg.into())
    }

    /// The stable error code, if this error belongs to one of the two
    /// language-level domains.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Static { code, .. } | Self::Dynamic { code, .. } => Some(*code),
            Self::ArityMismatch { .. } => Some(ErrorCode::XPST0017),
            _ => None,
        }
    }

    /// Whether this error aborts compilation rather than execution.
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Static { .. } | Self::ArityMismatch { .. })
    }
}

/// Ensure a condition holds, returning an `Internal` error if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::XylemError::Internal($msg.to_string()));
        }
    };
    ($cond:expr, $code:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::XylemError::dynamic(
                $crate::ErrorCode::$code,
                format!($($msg)*),
            ));
        }
    };
}

/// Return early with a dynamic error carrying the given code.
#[macro_export]
macro_rules! dynamic_err {
    ($code:ident, $($arg:tt)*) => {
        return Err($crate::XylemError::dynamic(
            $crate::ErrorCode::$code,
            format!($($arg)*),
        ))
    };
}

/// Return early with a static type error.
#[macro_export]
macro_rules! type_err {
    ($($arg:tt)*) => {
        return Err($crate::XylemError::type_error(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = XylemError::type_error("expected xs:integer, got xs:string");
        assert_eq!(
            err.to_string(),
            "StaticError [XPTY0004]: expected xs:integer, got xs:string"
        );

        let err = XylemError::dynamic(ErrorCode::FOAR0001, "division by zero");
        assert_eq!(err.to_string(), "DynamicError [FOAR0001]: division by zero");
    }

    #[test]
    fn test_error_domains() {
        let err = XylemError::arity_mismatch("op:add", "2", 3);
        assert!(err.is_static());
        assert_eq!(err.code(), Some(ErrorCode::XPST0017));
        assert_eq!(
            err.to_string(),
            "ArityMismatch: op:add expects 2 argument(s), got 3"
        );

        let err = XylemError::dynamic(ErrorCode::FORG0005, "bad");
        assert!(!err.is_static());
        assert_eq!(err.code(), Some(ErrorCode::FORG0005));

        assert_eq!(XylemError::internal("x").code(), None);
        assert!(matches!(XylemError::cancelled("q"), XylemError::Cancelled(_)));
    }

    fn guarded(n: i64) -> XylemResult<i64> {
        ensure!(n != 0, FOAR0001: "cannot divide {} by zero", 10);
        Ok(10 / n)
    }

    #[test]
    fn test_ensure_macro() {
        assert_eq!(guarded(2).unwrap(), 5);
        let err = guarded(0).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FOAR0001));
    }
}
