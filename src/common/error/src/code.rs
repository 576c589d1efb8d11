//! Stable error codes.

use std::fmt;

/// A stable, externally visible error code.
///
/// Codes follow the W3C naming scheme so that callers can match on them
/// across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A component of the dynamic context is missing.
    XPDY0002,
    /// Static type error: an operand does not match the expected type.
    XPTY0004,
    /// Reference to an undeclared variable.
    XPST0008,
    /// Unknown function or wrong number of arguments.
    XPST0017,
    /// A path step returned a mix of nodes and atomic values.
    XPTY0018,
    /// A path step was applied to an atomic value.
    XPTY0019,
    /// `treat as` failed at runtime.
    XPDY0050,
    /// Division by zero.
    FOAR0001,
    /// Numeric overflow or underflow.
    FOAR0002,
    /// Invalid lexical value during a cast.
    FOCA0002,
    /// Document could not be retrieved.
    FODC0002,
    /// Raised by `fn:error`.
    FOER0000,
    /// Invalid value for a cast or constructor.
    FORG0001,
    /// `fn:zero-or-one` called with more than one item.
    FORG0003,
    /// `fn:one-or-more` called with an empty sequence.
    FORG0004,
    /// `fn:exactly-one` called with a sequence of the wrong length.
    FORG0005,
    /// Invalid argument type, e.g. the effective boolean value is undefined.
    FORG0006,
    /// Call depth exceeded while evaluating user functions.
    XQDY0054,
}

impl ErrorCode {
    /// The canonical string form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::XPDY0002 => "XPDY0002",
            Self::XPTY0004 => "XPTY0004",
            Self::XPST0008 => "XPST0008",
            Self::XPST0017 => "XPST0017",
            Self::XPTY0018 => "XPTY0018",
            Self::XPTY0019 => "XPTY0019",
            Self::XPDY0050 => "XPDY0050",
            Self::FOAR0001 => "FOAR0001",
            Self::FOAR0002 => "FOAR0002",
            Self::FOCA0002 => "FOCA0002",
            Self::FODC0002 => "FODC0002",
            Self::FOER0000 => "FOER0000",
            Self::FORG0001 => "FORG0001",
            Self::FORG0003 => "FORG0003",
            Self::FORG0004 => "FORG0004",
            Self::FORG0005 => "FORG0005",
            Self::FORG0006 => "FORG0006",
            Self::XQDY0054 => "XQDY0054",
        }
    }

    /// Whether the code belongs to the static (compile-time) domain.
    pub fn is_static(&self) -> bool {
        matches!(self, Self::XPTY0004 | Self::XPST0008 | Self::XPST0017)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
