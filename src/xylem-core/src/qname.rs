//! Qualified names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix bound to the built-in function namespace.
pub const FN_PREFIX: &str = "fn";
/// Prefix bound to the internal operator namespace.
pub const OP_PREFIX: &str = "op";
/// Prefix for locally declared functions.
pub const LOCAL_PREFIX: &str = "local";

/// A resolved qualified name.
///
/// Namespace resolution happens before the IR is built, so a prefix here
/// always stands for one fixed namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    pub prefix: String,
    pub local: String,
}

impl QName {
    pub fn new<P: Into<String>, L: Into<String>>(prefix: P, local: L) -> Self {
        Self {
            prefix: prefix.into(),
            local: local.into(),
        }
    }

    /// A name in the `fn` namespace.
    pub fn func<L: Into<String>>(local: L) -> Self {
        Self::new(FN_PREFIX, local)
    }

    /// A name in the `op` namespace.
    pub fn op<L: Into<String>>(local: L) -> Self {
        Self::new(OP_PREFIX, local)
    }

    /// A name in the `local` namespace.
    pub fn local<L: Into<String>>(local: L) -> Self {
        Self::new(LOCAL_PREFIX, local)
    }

    /// Parse `prefix:local`; a bare name lands in the `fn` namespace.
    pub fn parse(s: &str) -> Self {
        match s.split_once(':') {
            Some((prefix, local)) => Self::new(prefix, local),
            None => Self::func(s),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!(QName::parse("op:add"), QName::op("add"));
        assert_eq!(QName::parse("count"), QName::func("count"));
        assert_eq!(QName::local("f").to_string(), "local:f");
    }
}
