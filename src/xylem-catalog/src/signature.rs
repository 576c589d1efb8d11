//! Function signatures.

use std::fmt;

use common_error::{XylemError, XylemResult};
use xylem_core::SequenceType;

/// Accepted argument count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Fixed(usize),
    /// Any count of at least `min`; arguments past the declared
    /// parameters take the type of the last one.
    Variadic { min: usize },
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Fixed(n) => count == n,
            Self::Variadic { min } => count >= min,
        }
    }

    pub fn is_variadic(self) -> bool {
        matches!(self, Self::Variadic { .. })
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Variadic { min } => write!(f, "at least {min}"),
        }
    }
}

/// Declared parameter types, return type and arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<SequenceType>,
    pub return_type: SequenceType,
    pub arity: Arity,
}

impl Signature {
    /// One parameter per argument.
    pub fn fixed(params: Vec<SequenceType>, return_type: SequenceType) -> Self {
        let arity = Arity::Fixed(params.len());
        Self {
            params,
            return_type,
            arity,
        }
    }

    /// Any number of arguments of type `param`, at least `min`.
    pub fn variadic(param: SequenceType, min: usize, return_type: SequenceType) -> Self {
        Self {
            params: vec![param],
            return_type,
            arity: Arity::Variadic { min },
        }
    }

    /// Declared type of argument `index`.
    pub fn param_type(&self, index: usize) -> SequenceType {
        self.params
            .get(index)
            .or_else(|| self.params.last())
            .copied()
            .unwrap_or_else(SequenceType::any)
    }

    /// Reject an argument count the signature does not cover.
    pub fn check_arity(&self, function: &str, count: usize) -> XylemResult<()> {
        if self.arity.accepts(count) {
            Ok(())
        } else {
            Err(XylemError::arity_mismatch(function, self.arity.to_string(), count))
        }
    }
}

#[cfg(test)]
mod tests {
    use xylem_core::ItemType;

    use super::*;

    #[test]
    fn test_fixed_arity() {
        let sig = Signature::fixed(
            vec![SequenceType::any(), SequenceType::any()],
            SequenceType::any(),
        );
        assert!(sig.check_arity("op:add", 2).is_ok());
        let err = sig.check_arity("op:add", 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ArityMismatch: op:add expects 2 argument(s), got 3"
        );
    }

    #[test]
    fn test_variadic_arity_and_param_types() {
        let string = SequenceType::optional(ItemType::AnyAtomic);
        let sig = Signature::variadic(string, 2, SequenceType::one(ItemType::String));
        assert!(!sig.arity.accepts(1));
        assert!(sig.arity.accepts(5));
        assert_eq!(sig.param_type(4), string);
        assert!(sig.check_arity("fn:concat", 1).is_err());
    }
}
