//! Built-in function implementations evaluated by plan iterators.

mod atomic;
mod scalar;
mod sort;

pub use atomic::{
    atomize, canonical_string, compare_atomic, effective_boolean_value, general_compare,
    value_compare, ArithOp, CompareOp, Numeric,
};
pub use scalar::ScalarOp;
pub use sort::{SortDistinctMode, SortOrder};
