//! Core data model for Xylem.
//!
//! This crate provides the types shared by every layer of the engine:
//! - `Item` and `NodeRef` for runtime values
//! - `SequenceType`, `ItemType` and `Occurrence` for static typing
//! - `QName` for function and element names
//! - operator kinds shared by the expression tree and the plan

pub mod ops;
pub mod qname;
pub mod types;

#[cfg(test)]
mod proptest_utils;

pub use ops::{Axis, NodeTest, Quantifier, TypeOp, UpdateKind};
pub use qname::QName;
pub use types::{Item, ItemType, NodeRef, Occurrence, Sequence, SequenceType};
