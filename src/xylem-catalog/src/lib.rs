//! Function and operator catalog for Xylem.
//!
//! The catalog is the single source of truth for every built-in function:
//! its signature, result type computation, evaluation properties, default
//! annotation behavior and the plan subtree a call lowers to. This crate
//! also hosts the passes that consult it:
//! - [`annotate`] computes static types and tri-state properties
//! - [`codegen`] lowers an annotated tree into a [`Plan`](xylem_runtime::Plan)

pub mod annotate;
mod builtins;
pub mod codegen;
mod entry;
mod signature;

pub use annotate::{annotate, annotate_module, produces_duplicates, produces_sorted_nodes, static_type};
pub use builtins::{sort_annotations, sort_mode, SORT_FAMILY};
pub use codegen::{generate, generate_expr};
pub use entry::{
    AnnotationBehavior, CatalogBuilder, CodegenFn, FunctionCatalog, FunctionEntry, FunctionProps,
    Producer, Propagation, TypeCheckFn,
};
pub use signature::{Arity, Signature};
