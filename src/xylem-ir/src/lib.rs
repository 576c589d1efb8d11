//! Expression intermediate representation for Xylem.
//!
//! The IR is an arena of [`ExprNode`]s addressed by [`ExprId`]. Each node
//! carries an [`AnnotationHolder`] of static properties that rewrite rules
//! consult, and the static type computed by the last annotation pass.

mod annotation;
mod arena;
mod context;
mod explain;
mod expr;

pub use annotation::{AnnotationHolder, AnnotationKey, AnnotationValue, Tristate};
pub use arena::{ExprArena, VarInfo};
pub use context::{QueryModule, StaticContext, UserFunction};
pub use explain::ExprView;
pub use expr::{
    Clause, ExprId, ExprKind, ExprNode, Flwor, FunctionId, IndexProbe, OrderSpec, VarId,
};
