//! Plan iterator execution for Xylem.
//!
//! A [`Plan`] is an immutable tree of iterators shared by any number of
//! executions. Each [`Execution`] owns a [`PlanState`] addressed by the
//! offsets the plan assigned to its nodes, so independent executions of
//! one plan never observe each other.

mod context;
mod executor;
pub mod functions;
mod iterators;
pub mod plan;
mod state;
pub mod store;
mod update;

pub use context::{CancellationHandle, DynamicContext};
pub use executor::Execution;
pub use iterators::{coerce, Evaluator};
pub use plan::{
    decode_plan, encode_plan, FunctionPlan, NodeMeta, Plan, PlanBuilder, PlanClause, PlanKind,
    PlanNode, PlanNodeId, VarSlot, PLAN_SCHEMA_VERSION,
};
pub use state::{IterPhase, PlanState, StateRecord};
pub use update::PendingUpdate;
