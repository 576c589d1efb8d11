//! Item values and static sequence types.

mod item;
mod sequence_type;

pub use item::{Item, NodeRef, Sequence};
pub use sequence_type::{ItemType, Occurrence, SequenceType};
