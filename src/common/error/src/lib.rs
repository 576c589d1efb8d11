//! Error types and result aliases for Xylem.
//!
//! Errors fall into two domains: static errors abort compilation, dynamic
//! errors are raised while a plan is being driven. Both carry a stable
//! [`ErrorCode`].

mod code;
mod error;

pub use code::ErrorCode;
pub use error::{GenericError, XylemError, XylemResult};
