//! CLI command implementations.

pub mod compare;
pub mod execution;
pub mod fix;
pub mod workflow;
