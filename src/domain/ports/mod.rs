//! Port trait definitions (Hexagonal Architecture)
//!
//! - `ExecutionApi`, `ComparisonApi`, `FixApi`: the external testing service
//! - `DurableStore`: client-side state that survives restarts

pub mod durable_store;
pub mod testing_api;

pub use durable_store::{get_json, set_json, DurableStore};
pub use testing_api::{ComparisonApi, ExecutionApi, FixApi};
