//! Domain layer for the testflow engine
//!
//! Data models, collaborator ports and the shared error type.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, OnError};
