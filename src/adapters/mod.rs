//! Adapters for the ports in `domain::ports`.

pub mod http;
pub mod memory;
pub mod sqlite;
