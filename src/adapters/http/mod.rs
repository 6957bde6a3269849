//! HTTP adapter for the remote testing service.

pub mod client;
pub mod errors;

pub use client::HttpTestingApi;
pub use errors::ApiClientError;
