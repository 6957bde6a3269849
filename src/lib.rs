//! Testflow - operator console engine for agent test suites
//!
//! Testflow runs batches of conversational agent tests, compares them across
//! production and sandbox environments, and walks failures through a
//! diagnose → fix → verify → deploy loop.
//!
//! # Architecture
//!
//! Hexagonal layout:
//!
//! - **Domain Layer** (`domain`): models, errors and the port traits
//! - **Service Layer** (`services`): reconciler, live sessions, execution,
//!   comparison, fix lifecycle and workflow state
//! - **Adapters** (`adapters`): HTTP testing service client, sqlite and
//!   in-memory durable stores
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult, OnError};
pub use domain::models::{
    ComparisonRun, Config, ExecutionRequest, Fix, FixStatus, TestRun, WorkflowPhase, WorkflowRun,
};
pub use domain::ports::{ComparisonApi, DurableStore, ExecutionApi, FixApi};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    ComparisonOrchestrator, EventRouter, ExecutionCoordinator, FixTracker, LiveSessionTracker,
    WorkflowRunner, WorkflowStateMachine,
};
