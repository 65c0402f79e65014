//! Common utilities and shared components for certkeeper
//!
//! This crate provides functionality shared by the configuration and core
//! crates: the error-kind taxonomy, identifier newtypes, per-resource locks,
//! a named registry, and tracing initialization.
//!
//! # Module Organization
//!
//! - [`errors`]: Error kinds and retry classification
//! - [`ids`]: Type-safe identifier newtypes (WorkflowId, NodeId, OutputId)
//! - [`lock`]: Keyed async locks serializing calls per remote resource
//! - [`registry`]: Generic named registry
//! - [`observability`]: Tracing subscriber setup

pub mod errors;
pub mod ids;
pub mod lock;
pub mod observability;
pub mod registry;

pub use errors::{Classify, ErrorKind};
pub use ids::{NodeId, OutputId, WorkflowId};
pub use lock::{KeyedGuard, KeyedLock};
pub use observability::init_tracing;
pub use registry::Registry;
