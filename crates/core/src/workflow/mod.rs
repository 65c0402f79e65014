//! Workflow output tracking
//!
//! Every node run of a workflow ends in exactly one persisted
//! [`WorkflowOutput`]. Downstream nodes read the latest successful output of
//! their upstream nodes; reruns append a new record instead of replacing
//! the old one.
//!
//! - [`WorkflowNode`]: node definition, snapshotted into each output
//! - [`OutputStore`]: record / latest / history queries
//! - [`NodeExecutor`]: resolves inputs, retries by error kind, persists
//! - [`DeployAction`]: runs a [`DeploymentProvider`](crate::deploy::DeploymentProvider)
//!   against the upstream `certificate` output

pub mod executor;
pub mod node;
pub mod output;
pub mod store;

pub use executor::{DeployAction, NodeAction, NodeError, NodeExecutor, ResolvedInputs, RetryPolicy};
pub use node::{CertificateBundle, NodeInput, NodeKind, OutputValue, WorkflowNode, CERTIFICATE_OUTPUT};
pub use output::{NewOutput, OutputStore, PersistenceError, WorkflowOutput};
pub use store::{FileOutputStore, MemoryOutputStore};
