//! certkeeper core
//!
//! Certificate lifecycle automation building blocks:
//!
//! - **Challenges**: DNS-01 TXT record providers for several DNS vendors,
//!   propagation checks against public resolvers, and a manager running one
//!   serialized present / validate / clean up cycle per domain
//! - **Deployment**: validated installation of certificate chains and keys
//!   into target systems
//! - **Workflow**: per-node output records, input chaining between nodes,
//!   and retry by error kind
//!
//! # Example
//!
//! ```ignore
//! use certkeeper_core::deploy::DeploymentProviderRegistry;
//! use certkeeper_core::workflow::{DeployAction, FileOutputStore, NodeExecutor};
//!
//! let provider = DeploymentProviderRegistry::with_builtin().create(&node.provider_config()?)?;
//! let executor = NodeExecutor::new(Arc::new(FileOutputStore::new("/var/lib/certkeeper")));
//! let record = executor.run(&workflow_id, &node, &DeployAction::new(provider)).await?;
//! ```

pub mod challenge;
pub mod deploy;
pub mod workflow;

pub(crate) mod http;

pub use challenge::{
    ChallengeError, ChallengeProvider, ChallengeProviderRegistry, Dns01Challenge,
    Dns01ChallengeManager, Dns01Provider, DnsRecordClient, PropagationChecker,
};
pub use deploy::{
    CertificateMaterial, DeployContext, DeployError, DeploymentProvider,
    DeploymentProviderRegistry, DeploymentResult,
};
pub use workflow::{
    NodeAction, NodeError, NodeExecutor, OutputStore, PersistenceError, WorkflowNode,
    WorkflowOutput,
};
