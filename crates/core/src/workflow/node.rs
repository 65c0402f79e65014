//! Workflow node definitions and the values nodes exchange

use certkeeper_common::NodeId;
use certkeeper_config::{ConfigError, ProviderConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output key under which an issuing node publishes its certificate bundle
pub const CERTIFICATE_OUTPUT: &str = "certificate";

/// What a node does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Obtain a certificate (runs the DNS-01 challenge cycle)
    Apply,
    /// Import an existing certificate
    Upload,
    /// Install a certificate into a target system
    Deploy,
    /// Report the run outcome
    Notify,
}

/// Reference from a node to one output of an upstream node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    /// Upstream node producing the value
    pub node_id: NodeId,
    /// Output key on the upstream node
    pub key: String,
    /// Name under which the value is handed to this node
    pub name: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl NodeInput {
    pub fn new(node_id: NodeId, key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_id,
            key: key.into(),
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// One node of a workflow definition
///
/// A snapshot is stored with every output the node produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    pub kind: NodeKind,
    /// Provider envelope (`{"provider": ..., "config": {...}}`) for apply and
    /// deploy nodes
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<NodeInput>,
}

impl WorkflowNode {
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            config: Value::Null,
            inputs: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_input(mut self, input: NodeInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// The provider envelope carried in `config`
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        serde_json::from_value(self.config.clone()).map_err(|e| ConfigError::Parse {
            provider: self.id.to_string(),
            message: e.to_string(),
        })
    }
}

/// One named output value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub key: String,
    pub value: Value,
}

impl OutputValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Certificate chain and private key handed from issuing to deploying nodes
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBundle {
    pub certificate: String,
    pub private_key: String,
}

impl CertificateBundle {
    pub fn new(certificate: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            certificate: certificate.into(),
            private_key: private_key.into(),
        }
    }

    /// As the well-known `certificate` output
    pub fn to_output(&self) -> OutputValue {
        OutputValue {
            key: CERTIFICATE_OUTPUT.to_string(),
            value: serde_json::json!({
                "certificate": self.certificate,
                "privateKey": self.private_key,
            }),
        }
    }
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}
