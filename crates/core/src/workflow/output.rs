//! Workflow output records and the store they are persisted in

use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;
use certkeeper_common::{Classify, ErrorKind, NodeId, OutputId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::node::{OutputValue, WorkflowNode};

/// Errors raised by an [`OutputStore`]
///
/// Always fatal for the run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A workflow or node id cannot be used as a storage key
    #[error("Invalid identifier '{0}'")]
    InvalidId(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be decoded
    #[error("Corrupt output record at {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    /// A record could not be serialized for writing
    #[error("Failed to encode output record for {}: {message}", path.display())]
    Encode { path: PathBuf, message: String },

    /// The run attempt slot was already written
    #[error("Output {workflow_id}/{node_id} attempt {attempt} already exists")]
    AlreadyExists {
        workflow_id: WorkflowId,
        node_id: NodeId,
        attempt: u32,
    },

    #[error("Output store unavailable: {0}")]
    Unavailable(String),
}

impl Classify for PersistenceError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Persistence
    }
}

/// The persisted outcome of one node run
///
/// Never mutated. A rerun writes a new record with the next `run_attempt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutput {
    pub id: OutputId,
    pub workflow_id: WorkflowId,
    pub node_id: NodeId,
    /// 1-based, increasing per (workflow, node)
    pub run_attempt: u32,
    /// Node definition used for this run
    pub node: WorkflowNode,
    #[serde(default)]
    pub outputs: Vec<OutputValue>,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowOutput {
    /// Value of the output named `key`
    pub fn output(&self, key: &str) -> Option<&serde_json::Value> {
        self.outputs.iter().find(|o| o.key == key).map(|o| &o.value)
    }
}

/// A record about to be written; the store assigns id, attempt and time
#[derive(Debug, Clone)]
pub struct NewOutput {
    pub workflow_id: WorkflowId,
    pub node_id: NodeId,
    pub node: WorkflowNode,
    pub outputs: Vec<OutputValue>,
    pub succeeded: bool,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl NewOutput {
    pub fn success(workflow_id: WorkflowId, node: WorkflowNode, outputs: Vec<OutputValue>) -> Self {
        Self {
            workflow_id,
            node_id: node.id.clone(),
            node,
            outputs,
            succeeded: true,
            error_kind: None,
            error: None,
        }
    }

    pub fn failure<E>(workflow_id: WorkflowId, node: WorkflowNode, error: &E) -> Self
    where
        E: Classify + std::fmt::Display,
    {
        Self {
            workflow_id,
            node_id: node.id.clone(),
            node,
            outputs: Vec::new(),
            succeeded: false,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
        }
    }

    /// Stamp the record for `attempt`
    pub fn into_output(self, attempt: u32) -> WorkflowOutput {
        WorkflowOutput {
            id: OutputId::new(),
            workflow_id: self.workflow_id,
            node_id: self.node_id,
            run_attempt: attempt,
            node: self.node,
            outputs: self.outputs,
            succeeded: self.succeeded,
            error_kind: self.error_kind,
            error: self.error,
            created_at: Utc::now(),
        }
    }
}

/// Persistence for node outputs
///
/// Records for one (workflow, node, attempt) are write-once. Writes for the
/// same pair are serialized; the highest attempt is the latest.
#[async_trait]
pub trait OutputStore: Send + Sync + Debug {
    /// Persist a new record under the next attempt number
    async fn record(&self, output: NewOutput) -> Result<WorkflowOutput, PersistenceError>;

    /// Most recent record for the pair
    async fn latest(
        &self,
        workflow_id: &WorkflowId,
        node_id: &NodeId,
    ) -> Result<Option<WorkflowOutput>, PersistenceError>;

    /// All records for the pair, oldest first
    async fn history(
        &self,
        workflow_id: &WorkflowId,
        node_id: &NodeId,
    ) -> Result<Vec<WorkflowOutput>, PersistenceError>;

    /// Latest record of every node in the workflow, ordered by node id
    async fn list_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<WorkflowOutput>, PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::node::NodeKind;

    #[test]
    fn test_output_json_shape() {
        let node = WorkflowNode::new(NodeId::new("apply"), "Apply", NodeKind::Apply);
        let output = NewOutput::success(
            WorkflowId::new("wf"),
            node,
            vec![OutputValue::new("domain", "example.com")],
        )
        .into_output(1);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["workflowId"], "wf");
        assert_eq!(json["nodeId"], "apply");
        assert_eq!(json["runAttempt"], 1);
        assert_eq!(json["succeeded"], true);
        assert_eq!(json["outputs"][0]["key"], "domain");
        assert_eq!(json["node"]["kind"], "apply");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("errorKind").is_none());

        assert_eq!(output.output("domain").unwrap(), "example.com");
        assert!(output.output("missing").is_none());
    }

    #[test]
    fn test_failure_record_carries_kind() {
        let node = WorkflowNode::new(NodeId::new("deploy"), "", NodeKind::Deploy);
        let err = PersistenceError::Unavailable("disk gone".into());
        let output = NewOutput::failure(WorkflowId::new("wf"), node, &err).into_output(2);

        assert!(!output.succeeded);
        assert_eq!(output.error_kind, Some(ErrorKind::Persistence));
        assert!(output.error.unwrap().contains("disk gone"));
    }
}
