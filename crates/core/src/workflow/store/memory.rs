//! In-process output store

use std::collections::HashMap;

use async_trait::async_trait;
use certkeeper_common::{NodeId, WorkflowId};
use parking_lot::RwLock;
use tracing::debug;

use crate::workflow::output::{NewOutput, OutputStore, PersistenceError, WorkflowOutput};

/// Keeps every record in memory, history per (workflow, node)
#[derive(Debug, Default)]
pub struct MemoryOutputStore {
    records: RwLock<HashMap<(WorkflowId, NodeId), Vec<WorkflowOutput>>>,
}

impl MemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all pairs
    pub fn len(&self) -> usize {
        self.records.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutputStore for MemoryOutputStore {
    async fn record(&self, output: NewOutput) -> Result<WorkflowOutput, PersistenceError> {
        let mut records = self.records.write();
        let history = records
            .entry((output.workflow_id.clone(), output.node_id.clone()))
            .or_default();

        let attempt = history.len() as u32 + 1;
        let stored = output.into_output(attempt);
        history.push(stored.clone());

        debug!(
            workflow_id = %stored.workflow_id,
            node_id = %stored.node_id,
            attempt = attempt,
            succeeded = stored.succeeded,
            "Recorded workflow output"
        );
        Ok(stored)
    }

    async fn latest(
        &self,
        workflow_id: &WorkflowId,
        node_id: &NodeId,
    ) -> Result<Option<WorkflowOutput>, PersistenceError> {
        let records = self.records.read();
        Ok(records
            .get(&(workflow_id.clone(), node_id.clone()))
            .and_then(|history| history.last().cloned()))
    }

    async fn history(
        &self,
        workflow_id: &WorkflowId,
        node_id: &NodeId,
    ) -> Result<Vec<WorkflowOutput>, PersistenceError> {
        let records = self.records.read();
        Ok(records
            .get(&(workflow_id.clone(), node_id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<WorkflowOutput>, PersistenceError> {
        let records = self.records.read();
        let mut latest: Vec<WorkflowOutput> = records
            .iter()
            .filter(|((wf, _), _)| wf == workflow_id)
            .filter_map(|(_, history)| history.last().cloned())
            .collect();
        latest.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(latest)
    }
}
