//! Node execution: input resolution, retries and output persistence
//!
//! [`NodeExecutor::run`] drives one node of a workflow run:
//!
//! 1. Resolve the node's inputs from the latest outputs of upstream nodes
//! 2. Optionally skip the node when its latest output already succeeded for
//!    an identical node definition and no upstream output is newer
//! 3. Execute the action, retrying retryable error kinds with backoff
//! 4. Persist exactly one [`WorkflowOutput`] describing the final outcome

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use certkeeper_common::{Classify, ErrorKind, KeyedLock, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::node::{CertificateBundle, OutputValue, WorkflowNode, CERTIFICATE_OUTPUT};
use super::output::{NewOutput, OutputStore, PersistenceError, WorkflowOutput};
use crate::deploy::{DeployContext, DeploymentProvider};

/// Terminal failure of a node, annotated with the provider that raised it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeError {
    kind: ErrorKind,
    provider: Option<String>,
    message: String,
    retry_after: Option<Duration>,
}

impl NodeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Wrap a provider error, keeping its kind and retry hint
    pub fn from_error<E>(provider: impl Into<String>, error: &E) -> Self
    where
        E: Classify + fmt::Display,
    {
        Self {
            kind: error.kind(),
            provider: Some(provider.into()),
            message: error.to_string(),
            retry_after: error.retry_after(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "run cancelled")
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "[{}] {}", provider, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for NodeError {}

impl Classify for NodeError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl From<PersistenceError> for NodeError {
    fn from(err: PersistenceError) -> Self {
        Self::new(ErrorKind::Persistence, err.to_string())
    }
}

/// Bounded exponential backoff for retryable failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base * 2^(attempt-1),
    /// capped at the maximum
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self.backoff_base_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }

    /// Backoff, stretched to any retry-after the vendor requested
    pub fn delay_for(&self, attempt: u32, error: &NodeError) -> Duration {
        let backoff = self.backoff(attempt);
        match error.retry_after() {
            Some(requested) => backoff.max(requested),
            None => backoff,
        }
    }
}

/// Input values resolved from upstream outputs, by input name
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs {
    values: BTreeMap<String, Value>,
}

impl ResolvedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The certificate bundle handed over by an issuing node
    pub fn certificate(&self) -> Result<CertificateBundle, NodeError> {
        let value = self.get(CERTIFICATE_OUTPUT).ok_or_else(|| {
            NodeError::new(
                ErrorKind::Configuration,
                format!("input '{}' is not connected", CERTIFICATE_OUTPUT),
            )
        })?;

        serde_json::from_value(value.clone()).map_err(|e| {
            NodeError::new(
                ErrorKind::InvalidCertificateMaterial,
                format!("input '{}' is not a certificate bundle: {}", CERTIFICATE_OUTPUT, e),
            )
        })
    }
}

/// The work a node performs
#[async_trait]
pub trait NodeAction: Send + Sync {
    /// Remote resource this action mutates; runs sharing a key never overlap
    fn resource_key(&self) -> Option<String> {
        None
    }

    /// Run one attempt
    async fn execute(
        &self,
        inputs: &ResolvedInputs,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputValue>, NodeError>;
}

/// Runs workflow nodes against an [`OutputStore`]
#[derive(Debug, Clone)]
pub struct NodeExecutor {
    store: Arc<dyn OutputStore>,
    policy: RetryPolicy,
    locks: KeyedLock,
    cancel: CancellationToken,
    skip_unchanged: bool,
}

impl NodeExecutor {
    pub fn new(store: Arc<dyn OutputStore>) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
            locks: KeyedLock::new(),
            cancel: CancellationToken::new(),
            skip_unchanged: false,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share resource locks with other executors or challenge managers
    pub fn with_locks(mut self, locks: KeyedLock) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reuse a prior successful output when nothing changed
    pub fn skip_unchanged(mut self, enabled: bool) -> Self {
        self.skip_unchanged = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn OutputStore> {
        &self.store
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `node` once for `workflow_id`
    ///
    /// Returns the persisted record on success. On failure the failed record
    /// is persisted first and the terminal error is returned. A
    /// [`PersistenceError`] surfaces as an error of kind `persistence`.
    pub async fn run(
        &self,
        workflow_id: &WorkflowId,
        node: &WorkflowNode,
        action: &dyn NodeAction,
    ) -> Result<WorkflowOutput, NodeError> {
        let (inputs, newest_input) = match self.resolve_inputs(workflow_id, node).await? {
            Ok(resolved) => resolved,
            Err(error) => return self.fail(workflow_id, node, error).await,
        };

        if self.skip_unchanged {
            if let Some(previous) = self.store.latest(workflow_id, &node.id).await? {
                let inputs_unchanged = newest_input.map_or(true, |t| t <= previous.created_at);
                if previous.succeeded && previous.node == *node && inputs_unchanged {
                    info!(
                        workflow_id = %workflow_id,
                        node_id = %node.id,
                        attempt = previous.run_attempt,
                        "Node unchanged since last successful run, skipping"
                    );
                    return Ok(previous);
                }
            }
        }

        let _guard = match action.resource_key() {
            Some(key) => Some(self.locks.acquire(&key).await),
            None => None,
        };

        match self.execute_with_retry(workflow_id, node, action, &inputs).await {
            Ok(outputs) => {
                let record = self
                    .store
                    .record(NewOutput::success(workflow_id.clone(), node.clone(), outputs))
                    .await?;
                info!(
                    workflow_id = %workflow_id,
                    node_id = %node.id,
                    attempt = record.run_attempt,
                    "Node succeeded"
                );
                Ok(record)
            }
            Err(error) => self.fail(workflow_id, node, error).await,
        }
    }

    /// Persist a failure record, then return the error
    async fn fail(
        &self,
        workflow_id: &WorkflowId,
        node: &WorkflowNode,
        error: NodeError,
    ) -> Result<WorkflowOutput, NodeError> {
        warn!(
            workflow_id = %workflow_id,
            node_id = %node.id,
            kind = %error.kind(),
            error = %error,
            "Node failed"
        );
        self.store
            .record(NewOutput::failure(workflow_id.clone(), node.clone(), &error))
            .await?;
        Err(error)
    }

    /// Resolve inputs; the inner error is a node failure to be persisted
    async fn resolve_inputs(
        &self,
        workflow_id: &WorkflowId,
        node: &WorkflowNode,
    ) -> Result<Result<(ResolvedInputs, Option<DateTime<Utc>>), NodeError>, PersistenceError> {
        let mut inputs = ResolvedInputs::new();
        let mut newest: Option<DateTime<Utc>> = None;

        for input in &node.inputs {
            let upstream = self.store.latest(workflow_id, &input.node_id).await?;
            let value = upstream
                .as_ref()
                .filter(|output| output.succeeded)
                .and_then(|output| output.output(&input.key).map(|v| (v, output.created_at)));

            match value {
                Some((value, created_at)) => {
                    inputs.insert(input.name.clone(), value.clone());
                    newest = newest.max(Some(created_at));
                }
                None if input.required => {
                    return Ok(Err(NodeError::new(
                        ErrorKind::Configuration,
                        format!(
                            "required input '{}' has no successful output '{}' from node '{}'",
                            input.name, input.key, input.node_id
                        ),
                    )));
                }
                None => {
                    debug!(
                        node_id = %node.id,
                        input = %input.name,
                        "Optional input unavailable"
                    );
                }
            }
        }

        Ok(Ok((inputs, newest)))
    }

    async fn execute_with_retry(
        &self,
        workflow_id: &WorkflowId,
        node: &WorkflowNode,
        action: &dyn NodeAction,
        inputs: &ResolvedInputs,
    ) -> Result<Vec<OutputValue>, NodeError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if self.cancel.is_cancelled() {
                return Err(NodeError::cancelled());
            }

            debug!(
                workflow_id = %workflow_id,
                node_id = %node.id,
                attempt = attempt,
                "Executing node"
            );

            let error = match action.execute(inputs, &self.cancel).await {
                Ok(outputs) => return Ok(outputs),
                Err(error) => error,
            };

            if !error.kind().is_retryable() || attempt >= max_attempts {
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt, &error);
            warn!(
                workflow_id = %workflow_id,
                node_id = %node.id,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Node attempt failed, retrying"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(NodeError::cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Deploys the upstream `certificate` input with one deployment provider
#[derive(Debug, Clone)]
pub struct DeployAction {
    provider: Arc<dyn DeploymentProvider>,
    timeout: Option<Duration>,
}

impl DeployAction {
    pub fn new(provider: Arc<dyn DeploymentProvider>) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    /// Deadline for each deployment attempt
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl NodeAction for DeployAction {
    fn resource_key(&self) -> Option<String> {
        Some(self.provider.resource_key())
    }

    async fn execute(
        &self,
        inputs: &ResolvedInputs,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputValue>, NodeError> {
        let bundle = inputs.certificate()?;

        let mut ctx = DeployContext::new().with_cancellation(cancel.clone());
        if let Some(timeout) = self.timeout {
            ctx = ctx.with_timeout(timeout);
        }

        let result = self
            .provider
            .deploy(&ctx, &bundle.certificate, &bundle.private_key)
            .await
            .map_err(|e| NodeError::from_error(self.provider.name(), &e))?;

        let mut outputs = vec![OutputValue::new("provider", result.provider.as_str())];
        outputs.extend(
            result
                .metadata
                .iter()
                .map(|(key, value)| OutputValue::new(key.as_str(), value.as_str())),
        );
        Ok(outputs)
    }
}
