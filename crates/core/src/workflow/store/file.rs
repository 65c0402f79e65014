//! Filesystem output store
//!
//! # Directory layout
//!
//! ```text
//! <root>/
//!   <workflow-id>/
//!     <node-id>/
//!       00000001.json
//!       00000002.json
//! ```
//!
//! Each record is written to a temp file in the node directory, then moved
//! into its attempt slot without replacing an existing file. All disk I/O
//! runs on the blocking pool.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use certkeeper_common::{KeyedLock, NodeId, WorkflowId};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::workflow::output::{NewOutput, OutputStore, PersistenceError, WorkflowOutput};

const RECORD_EXTENSION: &str = "json";

/// Stores each output as one JSON file
#[derive(Debug, Clone)]
pub struct FileOutputStore {
    root: PathBuf,
    locks: KeyedLock,
}

impl FileOutputStore {
    /// Store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: KeyedLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workflow_dir(&self, workflow_id: &WorkflowId) -> Result<PathBuf, PersistenceError> {
        Ok(self.root.join(safe_segment(workflow_id.as_str())?))
    }

    fn node_dir(&self, workflow_id: &WorkflowId, node_id: &NodeId) -> Result<PathBuf, PersistenceError> {
        Ok(self
            .workflow_dir(workflow_id)?
            .join(safe_segment(node_id.as_str())?))
    }
}

#[async_trait]
impl OutputStore for FileOutputStore {
    async fn record(&self, output: NewOutput) -> Result<WorkflowOutput, PersistenceError> {
        let dir = self.node_dir(&output.workflow_id, &output.node_id)?;
        let _guard = self
            .locks
            .acquire(&format!("{}/{}", output.workflow_id, output.node_id))
            .await;

        let stored = blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

            let attempt = attempts(&dir)?.last().copied().unwrap_or(0) + 1;
            let stored = output.into_output(attempt);
            let path = record_path(&dir, attempt);

            let body = encode(&stored, &path)?;

            let mut staged = NamedTempFile::new_in(&dir).map_err(|e| io_error(&dir, e))?;
            staged
                .write_all(&body)
                .and_then(|_| staged.as_file().sync_all())
                .map_err(|e| io_error(staged.path(), e))?;

            staged.persist_noclobber(&path).map_err(|e| {
                if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    PersistenceError::AlreadyExists {
                        workflow_id: stored.workflow_id.clone(),
                        node_id: stored.node_id.clone(),
                        attempt,
                    }
                } else {
                    io_error(&path, e.error)
                }
            })?;

            Ok(stored)
        })
        .await?;

        debug!(
            workflow_id = %stored.workflow_id,
            node_id = %stored.node_id,
            attempt = stored.run_attempt,
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
        let dir = self.node_dir(workflow_id, node_id)?;
        blocking(move || match attempts(&dir)?.last() {
            Some(attempt) => read_record(&record_path(&dir, *attempt)).map(Some),
            None => Ok(None),
        })
        .await
    }

    async fn history(
        &self,
        workflow_id: &WorkflowId,
        node_id: &NodeId,
    ) -> Result<Vec<WorkflowOutput>, PersistenceError> {
        let dir = self.node_dir(workflow_id, node_id)?;
        blocking(move || {
            attempts(&dir)?
                .into_iter()
                .map(|attempt| read_record(&record_path(&dir, attempt)))
                .collect()
        })
        .await
    }

    async fn list_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<WorkflowOutput>, PersistenceError> {
        let dir = self.workflow_dir(workflow_id)?;
        blocking(move || {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(io_error(&dir, e)),
            };

            let mut node_dirs = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| io_error(&dir, e))?;
                if entry.path().is_dir() {
                    node_dirs.push(entry.path());
                }
            }
            node_dirs.sort();

            let mut latest = Vec::new();
            for node_dir in node_dirs {
                if let Some(attempt) = attempts(&node_dir)?.last() {
                    latest.push(read_record(&record_path(&node_dir, *attempt))?);
                }
            }
            Ok(latest)
        })
        .await
    }
}

/// Accept ids made of `[A-Za-z0-9_.-]`, excluding `.` and `..`
fn safe_segment(id: &str) -> Result<&str, PersistenceError> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(id)
    } else {
        Err(PersistenceError::InvalidId(id.to_string()))
    }
}

fn record_path(dir: &Path, attempt: u32) -> PathBuf {
    dir.join(format!("{:08}.{}", attempt, RECORD_EXTENSION))
}

/// Attempt numbers present in `dir`, ascending; empty if it does not exist
fn attempts(dir: &Path) -> Result<Vec<u32>, PersistenceError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir, e)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
            continue;
        }
        match path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        {
            Some(attempt) => found.push(attempt),
            None => warn!(path = %path.display(), "Ignoring unexpected file in output store"),
        }
    }
    found.sort_unstable();
    Ok(found)
}

fn encode<T: Serialize>(record: &T, path: &Path) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec_pretty(record).map_err(|e| PersistenceError::Encode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn read_record(path: &Path) -> Result<WorkflowOutput, PersistenceError> {
    let data = std::fs::read(path).map_err(|e| io_error(path, e))?;
    serde_json::from_slice(&data).map_err(|e| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn blocking<T, F>(task: F) -> Result<T, PersistenceError>
where
    F: FnOnce() -> Result<T, PersistenceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| PersistenceError::Unavailable(format!("store task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::node::{NodeKind, OutputValue, WorkflowNode};

    fn new_output(workflow: &str, node: &str, value: &str) -> NewOutput {
        NewOutput::success(
            WorkflowId::new(workflow),
            WorkflowNode::new(NodeId::new(node), node, NodeKind::Deploy),
            vec![OutputValue::new("value", value)],
        )
    }

    #[test]
    fn test_safe_segment() {
        assert!(safe_segment("renew-example.com_1").is_ok());
        assert!(safe_segment("").is_err());
        assert!(safe_segment(".").is_err());
        assert!(safe_segment("..").is_err());
        assert!(safe_segment("a/b").is_err());
        assert!(safe_segment("a b").is_err());
    }

    #[tokio::test]
    async fn test_layout_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutputStore::new(dir.path());

        store.record(new_output("wf", "deploy", "1")).await.unwrap();
        store.record(new_output("wf", "deploy", "2")).await.unwrap();

        let node_dir = dir.path().join("wf").join("deploy");
        assert!(node_dir.join("00000001.json").is_file());
        assert!(node_dir.join("00000002.json").is_file());
        assert_eq!(std::fs::read_dir(&node_dir).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutputStore::new(dir.path());

        let err = store.record(new_output("../escape", "a", "x")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidId(_)));
    }

    #[tokio::test]
    async fn test_corrupt_record_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutputStore::new(dir.path());
        store.record(new_output("wf", "a", "x")).await.unwrap();

        std::fs::write(dir.path().join("wf/a/00000002.json"), b"{not json").unwrap();

        let err = store
            .latest(&WorkflowId::new("wf"), &NodeId::new("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
    }

    #[test]
    fn test_serialization_failure_is_not_corruption() {
        struct Unencodable;

        impl Serialize for Unencodable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("value has no JSON form"))
            }
        }

        let path = Path::new("/outputs/wf/a/00000001.json");
        let err = encode(&Unencodable, path).unwrap_err();

        match &err {
            PersistenceError::Encode { path: p, message } => {
                assert_eq!(p, path);
                assert!(message.contains("no JSON form"));
            }
            other => panic!("expected an encode error, got {:?}", other),
        }
        assert!(err.to_string().starts_with("Failed to encode"));
    }

    #[tokio::test]
    async fn test_pair_locks_released_after_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutputStore::new(dir.path());

        for node in ["a", "b", "c"] {
            store.record(new_output("wf", node, "x")).await.unwrap();
        }
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_pair_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutputStore::new(dir.path().join("not-created-yet"));

        let latest = store
            .latest(&WorkflowId::new("wf"), &NodeId::new("a"))
            .await
            .unwrap();
        assert!(latest.is_none());
        assert!(store
            .list_workflow(&WorkflowId::new("wf"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_records_for_same_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutputStore::new(dir.path());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record(new_output("wf", "a", &i.to_string()))
                    .await
                    .unwrap()
                    .run_attempt
            }));
        }

        let mut attempts = Vec::new();
        for handle in handles {
            attempts.push(handle.await.unwrap());
        }
        attempts.sort_unstable();
        assert_eq!(attempts, (1..=8).collect::<Vec<u32>>());
    }
}
