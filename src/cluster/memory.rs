//! In-process [`ClusterAccessor`] with injectable failures and a call log.
//!
//! Documents are keyed by id. Bulk copies snapshot the source documents when
//! they start and land them in the destination when the task completes, after
//! a configurable number of polls; ids already present in the destination are
//! left alone, like a copy with `op_type: create`. Every mutating call is appended to [`InMemoryCluster::calls`] so
//! tests can assert on ordering.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    is_reserved_index, BulkCopyStarted, ClusterAccessor, IndexMetadata, TaskProgress, TaskStatus,
};
use crate::error::{IndexctlError, Result};

const EPOCH_MS: i64 = 1_600_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    CreateIndex(String),
    DeleteIndex(String),
    StartBulkCopy { source: String, destination: String },
    TaskCompleted { destination: String },
    TaskFailed { destination: String },
    PutClusterSetting(String),
}

#[derive(Debug, Clone)]
struct StoredIndex {
    creation_date: i64,
    mappings: serde_json::Value,
    settings: serde_json::Value,
    documents: Vec<(String, serde_json::Value)>,
}

#[derive(Debug)]
struct CopyTask {
    destination: String,
    snapshot: Vec<(String, serde_json::Value)>,
    polls_remaining: u32,
    finished: bool,
}

#[derive(Default)]
struct Failures {
    create: HashMap<String, String>,
    delete: HashMap<String, String>,
    copy_start: HashMap<String, Vec<String>>,
    task: HashMap<String, String>,
    documents: HashMap<String, Vec<String>>,
}

#[derive(Default)]
struct State {
    indices: BTreeMap<String, StoredIndex>,
    tasks: HashMap<String, CopyTask>,
    settings: HashMap<String, serde_json::Value>,
    calls: Vec<ClusterCall>,
    failures: Failures,
    clock: i64,
    next_task: u64,
    next_document: u64,
    polls: u64,
}

pub struct InMemoryCluster {
    state: Mutex<State>,
    polls_to_complete: u32,
    latency: Duration,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::with_polls_to_complete(2)
    }

    /// Copy tasks report `completed` on the `polls`-th poll (minimum 1).
    pub fn with_polls_to_complete(polls: u32) -> Self {
        Self {
            state: Mutex::new(State {
                clock: EPOCH_MS,
                ..Default::default()
            }),
            polls_to_complete: polls.max(1),
            latency: Duration::ZERO,
        }
    }

    /// Index creation and deletion take `latency` to answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn respond_after_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an index directly, bypassing the call log. Creation dates advance
    /// by one second per index so seeding order is creation order.
    pub fn seed_index(&self, name: &str) {
        let mut state = self.lock();
        state.clock += 1000;
        let creation_date = state.clock;
        state.indices.insert(
            name.to_string(),
            StoredIndex {
                creation_date,
                mappings: serde_json::json!({}),
                settings: serde_json::json!({}),
                documents: Vec::new(),
            },
        );
    }

    /// Seed an index with an explicit creation date.
    pub fn seed_index_at(&self, name: &str, creation_date: i64) {
        let mut state = self.lock();
        state.indices.insert(
            name.to_string(),
            StoredIndex {
                creation_date,
                mappings: serde_json::json!({}),
                settings: serde_json::json!({}),
                documents: Vec::new(),
            },
        );
    }

    /// Index documents under generated ids, unique across the cluster.
    pub fn add_documents(&self, index: &str, documents: Vec<serde_json::Value>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(stored) = state.indices.get_mut(index) {
            for document in documents {
                state.next_document += 1;
                stored
                    .documents
                    .push((format!("doc-{}", state.next_document), document));
            }
        }
    }

    /// Index or overwrite the document stored under `id`.
    pub fn put_document(&self, index: &str, id: &str, document: serde_json::Value) {
        let mut state = self.lock();
        if let Some(stored) = state.indices.get_mut(index) {
            match stored.documents.iter_mut().find(|(existing, _)| existing == id) {
                Some((_, slot)) => *slot = document,
                None => stored.documents.push((id.to_string(), document)),
            }
        }
    }

    /// Document bodies in indexing order.
    pub fn documents(&self, index: &str) -> Option<Vec<serde_json::Value>> {
        self.lock()
            .indices
            .get(index)
            .map(|i| i.documents.iter().map(|(_, doc)| doc.clone()).collect())
    }

    pub fn document_ids(&self, index: &str) -> Option<Vec<String>> {
        self.lock()
            .indices
            .get(index)
            .map(|i| i.documents.iter().map(|(id, _)| id.clone()).collect())
    }

    pub fn mappings(&self, index: &str) -> Option<serde_json::Value> {
        self.lock().indices.get(index).map(|i| i.mappings.clone())
    }

    pub fn settings(&self, index: &str) -> Option<serde_json::Value> {
        self.lock().indices.get(index).map(|i| i.settings.clone())
    }

    /// All index names, reserved ones included.
    pub fn all_index_names(&self) -> Vec<String> {
        self.lock().indices.keys().cloned().collect()
    }

    pub fn cluster_setting(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().settings.get(key).cloned()
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Total number of `poll_task` calls served.
    pub fn poll_count(&self) -> u64 {
        self.lock().polls
    }

    pub fn clear_failures(&self) {
        self.lock().failures = Failures::default();
    }

    pub fn fail_create(&self, index: &str, reason: &str) {
        self.lock()
            .failures
            .create
            .insert(index.to_string(), reason.to_string());
    }

    pub fn fail_delete(&self, index: &str, reason: &str) {
        self.lock()
            .failures
            .delete
            .insert(index.to_string(), reason.to_string());
    }

    /// The copy request into `destination` is accepted but reports failures.
    pub fn fail_copy_start(&self, destination: &str, failures: Vec<String>) {
        self.lock()
            .failures
            .copy_start
            .insert(destination.to_string(), failures);
    }

    /// The copy task into `destination` reports a task-level error on its first poll.
    pub fn fail_task(&self, destination: &str, reason: &str) {
        self.lock()
            .failures
            .task
            .insert(destination.to_string(), reason.to_string());
    }

    /// The copy task into `destination` completes with per-document failures.
    pub fn fail_documents(&self, destination: &str, failures: Vec<String>) {
        self.lock()
            .failures
            .documents
            .insert(destination.to_string(), failures);
    }
}

#[async_trait]
impl ClusterAccessor for InMemoryCluster {
    async fn list_index_names(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .indices
            .keys()
            .filter(|name| !is_reserved_index(name))
            .cloned()
            .collect())
    }

    async fn index_metadata(&self, names: &[String]) -> Result<BTreeMap<String, IndexMetadata>> {
        let state = self.lock();
        names
            .iter()
            .map(|name| {
                let stored = state
                    .indices
                    .get(name)
                    .ok_or_else(|| IndexctlError::Cluster(format!("no such index [{}]", name)))?;
                Ok((
                    name.clone(),
                    IndexMetadata {
                        creation_date: stored.creation_date,
                        settings: stored.settings.clone(),
                    },
                ))
            })
            .collect()
    }

    async fn create_index(
        &self,
        name: &str,
        mappings: &serde_json::Value,
        settings: &serde_json::Value,
    ) -> Result<String> {
        self.respond_after_latency().await;
        let mut state = self.lock();
        state.calls.push(ClusterCall::CreateIndex(name.to_string()));
        if let Some(reason) = state.failures.create.get(name) {
            return Err(IndexctlError::Cluster(reason.clone()));
        }
        if state.indices.contains_key(name) {
            return Err(IndexctlError::Cluster(format!(
                "index [{}] already exists",
                name
            )));
        }
        state.clock += 1000;
        let creation_date = state.clock;
        state.indices.insert(
            name.to_string(),
            StoredIndex {
                creation_date,
                mappings: mappings.clone(),
                settings: settings.clone(),
                documents: Vec::new(),
            },
        );
        Ok(name.to_string())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        self.respond_after_latency().await;
        let mut state = self.lock();
        state.calls.push(ClusterCall::DeleteIndex(name.to_string()));
        if let Some(reason) = state.failures.delete.get(name) {
            return Err(IndexctlError::Cluster(reason.clone()));
        }
        state
            .indices
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| IndexctlError::Cluster(format!("no such index [{}]", name)))
    }

    async fn start_bulk_copy(&self, source: &str, destination: &str) -> Result<BulkCopyStarted> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::StartBulkCopy {
            source: source.to_string(),
            destination: destination.to_string(),
        });
        if !state.indices.contains_key(destination) {
            return Err(IndexctlError::Cluster(format!(
                "no such index [{}]",
                destination
            )));
        }
        let snapshot = state
            .indices
            .get(source)
            .map(|i| i.documents.clone())
            .ok_or_else(|| IndexctlError::Cluster(format!("no such index [{}]", source)))?;

        state.next_task += 1;
        let task_id = format!("memory:{}", state.next_task);
        let failures = state
            .failures
            .copy_start
            .get(destination)
            .cloned()
            .unwrap_or_default();
        state.tasks.insert(
            task_id.clone(),
            CopyTask {
                destination: destination.to_string(),
                snapshot,
                polls_remaining: self.polls_to_complete,
                finished: false,
            },
        );
        Ok(BulkCopyStarted { task_id, failures })
    }

    async fn poll_task(&self, task_id: &str) -> Result<TaskStatus> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.polls += 1;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| IndexctlError::Cluster(format!("task [{}] not found", task_id)))?;

        let total = task.snapshot.len() as u64;
        let description = format!("reindex into [{}]", task.destination);

        if let Some(reason) = state.failures.task.get(&task.destination) {
            if !task.finished {
                task.finished = true;
                state.calls.push(ClusterCall::TaskFailed {
                    destination: task.destination.clone(),
                });
            }
            return Ok(TaskStatus {
                completed: false,
                error: Some(reason.clone()),
                progress: TaskProgress { done: 0, total },
                description,
                node: "memory".to_string(),
                failures: Vec::new(),
            });
        }

        task.polls_remaining = task.polls_remaining.saturating_sub(1);
        let completed = task.polls_remaining == 0;
        let failures = if completed {
            state
                .failures
                .documents
                .get(&task.destination)
                .cloned()
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        if completed && !task.finished {
            task.finished = true;
            if let Some(dest) = state.indices.get_mut(&task.destination) {
                let present: HashSet<String> =
                    dest.documents.iter().map(|(id, _)| id.clone()).collect();
                dest.documents.extend(
                    task.snapshot
                        .iter()
                        .filter(|(id, _)| !present.contains(id))
                        .cloned(),
                );
            }
            state.calls.push(ClusterCall::TaskCompleted {
                destination: task.destination.clone(),
            });
        }

        let done = if completed { total } else { total / 2 };
        Ok(TaskStatus {
            completed,
            error: None,
            progress: TaskProgress { done, total },
            description,
            node: "memory".to_string(),
            failures,
        })
    }

    async fn put_cluster_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::PutClusterSetting(key.to_string()));
        state.settings.insert(key.to_string(), value);
        Ok(())
    }
}
