//! Backfill a freshly created index from its predecessor.
//!
//! A migration starts an asynchronous bulk copy on the cluster and polls the
//! resulting task until it completes or reports an error. Nothing is retried
//! here: a failed copy fails the migration, and re-running reconciliation is
//! the retry mechanism.

use std::time::Duration;

use crate::cluster::{ClusterAccessor, TaskStatus};
use crate::error::{IndexctlError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Started,
    Polling,
    Completed,
    Failed,
}

impl MigrationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationState::Completed | MigrationState::Failed)
    }
}

/// One in-flight copy, discarded once it reaches a terminal state.
#[derive(Debug)]
pub struct MigrationTask {
    pub source: String,
    pub destination: String,
    pub task_id: String,
    pub state: MigrationState,
    pub polls: u32,
}

impl MigrationTask {
    fn new(source: &str, destination: &str, task_id: String) -> Self {
        tracing::info!(
            source = %source,
            destination = %destination,
            task_id = %task_id,
            "Started reindex"
        );
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            task_id,
            state: MigrationState::Started,
            polls: 0,
        }
    }

    fn transition(&mut self, next: MigrationState) {
        if self.state != next {
            tracing::debug!(
                task_id = %self.task_id,
                from = ?self.state,
                to = ?next,
                "Migration state change"
            );
            self.state = next;
        }
    }

    fn fail(&mut self, reason: String) -> IndexctlError {
        self.transition(MigrationState::Failed);
        tracing::error!(
            source = %self.source,
            destination = %self.destination,
            task_id = %self.task_id,
            reason = %reason,
            "Reindex failed; destination may be missing documents"
        );
        IndexctlError::Migration {
            source_index: self.source.clone(),
            destination: self.destination.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No predecessor existed, so there was nothing to copy.
    Skipped { destination: String },
    Completed {
        source: String,
        destination: String,
        documents: u64,
        polls: u32,
    },
}

#[derive(Debug, Clone)]
pub struct MigrationDriver {
    poll_interval: Duration,
}

impl Default for MigrationDriver {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl MigrationDriver {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Copy every document of `source` into `destination`.
    ///
    /// Blocks until the copy task finishes; there is no timeout. Documents
    /// already in `destination` are not overwritten by older source versions.
    pub async fn migrate(
        &self,
        accessor: &dyn ClusterAccessor,
        source: Option<&str>,
        destination: &str,
    ) -> Result<MigrationOutcome> {
        let Some(source) = source else {
            tracing::debug!(destination = %destination, "No previous index, skipping reindex");
            return Ok(MigrationOutcome::Skipped {
                destination: destination.to_string(),
            });
        };

        let started = accessor
            .start_bulk_copy(source, destination)
            .await
            .map_err(|e| {
                tracing::error!(
                    source = %source,
                    destination = %destination,
                    error = %e,
                    "Could not start reindex"
                );
                IndexctlError::Migration {
                    source_index: source.to_string(),
                    destination: destination.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let mut task = MigrationTask::new(source, destination, started.task_id);
        if !started.failures.is_empty() {
            return Err(task.fail(format!("Failures: {}", started.failures.join(","))));
        }

        loop {
            task.transition(MigrationState::Polling);
            task.polls += 1;
            let status = match accessor.poll_task(&task.task_id).await {
                Ok(status) => status,
                Err(e) => return Err(task.fail(format!("Error fetching task: {}", e))),
            };

            if let Some(error) = &status.error {
                return Err(task.fail(error.clone()));
            }

            log_progress(&task, &status);

            if status.completed {
                if !status.failures.is_empty() {
                    return Err(task.fail(format!(
                        "{} document failures: {}",
                        status.failures.len(),
                        status.failures.join(",")
                    )));
                }
                task.transition(MigrationState::Completed);
                tracing::info!(
                    source = %task.source,
                    destination = %task.destination,
                    documents = status.progress.done,
                    "Reindex complete"
                );
                return Ok(MigrationOutcome::Completed {
                    source: task.source,
                    destination: task.destination,
                    documents: status.progress.done,
                    polls: task.polls,
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn log_progress(task: &MigrationTask, status: &TaskStatus) {
    tracing::info!(
        node = %status.node,
        task_id = %task.task_id,
        destination = %task.destination,
        done = status.progress.done,
        total = status.progress.total,
        "[{}] {}: {}/{} documents",
        status.node,
        status.description,
        status.progress.done,
        status.progress.total
    );
}
