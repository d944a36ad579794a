//! Contract between the reconciliation core and a search cluster.
//!
//! The core never talks HTTP itself. Everything it needs from the cluster goes
//! through [`ClusterAccessor`]; `indexctl-cluster` provides the REST
//! implementation and [`memory::InMemoryCluster`] backs the tests.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Indices whose names start with this prefix belong to the cluster itself.
pub const RESERVED_INDEX_PREFIX: char = '.';

/// Cluster setting that makes writes to unknown indices fail instead of
/// silently creating an index with a dynamic mapping.
pub const AUTO_CREATE_INDEX_SETTING: &str = "action.auto_create_index";

pub fn is_reserved_index(name: &str) -> bool {
    name.starts_with(RESERVED_INDEX_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Milliseconds since the epoch, as reported by the cluster.
    pub creation_date: i64,
    pub settings: serde_json::Value,
}

/// Handle returned when an asynchronous bulk copy was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkCopyStarted {
    pub task_id: String,
    /// Failures reported synchronously by the copy request, if any.
    #[serde(default)]
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub done: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub completed: bool,
    pub error: Option<String>,
    pub progress: TaskProgress,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub node: String,
    /// Per-document failures reported by a finished copy.
    #[serde(default)]
    pub failures: Vec<String>,
}

/// Read and mutate index state on a search cluster.
///
/// Implementations must hide reserved indices (see [`is_reserved_index`])
/// from `list_index_names`.
#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    async fn list_index_names(&self) -> Result<Vec<String>>;

    async fn index_metadata(&self, names: &[String]) -> Result<BTreeMap<String, IndexMetadata>>;

    async fn create_index(
        &self,
        name: &str,
        mappings: &serde_json::Value,
        settings: &serde_json::Value,
    ) -> Result<String>;

    async fn delete_index(&self, name: &str) -> Result<()>;

    async fn start_bulk_copy(&self, source: &str, destination: &str) -> Result<BulkCopyStarted>;

    async fn poll_task(&self, task_id: &str) -> Result<TaskStatus>;

    async fn put_cluster_setting(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// Disable automatic index creation on unknown writes. Run once before any
/// reconciliation so ingestion cannot recreate a deleted index behind our back.
pub async fn disable_automatic_index_creation(accessor: &dyn ClusterAccessor) -> Result<()> {
    accessor
        .put_cluster_setting(AUTO_CREATE_INDEX_SETTING, serde_json::json!("false"))
        .await?;
    tracing::debug!(setting = AUTO_CREATE_INDEX_SETTING, "Disabled automatic index creation");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_prefixed_indices_are_reserved() {
        assert!(is_reserved_index(".kibana"));
        assert!(is_reserved_index(".tasks"));
        assert!(!is_reserved_index("products"));
        assert!(!is_reserved_index("products.v2"));
    }

    #[test]
    fn task_status_deserializes_with_defaults() {
        let status: TaskStatus = serde_json::from_value(serde_json::json!({
            "completed": false,
            "error": null,
            "progress": {"done": 3, "total": 10}
        }))
        .unwrap();
        assert!(!status.completed);
        assert_eq!(status.progress, TaskProgress { done: 3, total: 10 });
        assert!(status.failures.is_empty());
        assert!(status.description.is_empty());
    }

    #[tokio::test]
    async fn disable_auto_create_writes_setting() {
        let cluster = memory::InMemoryCluster::new();
        disable_automatic_index_creation(&cluster).await.unwrap();
        assert_eq!(
            cluster.cluster_setting(AUTO_CREATE_INDEX_SETTING),
            Some(serde_json::json!("false"))
        );
    }
}
