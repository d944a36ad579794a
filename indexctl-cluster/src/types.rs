use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `GET /_stats`, only the index names are used
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub indices: BTreeMap<String, serde_json::Value>,
}

/// One entry of `GET /{indices}/_settings`
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettingsEntry {
    pub settings: IndexSettingsBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettingsBody {
    pub index: serde_json::Value,
}

/// Request body of `PUT /{index}`
#[derive(Debug, Clone, Serialize)]
pub struct CreateIndexRequest<'a> {
    pub mappings: &'a serde_json::Value,
    pub settings: &'a serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIndexResponse {
    #[serde(default)]
    pub index: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexRequest<'a> {
    pub source: ReindexSource<'a>,
    pub dest: ReindexDest<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexSource<'a> {
    pub index: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexDest<'a> {
    pub index: &'a str,
    pub version_type: &'static str,
}

/// Response of `POST /_reindex?wait_for_completion=false`
#[derive(Debug, Clone, Deserialize)]
pub struct ReindexResponse {
    pub task: Option<String>,
    #[serde(default)]
    pub failures: Vec<serde_json::Value>,
}

/// `GET /_tasks/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct TaskResponse {
    #[serde(default)]
    pub completed: bool,
    pub task: TaskInfo,
    #[serde(default)]
    pub error: Option<TaskError>,
    #[serde(default)]
    pub response: Option<TaskResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskCounters,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskCounters {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TaskError {
    pub fn message(&self) -> String {
        match (&self.kind, &self.reason) {
            (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
            (None, Some(reason)) => reason.clone(),
            (Some(kind), None) => kind.clone(),
            (None, None) => "task failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub failures: Vec<serde_json::Value>,
}

/// Body of `PUT /_cluster/settings`
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSettingsRequest {
    pub persistent: serde_json::Map<String, serde_json::Value>,
}

// ECS JSON 1.1 API

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<&'a str>,
    pub service: &'a str,
    pub desired_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeServicesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<&'a str>,
    pub services: Vec<&'a str>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescribeServicesResponse {
    #[serde(default)]
    pub services: Vec<EcsService>,
    #[serde(default)]
    pub failures: Vec<EcsFailure>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsService {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub desired_count: u32,
    #[serde(default)]
    pub running_count: u32,
    #[serde(default)]
    pub deployments: Vec<serde_json::Value>,
}

impl EcsService {
    /// Same condition as the `services-stable` waiter: one deployment and
    /// the running count has reached the desired count.
    pub fn is_stable(&self) -> bool {
        self.deployments.len() == 1 && self.running_count == self.desired_count
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EcsFailure {
    #[serde(default)]
    pub arn: Option<String>,
    #[serde(default)]
    pub reason: String,
}
