pub mod client;
pub mod config;
pub mod credentials;
pub mod ecs;
pub mod sigv4;
pub mod types;

use thiserror::Error;

pub use client::ElasticClient;
pub use config::{normalize_endpoint, AwsCredentials, ClusterConfig, EcsConfig};
pub use credentials::{resolve_credentials, ContainerCredentialsSource};
pub use ecs::EcsScaler;

#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ClusterError {
    fn from(e: reqwest::Error) -> Self {
        ClusterError::Http(e.to_string())
    }
}

impl From<ClusterError> for indexctl::IndexctlError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::Config(msg) => indexctl::IndexctlError::Config(msg),
            other => indexctl::IndexctlError::Cluster(other.to_string()),
        }
    }
}

// Tests that mutate global env vars must not run in parallel.
#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Pull a readable reason out of an error body returned by the cluster or AWS.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    if let Some(error) = value.get("error") {
        let kind = error.get("type").and_then(|t| t.as_str());
        let reason = error.get("reason").and_then(|r| r.as_str());
        return match (kind, reason) {
            (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
            (None, Some(reason)) => reason.to_string(),
            _ => error.to_string(),
        };
    }
    if let Some(message) = value
        .get("message")
        .or_else(|| value.get("Message"))
        .and_then(|m| m.as_str())
    {
        return message.to_string();
    }
    value.to_string()
}
