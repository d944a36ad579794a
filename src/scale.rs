use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{IndexctlError, Result};

/// Stops an upstream ingestion service before indices are rebuilt so no
/// writes land in an index that is about to be replaced.
#[async_trait]
pub trait ServiceScaler: Send + Sync {
    /// Scale `service` to zero and return once it is stable.
    async fn scale_down(&self, service: &str) -> Result<()>;
}

/// Test double that records every request; optionally fails them.
#[derive(Default)]
pub struct RecordingScaler {
    requests: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl RecordingScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failure: Some(reason.to_string()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ServiceScaler for RecordingScaler {
    async fn scale_down(&self, service: &str) -> Result<()> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(service.to_string());
        }
        match &self.failure {
            Some(reason) => Err(IndexctlError::Scale {
                service: service.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}
