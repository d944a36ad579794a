//! Scale an ECS service to zero through the ECS JSON API and wait for it to
//! settle, the same way the `services-stable` waiter does.

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;

use indexctl::{IndexctlError, ServiceScaler};

use crate::config::EcsConfig;
use crate::sigv4::Signer;
use crate::types::{DescribeServicesRequest, DescribeServicesResponse, UpdateServiceRequest};
use crate::{error_message, ClusterError};

const TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const SIGNING_SERVICE: &str = "ecs";

pub struct EcsScaler {
    config: EcsConfig,
    endpoint: Url,
    http: reqwest::Client,
}

impl EcsScaler {
    /// Credentials may only be omitted when a custom endpoint is configured,
    /// e.g. a local emulator that does not check signatures.
    pub fn new(config: EcsConfig) -> Result<Self, ClusterError> {
        if config.credentials.is_none() && config.endpoint.is_none() {
            return Err(ClusterError::Config(
                "AWS credentials (environment keys or a container task role) are required to scale ECS services".to_string(),
            ));
        }
        let raw = config.endpoint();
        let endpoint = Url::parse(&raw).map_err(|e| ClusterError::Url(format!("{raw}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ClusterError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            endpoint,
            http,
        })
    }

    async fn call<B, T>(&self, action: &str, body: &B) -> Result<T, ClusterError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ClusterError::Malformed(format!("{action} request: {e}")))?;

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("x-amz-target", format!("{}.{}", TARGET_PREFIX, action))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE);
        if let Some(credentials) = &self.config.credentials {
            let signer = Signer {
                credentials,
                region: &self.config.region,
                service: SIGNING_SERVICE,
            };
            for (name, value) in signer.sign("POST", &self.endpoint, &payload, chrono::Utc::now())
            {
                request = request.header(name, value);
            }
        }

        let response = request.body(payload).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClusterError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| ClusterError::Malformed(format!("{action} response: {e}")))
    }

    async fn update_desired_count(&self, service: &str, count: u32) -> Result<(), ClusterError> {
        let _: serde_json::Value = self
            .call(
                "UpdateService",
                &UpdateServiceRequest {
                    cluster: self.config.cluster.as_deref(),
                    service,
                    desired_count: count,
                },
            )
            .await?;
        Ok(())
    }

    async fn describe(&self, service: &str) -> Result<DescribeServicesResponse, ClusterError> {
        self.call(
            "DescribeServices",
            &DescribeServicesRequest {
                cluster: self.config.cluster.as_deref(),
                services: vec![service],
            },
        )
        .await
    }

    async fn wait_until_stable(&self, service: &str) -> Result<(), String> {
        for attempt in 1..=self.config.max_attempts {
            let response = self.describe(service).await.map_err(|e| e.to_string())?;

            if let Some(failure) = response.failures.iter().find(|f| f.reason == "MISSING") {
                return Err(format!(
                    "service is missing ({})",
                    failure.arn.as_deref().unwrap_or(service)
                ));
            }
            let Some(current) = response.services.first() else {
                return Err("service not returned by DescribeServices".to_string());
            };
            if current.status == "DRAINING" || current.status == "INACTIVE" {
                return Err(format!("service is {}", current.status));
            }
            if current.is_stable() {
                return Ok(());
            }

            tracing::debug!(
                service = %service,
                attempt,
                running = current.running_count,
                desired = current.desired_count,
                deployments = current.deployments.len(),
                "Waiting for service to stabilize"
            );
            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
        Err(format!(
            "service did not stabilize after {} attempts",
            self.config.max_attempts
        ))
    }
}

#[async_trait]
impl ServiceScaler for EcsScaler {
    async fn scale_down(&self, service: &str) -> indexctl::Result<()> {
        let scale_error = |reason: String| IndexctlError::Scale {
            service: service.to_string(),
            reason,
        };
        self.update_desired_count(service, 0)
            .await
            .map_err(|e| scale_error(e.to_string()))?;
        self.wait_until_stable(service).await.map_err(scale_error)
    }
}
