//! AWS credential lookup: static environment keys first, then the ECS
//! container credentials endpoint a task role exposes.

use std::time::Duration;

use serde::Deserialize;

use crate::config::AwsCredentials;
use crate::{error_message, ClusterError};

const CONTAINER_CREDENTIALS_HOST: &str = "http://169.254.170.2";
const CONTAINER_CREDENTIALS_TIMEOUT_SECS: u64 = 5;

/// Response of the container credentials endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCredentialsResponse {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
}

/// Where to fetch container credentials from, if this process runs with a
/// task role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerCredentialsSource {
    pub url: String,
    pub authorization: Option<String>,
}

impl ContainerCredentialsSource {
    /// `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` wins over
    /// `AWS_CONTAINER_CREDENTIALS_FULL_URI`; the latter may carry an
    /// `AWS_CONTAINER_AUTHORIZATION_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        if let Some(relative) = var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI") {
            return Some(Self {
                url: format!("{}{}", CONTAINER_CREDENTIALS_HOST, relative),
                authorization: None,
            });
        }
        var("AWS_CONTAINER_CREDENTIALS_FULL_URI").map(|url| Self {
            url,
            authorization: var("AWS_CONTAINER_AUTHORIZATION_TOKEN"),
        })
    }

    pub async fn fetch(&self) -> Result<AwsCredentials, ClusterError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CONTAINER_CREDENTIALS_TIMEOUT_SECS))
            .build()
            .map_err(|e| ClusterError::Config(format!("failed to build HTTP client: {e}")))?;

        let mut request = http.get(&self.url);
        if let Some(token) = &self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClusterError::Status {
                status: status.as_u16(),
                message: format!("container credentials: {}", error_message(&text)),
            });
        }

        let parsed: ContainerCredentialsResponse = serde_json::from_str(&text)
            .map_err(|e| ClusterError::Malformed(format!("container credentials: {e}")))?;
        Ok(AwsCredentials {
            access_key_id: parsed.access_key_id,
            secret_access_key: parsed.secret_access_key,
            session_token: parsed.token.filter(|t| !t.is_empty()),
        })
    }
}

/// Resolve credentials the way the AWS SDKs' default chain does for the
/// sources this tool runs under. `Ok(None)` means no source is configured.
///
/// Container credentials are fetched once; they stay valid for hours, far
/// longer than a single run.
pub async fn resolve_credentials() -> Result<Option<AwsCredentials>, ClusterError> {
    if let Some(credentials) = AwsCredentials::from_env() {
        return Ok(Some(credentials));
    }
    match ContainerCredentialsSource::from_env() {
        Some(source) => {
            let credentials = source.fetch().await?;
            tracing::debug!(
                access_key_id = %credentials.access_key_id,
                "Using container credentials"
            );
            Ok(Some(credentials))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::ENV_MUTEX;

    const CONTAINER_VARS: [&str; 6] = [
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_SESSION_TOKEN",
        "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI",
        "AWS_CONTAINER_CREDENTIALS_FULL_URI",
        "AWS_CONTAINER_AUTHORIZATION_TOKEN",
    ];

    fn clear_env() {
        for var in CONTAINER_VARS {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn test_fetch_parses_task_role_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/credentials/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "RoleArn": "arn:aws:iam::1:role/indexctl",
                "AccessKeyId": "ASIATASK",
                "SecretAccessKey": "task-secret",
                "Token": "task-token",
                "Expiration": "2030-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = ContainerCredentialsSource {
            url: format!("{}/v2/credentials/abc", server.uri()),
            authorization: None,
        };
        let credentials = source.fetch().await.unwrap();
        assert_eq!(credentials.access_key_id, "ASIATASK");
        assert_eq!(credentials.secret_access_key, "task-secret");
        assert_eq!(credentials.session_token.as_deref(), Some("task-token"));
    }

    #[tokio::test]
    async fn test_fetch_sends_authorization_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "pod-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AccessKeyId": "ASIAPOD",
                "SecretAccessKey": "pod-secret"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = ContainerCredentialsSource {
            url: format!("{}/creds", server.uri()),
            authorization: Some("pod-token".into()),
        };
        let credentials = source.fetch().await.unwrap();
        assert_eq!(credentials.access_key_id, "ASIAPOD");
        assert!(credentials.session_token.is_none());
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let source = ContainerCredentialsSource {
            url: format!("{}/creds", server.uri()),
            authorization: None,
        };
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, ClusterError::Status { status: 404, .. }));
    }

    #[test]
    fn test_relative_uri_points_at_task_metadata_host() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI", "/v2/credentials/abc");
        std::env::set_var("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://localhost/creds");

        let source = ContainerCredentialsSource::from_env();
        clear_env();

        assert_eq!(
            source,
            Some(ContainerCredentialsSource {
                url: "http://169.254.170.2/v2/credentials/abc".to_string(),
                authorization: None,
            })
        );
    }

    #[test]
    fn test_full_uri_carries_token() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://localhost/creds");
        std::env::set_var("AWS_CONTAINER_AUTHORIZATION_TOKEN", "pod-token");

        let source = ContainerCredentialsSource::from_env();
        clear_env();

        let source = source.unwrap();
        assert_eq!(source.url, "http://localhost/creds");
        assert_eq!(source.authorization.as_deref(), Some("pod-token"));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_container_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/creds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AccessKeyId": "ASIATASK",
                "SecretAccessKey": "task-secret",
                "Token": "task-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var(
            "AWS_CONTAINER_CREDENTIALS_FULL_URI",
            format!("{}/creds", server.uri()),
        );
        let resolved = resolve_credentials().await;
        clear_env();

        let credentials = resolved.unwrap().unwrap();
        assert_eq!(credentials.access_key_id, "ASIATASK");
        assert_eq!(credentials.session_token.as_deref(), Some("task-token"));
    }

    #[tokio::test]
    async fn test_resolve_prefers_static_keys() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var("AWS_ACCESS_KEY_ID", "AKIDENV");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "secret");
        // Never contacted: static keys short-circuit the chain.
        std::env::set_var("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1:1/creds");
        let resolved = resolve_credentials().await;
        clear_env();

        assert_eq!(resolved.unwrap().unwrap().access_key_id, "AKIDENV");
    }

    #[tokio::test]
    async fn test_resolve_without_any_source_is_none() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let resolved = resolve_credentials().await;

        assert!(resolved.unwrap().is_none());
    }
}
