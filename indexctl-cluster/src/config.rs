use std::fmt;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ECS_POLL_SECS: u64 = 15;
const DEFAULT_ECS_MAX_ATTEMPTS: u32 = 40;

#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl AwsCredentials {
    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
    /// Returns `None` unless both the key id and the secret are set.
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .ok()
            .filter(|v| !v.is_empty())?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .ok()
            .filter(|v| !v.is_empty())?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|v| !v.is_empty());
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Prepend `https://` to bare host names and drop trailing slashes.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub endpoint: String,
    /// Region used for request signing. Signing is off without credentials.
    pub region: Option<String>,
    pub credentials: Option<AwsCredentials>,
    pub timeout: Duration,
}

impl ClusterConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint),
            region: None,
            credentials: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_signing(mut self, region: &str, credentials: AwsCredentials) -> Self {
        self.region = Some(region.to_string());
        self.credentials = Some(credentials);
        self
    }

    pub fn signs_requests(&self) -> bool {
        self.region.is_some() && self.credentials.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct EcsConfig {
    pub region: String,
    /// ECS cluster the service runs in; the account default cluster when unset.
    pub cluster: Option<String>,
    /// Overrides `https://ecs.{region}.amazonaws.com`.
    pub endpoint: Option<String>,
    pub credentials: Option<AwsCredentials>,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl EcsConfig {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            cluster: None,
            endpoint: None,
            credentials: None,
            poll_interval: Duration::from_secs(DEFAULT_ECS_POLL_SECS),
            max_attempts: DEFAULT_ECS_MAX_ATTEMPTS,
        }
    }

    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => normalize_endpoint(endpoint),
            None => format!("https://ecs.{}.amazonaws.com", self.region),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ENV_MUTEX;

    #[test]
    fn test_normalize_endpoint_adds_scheme() {
        assert_eq!(
            normalize_endpoint("search-domain.eu-west-1.es.amazonaws.com"),
            "https://search-domain.eu-west-1.es.amazonaws.com"
        );
        assert_eq!(normalize_endpoint("http://localhost:9200/"), "http://localhost:9200");
        assert_eq!(normalize_endpoint("https://es:443"), "https://es:443");
    }

    #[test]
    fn test_cluster_config_signing() {
        let config = ClusterConfig::new("localhost:9200");
        assert!(!config.signs_requests());
        let config = config.with_signing(
            "eu-west-1",
            AwsCredentials {
                access_key_id: "AKID".into(),
                secret_access_key: "secret".into(),
                session_token: None,
            },
        );
        assert!(config.signs_requests());
    }

    #[test]
    fn test_ecs_default_endpoint() {
        let mut config = EcsConfig::new("eu-west-1");
        assert_eq!(config.endpoint(), "https://ecs.eu-west-1.amazonaws.com");
        config.endpoint = Some("http://127.0.0.1:4566".into());
        assert_eq!(config.endpoint(), "http://127.0.0.1:4566");
        assert_eq!(config.max_attempts, 40);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = AwsCredentials {
            access_key_id: "AKID".into(),
            secret_access_key: "very-secret".into(),
            session_token: Some("token".into()),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("AKID"));
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("\"token\""));
    }

    #[test]
    fn test_credentials_from_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("AWS_ACCESS_KEY_ID", "AKIDENV");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "secret");
        std::env::remove_var("AWS_SESSION_TOKEN");

        let creds = AwsCredentials::from_env();

        std::env::remove_var("AWS_ACCESS_KEY_ID");
        std::env::remove_var("AWS_SECRET_ACCESS_KEY");

        let creds = creds.unwrap();
        assert_eq!(creds.access_key_id, "AKIDENV");
        assert!(creds.session_token.is_none());
    }

    #[test]
    fn test_credentials_from_env_missing_secret() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("AWS_ACCESS_KEY_ID", "AKIDENV");
        std::env::remove_var("AWS_SECRET_ACCESS_KEY");

        let creds = AwsCredentials::from_env();

        std::env::remove_var("AWS_ACCESS_KEY_ID");
        assert!(creds.is_none());
    }
}
