//! Client configuration

use crate::{ClientError, Result};
use std::time::Duration;

/// Public authorization endpoint of the service
pub const DEFAULT_AUTH_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";

/// Client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// URL of the authentication exchange
    pub auth_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Bucket used when an operation is not given one explicitly
    pub default_bucket_id: Option<String>,
    /// Authenticate on first use instead of failing with `NotAuthenticated`
    pub auto_authorize: bool,
    /// Delay before the single retry of a throttled upload
    pub upload_retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            timeout: Duration::from_secs(100),
            user_agent: format!("nimbus-client/{}", env!("CARGO_PKG_VERSION")),
            default_bucket_id: None,
            auto_authorize: true,
            upload_retry_delay: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Create a new config with the given authorization URL
    pub fn new(auth_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            ..Default::default()
        }
    }

    /// Use this bucket for every call that does not name one
    pub fn with_default_bucket(mut self, bucket_id: impl Into<String>) -> Self {
        self.default_bucket_id = Some(bucket_id.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Require an explicit `authorize()` before any other call
    pub fn without_auto_authorize(mut self) -> Self {
        self.auto_authorize = false;
        self
    }

    /// Set the delay applied before retrying a throttled upload
    pub fn with_upload_retry_delay(mut self, delay: Duration) -> Self {
        self.upload_retry_delay = delay;
        self
    }

    /// Resolve the bucket an operation targets
    pub fn resolve_bucket_id(&self, explicit: Option<&str>) -> Result<String> {
        resolve_bucket_id(explicit, self.default_bucket_id.as_deref())
    }
}

/// Pick the explicit bucket id, falling back to the configured default.
pub fn resolve_bucket_id(explicit: Option<&str>, default: Option<&str>) -> Result<String> {
    explicit
        .filter(|id| !id.is_empty())
        .or(default.filter(|id| !id.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| {
            ClientError::Config(
                "no bucket id: pass one explicitly or configure a default bucket".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_bucket_wins() {
        assert_eq!(
            resolve_bucket_id(Some("explicit"), Some("default")).unwrap(),
            "explicit"
        );
    }

    #[test]
    fn test_falls_back_to_default_bucket() {
        assert_eq!(resolve_bucket_id(None, Some("default")).unwrap(), "default");
        assert_eq!(resolve_bucket_id(Some(""), Some("default")).unwrap(), "default");
    }

    #[test]
    fn test_missing_bucket_is_config_error() {
        let err = resolve_bucket_id(None, None).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_builder() {
        let config = Config::new("http://localhost:8080/auth")
            .with_default_bucket("bucket-1")
            .with_timeout(Duration::from_secs(5))
            .without_auto_authorize();

        assert_eq!(config.auth_url, "http://localhost:8080/auth");
        assert_eq!(config.resolve_bucket_id(None).unwrap(), "bucket-1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.auto_authorize);
        assert_eq!(config.upload_retry_delay, Duration::from_secs(1));
    }
}
