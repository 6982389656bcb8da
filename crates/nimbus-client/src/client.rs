//! Main client implementation

use crate::{
    api, classify, ApiRequest, ApiResponse, Buckets, Capabilities, Config, Credentials, Files,
    HttpTransport, LargeFiles, Result, Session, SessionState, Transport,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// State shared by the client and every operation view
pub(crate) struct ClientCore {
    pub(crate) config: Config,
    pub(crate) session: Session,
    pub(crate) transport: Arc<dyn Transport>,
}

impl ClientCore {
    /// Session state for the next request, authenticating first if configured to
    pub(crate) async fn authorized(&self) -> Result<Arc<SessionState>> {
        if self.config.auto_authorize {
            Ok(self.session.ensure_authenticated().await?)
        } else {
            self.session.require()
        }
    }

    /// POST a JSON payload and decode the JSON answer
    pub(crate) async fn post<P, T>(
        &self,
        state: &SessionState,
        endpoint: &str,
        payload: &P,
        operation: &str,
    ) -> Result<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let request = api::json_request(state, endpoint, payload)?;
        let response = self.transport.send(request).await?;
        classify::parse_response(response, Some(operation))
    }

    /// Send a raw request and classify a failure
    pub(crate) async fn send(&self, request: ApiRequest, operation: &str) -> Result<ApiResponse> {
        let response = self.transport.send(request).await?;
        classify::check(response, Some(operation))
    }

    /// Send an upload, retrying exactly once after a fixed delay when the
    /// service is throttling or unavailable. A failed retry is returned as is.
    pub(crate) async fn send_upload(
        &self,
        request: ApiRequest,
        operation: &str,
    ) -> Result<ApiResponse> {
        let response = self.transport.send(request.clone()).await?;
        if !classify::is_retryable_status(response.status) {
            return classify::check(response, Some(operation));
        }

        warn!(
            status = %response.status,
            delay = ?self.config.upload_retry_delay,
            "Upload rejected with a transient status, retrying once"
        );
        tokio::time::sleep(self.config.upload_retry_delay).await;

        let response = self.transport.send(request).await?;
        classify::check(response, Some(operation))
    }
}

/// Object storage client
#[derive(Clone)]
pub struct NimbusClient {
    core: Arc<ClientCore>,
}

impl NimbusClient {
    /// Create a client that talks HTTP through reqwest
    pub fn new(credentials: Credentials, config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(credentials, config, transport))
    }

    /// Create with default configuration
    pub fn from_keys(key_id: impl Into<String>, application_key: impl Into<String>) -> Result<Self> {
        Self::new(Credentials::new(key_id, application_key), Config::default())
    }

    /// Create a client on top of a caller-supplied transport
    pub fn with_transport(
        credentials: Credentials,
        config: Config,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let session = Session::new(credentials, config.auth_url.clone(), Arc::clone(&transport));
        debug!(auth_url = %config.auth_url, "Created client");
        Self {
            core: Arc::new(ClientCore {
                config,
                session,
                transport,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Get the session
    pub fn session(&self) -> &Session {
        &self.core.session
    }

    /// Authenticate; a no-op once authenticated
    #[instrument(skip(self))]
    pub async fn authorize(&self) -> Result<Arc<SessionState>> {
        Ok(self.core.session.ensure_authenticated().await?)
    }

    /// Capabilities of the key; fails with `NotAuthenticated` before `authorize`
    pub fn capabilities(&self) -> Result<Capabilities> {
        self.core.session.capabilities()
    }

    /// Bucket operations
    pub fn buckets(&self) -> Buckets {
        Buckets::new(Arc::clone(&self.core))
    }

    /// Single-shot file operations
    pub fn files(&self) -> Files {
        Files::new(Arc::clone(&self.core))
    }

    /// Large-file operations
    pub fn large_files(&self) -> LargeFiles {
        LargeFiles::new(Arc::clone(&self.core))
    }
}

impl std::fmt::Debug for NimbusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NimbusClient")
            .field("config", &self.core.config)
            .field("session", &self.core.session)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::{auth_body, ScriptedTransport};
    use crate::ClientError;
    use bytes::Bytes;
    use reqwest::Method;
    use serde_json::json;
    use std::time::Duration;

    pub(crate) fn client(transport: &Arc<ScriptedTransport>, config: Config) -> NimbusClient {
        NimbusClient::with_transport(
            Credentials::new("key-id", "secret"),
            config.with_upload_retry_delay(Duration::from_millis(10)),
            Arc::clone(transport) as Arc<dyn Transport>,
        )
    }

    fn upload_request() -> ApiRequest {
        ApiRequest::new(Method::POST, "http://pod.test/upload").body(Bytes::from_static(b"data"))
    }

    #[tokio::test]
    async fn test_without_auto_authorize_requires_explicit_authorize() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(&transport, Config::default().without_auto_authorize());

        let err = client.buckets().list().await.unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_auto_authorize_authenticates_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, auth_body("http://api.test"));
        transport.push_json(200, json!({"buckets": []}));
        transport.push_json(200, json!({"buckets": []}));
        let client = client(&transport, Config::default());

        client.buckets().list().await.unwrap();
        client.buckets().list().await.unwrap();
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_upload_retried_once_on_service_unavailable() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(503, json!({"status": 503, "code": "service_unavailable", "message": "first"}));
        transport.push_json(200, json!({}));
        let client = client(&transport, Config::default());

        client.core.send_upload(upload_request(), "files").await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_retry_returns_second_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(503, json!({"status": 503, "code": "service_unavailable", "message": "first"}));
        transport.push_json(429, json!({"status": 429, "code": "too_many_requests", "message": "second"}));
        transport.push_json(200, json!({}));
        let client = client(&transport, Config::default());

        let err = client.core.send_upload(upload_request(), "files").await.unwrap_err();
        match err {
            ClientError::Service(e) => {
                assert_eq!(e.status, 429);
                assert_eq!(e.message, "second");
                assert!(e.retryable);
            }
            other => panic!("expected ServiceError, got {other:?}"),
        }
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_upload_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(400, json!({"status": 400, "code": "bad_request", "message": "sha1 mismatch"}));
        let client = client(&transport, Config::default());

        let err = client.core.send_upload(upload_request(), "files").await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(transport.calls(), 1);
    }
}
