//! Authentication and session state
//!
//! A [`Session`] starts unauthenticated and flips to authenticated exactly
//! once, after a successful exchange of the credential pair for an API
//! endpoint, a download endpoint, a bearer token and the key's capabilities.
//! Concurrent callers share a single in-flight exchange.

use crate::error::INVALID_KEY_GUIDANCE;
use crate::{api, AuthError, ClientError, Result, Transport};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Key id and application key
#[derive(Clone)]
pub struct Credentials {
    key_id: String,
    application_key: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(key_id: impl Into<String>, application_key: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            application_key: application_key.into(),
        }
    }

    /// Key id
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn is_complete(&self) -> bool {
        !self.key_id.is_empty() && !self.application_key.is_empty()
    }

    /// `Basic` header value for the authentication exchange
    pub(crate) fn basic_authorization(&self) -> String {
        let pair = format!("{}:{}", self.key_id, self.application_key);
        format!("Basic {}", BASE64.encode(pair))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("application_key", &"<redacted>")
            .finish()
    }
}

/// Permissions granted to a key
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Capability names, e.g. `listBuckets`, `writeFiles`
    pub names: Vec<String>,
    /// Bucket the key is restricted to
    pub bucket_id: Option<String>,
    /// Name of that bucket
    pub bucket_name: Option<String>,
    /// File name prefix the key is restricted to
    pub name_prefix: Option<String>,
}

impl Capabilities {
    /// Check for a named capability
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Check if the key is scoped to a single bucket
    pub fn is_bucket_restricted(&self) -> bool {
        self.bucket_id.is_some()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    account_id: String,
    api_url: String,
    authorization_token: String,
    download_url: String,
    #[serde(default)]
    s3_api_url: Option<String>,
    recommended_part_size: u64,
    #[serde(default)]
    absolute_minimum_part_size: u64,
    allowed: AllowedResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowedResponse {
    #[serde(default)]
    bucket_id: Option<String>,
    #[serde(default)]
    bucket_name: Option<String>,
    #[serde(default)]
    name_prefix: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

/// State derived from a successful authentication
#[derive(Clone)]
pub struct SessionState {
    /// Account the key belongs to
    pub account_id: String,
    /// Base URL for API calls
    pub api_url: String,
    /// Base URL for downloads
    pub download_url: String,
    /// Base URL of the S3-compatible API, if offered
    pub s3_api_url: Option<String>,
    /// Part size the service recommends for large files
    pub recommended_part_size: u64,
    /// Smallest part size the service accepts
    pub absolute_minimum_part_size: u64,
    /// Permissions of the key
    pub capabilities: Capabilities,
    authorization_token: String,
}

impl SessionState {
    fn from_response(response: AuthResponse) -> std::result::Result<Self, AuthError> {
        if response.authorization_token.is_empty() {
            return Err(AuthError::InvalidResponse("empty authorization token".to_string()));
        }
        if response.api_url.is_empty() || response.download_url.is_empty() {
            return Err(AuthError::InvalidResponse("missing API or download URL".to_string()));
        }
        if response.recommended_part_size == 0 {
            return Err(AuthError::InvalidResponse(
                "recommended part size must be positive".to_string(),
            ));
        }

        Ok(Self {
            account_id: response.account_id,
            api_url: response.api_url.trim_end_matches('/').to_string(),
            download_url: response.download_url.trim_end_matches('/').to_string(),
            s3_api_url: response.s3_api_url,
            recommended_part_size: response.recommended_part_size,
            absolute_minimum_part_size: response.absolute_minimum_part_size,
            capabilities: Capabilities {
                names: response.allowed.capabilities,
                bucket_id: response.allowed.bucket_id,
                bucket_name: response.allowed.bucket_name,
                name_prefix: response.allowed.name_prefix,
            },
            authorization_token: response.authorization_token,
        })
    }

    /// Bearer token for API calls
    pub fn authorization_token(&self) -> &str {
        &self.authorization_token
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("account_id", &self.account_id)
            .field("api_url", &self.api_url)
            .field("download_url", &self.download_url)
            .field("recommended_part_size", &self.recommended_part_size)
            .field("absolute_minimum_part_size", &self.absolute_minimum_part_size)
            .field("capabilities", &self.capabilities)
            .field("authorization_token", &"<redacted>")
            .finish()
    }
}

type AuthOutcome = std::result::Result<Arc<SessionState>, AuthError>;
type AuthFlight = Shared<BoxFuture<'static, AuthOutcome>>;

enum Phase {
    Unauthenticated,
    Authenticating(AuthFlight),
    Authenticated(Arc<SessionState>),
}

/// Authenticated runtime state shared by every operation of a client
pub struct Session {
    credentials: Credentials,
    auth_url: String,
    transport: Arc<dyn Transport>,
    phase: Mutex<Phase>,
}

impl Session {
    /// Create an unauthenticated session
    pub fn new(
        credentials: Credentials,
        auth_url: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            credentials,
            auth_url: auth_url.into(),
            transport,
            phase: Mutex::new(Phase::Unauthenticated),
        }
    }

    /// Credentials this session authenticates with
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Authenticate unless already authenticated.
    ///
    /// Callers arriving while an exchange is in flight wait for it and receive
    /// its outcome; no second request is sent. After a failure the session is
    /// unauthenticated again and the next call starts a fresh exchange.
    #[instrument(skip(self), fields(key_id = %self.credentials.key_id))]
    pub async fn ensure_authenticated(&self) -> std::result::Result<Arc<SessionState>, AuthError> {
        let flight = {
            let mut phase = self.phase.lock();
            match &*phase {
                Phase::Authenticated(state) => return Ok(Arc::clone(state)),
                Phase::Authenticating(flight) => {
                    debug!("Joining in-flight authorization");
                    flight.clone()
                }
                Phase::Unauthenticated => {
                    if !self.credentials.is_complete() {
                        return Err(AuthError::MissingCredentials);
                    }
                    let flight = authorize(
                        Arc::clone(&self.transport),
                        self.auth_url.clone(),
                        self.credentials.basic_authorization(),
                    )
                    .boxed()
                    .shared();
                    *phase = Phase::Authenticating(flight.clone());
                    flight
                }
            }
        };

        let outcome = flight.clone().await;

        // the first waiter to finish publishes the outcome
        let mut phase = self.phase.lock();
        let ours = matches!(&*phase, Phase::Authenticating(current) if current.ptr_eq(&flight));
        if ours {
            *phase = match &outcome {
                Ok(state) => Phase::Authenticated(Arc::clone(state)),
                Err(_) => Phase::Unauthenticated,
            };
        }
        outcome
    }

    /// Check if the session is authenticated
    pub fn is_authenticated(&self) -> bool {
        matches!(&*self.phase.lock(), Phase::Authenticated(_))
    }

    /// Current state, if authenticated
    pub fn state(&self) -> Option<Arc<SessionState>> {
        match &*self.phase.lock() {
            Phase::Authenticated(state) => Some(Arc::clone(state)),
            _ => None,
        }
    }

    /// Current state, or `NotAuthenticated`
    pub fn require(&self) -> Result<Arc<SessionState>> {
        self.state().ok_or(ClientError::NotAuthenticated)
    }

    /// Capabilities of the key.
    ///
    /// Fails with `NotAuthenticated` before authentication rather than
    /// returning an empty set.
    pub fn capabilities(&self) -> Result<Capabilities> {
        Ok(self.require()?.capabilities.clone())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("credentials", &self.credentials)
            .field("auth_url", &self.auth_url)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

async fn authorize(
    transport: Arc<dyn Transport>,
    auth_url: String,
    basic_authorization: String,
) -> AuthOutcome {
    let request = api::authorize_request(&auth_url, &basic_authorization)
        .map_err(|e| AuthError::Transport(e.to_string()))?;
    let response = transport
        .send(request)
        .await
        .map_err(|e| AuthError::Transport(e.to_string()))?;

    if response.is_success() {
        let body: AuthResponse = serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        let state = SessionState::from_response(body)?;
        info!(account_id = %state.account_id, api_url = %state.api_url, "Authorized");
        Ok(Arc::new(state))
    } else if response.status == StatusCode::UNAUTHORIZED {
        warn!("Authorization rejected: invalid application key");
        Err(AuthError::InvalidApplicationKey {
            message: INVALID_KEY_GUIDANCE.to_string(),
        })
    } else {
        warn!(status = %response.status, "Authorization rejected");
        Err(AuthError::ServerRejected {
            status: response.status.as_u16(),
            detail: response.text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{auth_body, ScriptedTransport};
    use serde_json::json;
    use std::time::Duration;

    fn session(transport: &Arc<ScriptedTransport>, key_id: &str, key: &str) -> Session {
        Session::new(
            Credentials::new(key_id, key),
            "http://auth.test/authorize",
            Arc::clone(transport) as Arc<dyn Transport>,
        )
    }

    #[tokio::test]
    async fn test_missing_credentials_make_no_request() {
        let transport = Arc::new(ScriptedTransport::new());

        for (id, key) in [("", "secret"), ("key-id", ""), ("", "")] {
            let err = session(&transport, id, key).ensure_authenticated().await.unwrap_err();
            assert_eq!(err, AuthError::MissingCredentials);
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_authenticates_once_and_installs_state() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, auth_body("http://api.test"));
        let session = session(&transport, "key-id", "secret");

        assert!(!session.is_authenticated());
        let state = session.ensure_authenticated().await.unwrap();
        assert_eq!(state.api_url, "http://api.test");
        assert_eq!(state.authorization_token(), "auth-token");
        assert_eq!(state.recommended_part_size, 100_000_000);
        assert!(session.is_authenticated());

        let again = session.ensure_authenticated().await.unwrap();
        assert!(Arc::ptr_eq(&state, &again));
        assert_eq!(transport.calls(), 1);

        let sent = transport.requests();
        assert_eq!(
            sent[0].header_str("authorization"),
            Some(format!("Basic {}", BASE64.encode("key-id:secret")).as_str())
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_millis(50)));
        transport.push_json(200, auth_body("http://api.test"));
        let session = session(&transport, "key-id", "secret");

        let results =
            futures::future::join_all((0..16).map(|_| session.ensure_authenticated())).await;

        assert_eq!(transport.calls(), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_millis(50)));
        transport.push_json(500, json!({"status": 500, "code": "internal_error", "message": "boom"}));
        transport.push_json(200, auth_body("http://api.test"));
        let session = session(&transport, "key-id", "secret");

        let results =
            futures::future::join_all((0..8).map(|_| session.ensure_authenticated())).await;

        assert_eq!(transport.calls(), 1);
        let first = results[0].clone().unwrap_err();
        assert!(matches!(first, AuthError::ServerRejected { status: 500, .. }));
        for result in results {
            assert_eq!(result.unwrap_err(), first);
        }
        assert!(!session.is_authenticated());

        // a later call starts a fresh exchange
        session.ensure_authenticated().await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_gives_guidance() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(401, json!({"status": 401, "code": "unauthorized", "message": ""}));

        let err = session(&transport, "key-id", "wrong").ensure_authenticated().await.unwrap_err();
        match err {
            AuthError::InvalidApplicationKey { message } => {
                assert!(message.contains("Do not mix your account id"));
            }
            other => panic!("expected InvalidApplicationKey, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_rejections_carry_raw_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_raw(403, "transaction cap exceeded");

        let err = session(&transport, "key-id", "secret").ensure_authenticated().await.unwrap_err();
        assert_eq!(
            err,
            AuthError::ServerRejected {
                status: 403,
                detail: "transaction cap exceeded".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_inconsistent_success_body_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut body = auth_body("http://api.test");
        body["authorizationToken"] = json!("");
        transport.push_json(200, body);
        let session = session(&transport, "key-id", "secret");

        let err = session.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_capabilities_require_authentication() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, auth_body("http://api.test"));
        let session = session(&transport, "key-id", "secret");

        assert!(matches!(session.capabilities(), Err(ClientError::NotAuthenticated)));

        session.ensure_authenticated().await.unwrap();
        let first = session.capabilities().unwrap();
        let second = session.capabilities().unwrap();
        assert_eq!(first, second);
        assert!(first.contains("writeFiles"));
        assert!(!first.is_bucket_restricted());
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_credentials_debug_hides_key() {
        let debug = format!("{:?}", Credentials::new("key-id", "very-secret"));
        assert!(debug.contains("key-id"));
        assert!(!debug.contains("very-secret"));
    }
}
