//! In-process transport double for unit tests

use crate::{ApiRequest, ApiResponse, ClientError, Result, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;

/// Success body of the authentication exchange
pub(crate) fn auth_body(api_url: &str) -> Value {
    json!({
        "accountId": "account-1",
        "apiUrl": api_url,
        "authorizationToken": "auth-token",
        "downloadUrl": format!("{api_url}/download"),
        "recommendedPartSize": 100_000_000u64,
        "absoluteMinimumPartSize": 5_000_000u64,
        "allowed": {
            "capabilities": ["listBuckets", "listFiles", "readFiles", "writeFiles", "deleteFiles"],
            "bucketId": null,
            "bucketName": null,
            "namePrefix": null
        }
    })
}

/// Replays queued responses and records every request it is given
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<ApiResponse>>,
    requests: Mutex<Vec<ApiRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn push_json(&self, status: u16, body: Value) {
        self.push_raw(status, body.to_string());
    }

    pub(crate) fn push_raw(&self, status: u16, body: impl Into<bytes::Bytes>) {
        let status = StatusCode::from_u16(status).expect("valid status");
        self.responses.lock().push_back(ApiResponse::new(status, body));
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| ClientError::Transport("no scripted response left".to_string()))
    }
}
