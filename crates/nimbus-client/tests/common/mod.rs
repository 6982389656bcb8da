//! Shared fixtures for the mock-server tests

#![allow(dead_code)]

use nimbus_client::{sha1_hex, Config, Credentials, NimbusClient};
use serde_json::{json, Value};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const AUTH_PATH: &str = "/b2api/v2/b2_authorize_account";
pub const LARGE_FILE_ID: &str = "4_z27c88f1d182b150646ff0b16_f200ec6ae";

pub fn api_path(endpoint: &str) -> String {
    format!("/b2api/v2/{endpoint}")
}

pub fn auth_body(server: &MockServer) -> Value {
    json!({
        "accountId": "account-1",
        "apiUrl": server.uri(),
        "authorizationToken": "auth-token",
        "downloadUrl": server.uri(),
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

/// Mount a successful authentication exchange expected exactly once
pub async fn mount_auth(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(server)))
        .expect(1)
        .mount(server)
        .await;
}

/// Route client logs to the test output; filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn client(server: &MockServer) -> NimbusClient {
    init_tracing();
    let config = Config::new(format!("{}{}", server.uri(), AUTH_PATH))
        .with_upload_retry_delay(Duration::from_millis(50));
    NimbusClient::new(Credentials::new("key-id", "application-key"), config)
        .expect("client builds")
}

pub fn stored_file(file_id: &str, file_name: &str, action: &str) -> Value {
    json!({
        "accountId": "account-1",
        "action": action,
        "bucketId": "bucket-1",
        "contentLength": 0,
        "contentSha1": "none",
        "contentType": "b2/x-auto",
        "fileId": file_id,
        "fileInfo": {},
        "fileName": file_name,
        "uploadTimestamp": 1700000000000i64
    })
}

pub fn part_body(file_id: &str, part_number: u32, data: &[u8]) -> Value {
    json!({
        "fileId": file_id,
        "partNumber": part_number,
        "contentLength": data.len(),
        "contentSha1": sha1_hex(data),
        "uploadTimestamp": 1700000000000i64
    })
}

pub fn error_body(status: u16, code: &str, message: &str) -> Value {
    json!({"status": status, "code": code, "message": message})
}

/// Answers a part upload the way the service does: echoing the part number
/// and the SHA-1 of the bytes it received
pub struct PartResponder {
    pub file_id: String,
}

impl Respond for PartResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let part_number = request
            .headers
            .get("x-bz-part-number")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());

        match part_number {
            Some(n) => ResponseTemplate::new(200).set_body_json(part_body(&self.file_id, n, &request.body)),
            None => ResponseTemplate::new(400).set_body_json(error_body(
                400,
                "bad_request",
                "missing X-Bz-Part-Number",
            )),
        }
    }
}
