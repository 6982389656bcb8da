//! Error classification for failed responses
//!
//! Every endpoint reports failures with the same JSON shape:
//!
//! ```text
//! {"status": 400, "code": "bad_request", "message": "..."}
//! ```

use crate::{ApiResponse, ClientError, Result, ServiceError};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Deserialize)]
struct ErrorBody {
    status: u16,
    code: String,
    message: String,
}

/// Check if a status is one of the transient conditions worth retrying
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT | StatusCode::SERVICE_UNAVAILABLE
    )
}

/// Turn a failed response into a typed error.
///
/// `operation` names the API family the request belonged to; a 401 outside
/// authentication usually means the key lacks a capability, so the message
/// says so.
pub fn classify(response: &ApiResponse, operation: Option<&str>) -> ClientError {
    let retryable = is_retryable_status(response.status);

    let body: ErrorBody = match serde_json::from_slice(&response.body) {
        Ok(body) => body,
        Err(e) => {
            return ClientError::MalformedErrorBody {
                status: response.status.as_u16(),
                body: response.text(),
                reason: e.to_string(),
            };
        }
    };

    let message = match operation {
        Some(op) if body.status == 401 => format!(
            "Unauthorized error when operating on {op}. Are you sure the key you are using has access? {}",
            body.message
        ),
        _ => body.message,
    };

    ClientError::Service(ServiceError {
        status: body.status,
        code: body.code,
        message,
        retryable,
    })
}

/// Pass a successful response through, classify anything else
pub fn check(response: ApiResponse, operation: Option<&str>) -> Result<ApiResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(classify(&response, operation))
    }
}

/// Check a response and decode its JSON body
pub fn parse_response<T: DeserializeOwned>(
    response: ApiResponse,
    operation: Option<&str>,
) -> Result<T> {
    let response = check(response, operation)?;
    serde_json::from_slice(&response.body).map_err(|e| {
        ClientError::InvalidResponse(format!(
            "could not decode {}: {}",
            std::any::type_name::<T>(),
            e
        ))
    })
}
