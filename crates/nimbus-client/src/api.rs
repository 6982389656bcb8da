//! Request builders
//!
//! Endpoint names, JSON payloads and header conventions of the service live
//! here; the operation modules only decide *what* to send.

use crate::checksum::ChecksumMode;
use crate::types::{
    ByteRange, CorsRule, FileOptions, LifecycleRule, MetadataDirective, PartUploadSlot, UploadUrl,
    MAX_PART_NUMBER, MIN_PART_NUMBER,
};
use crate::{ApiRequest, ClientError, Result, SessionState};
use bytes::Bytes;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use serde::Serialize;
use std::collections::HashMap;

/// Version path segment of every API call
const API_PATH: &str = "b2api/v2";

pub(crate) mod endpoints {
    pub const LIST_BUCKETS: &str = "b2_list_buckets";
    pub const CREATE_BUCKET: &str = "b2_create_bucket";
    pub const UPDATE_BUCKET: &str = "b2_update_bucket";
    pub const DELETE_BUCKET: &str = "b2_delete_bucket";

    pub const GET_UPLOAD_URL: &str = "b2_get_upload_url";
    pub const LIST_FILE_NAMES: &str = "b2_list_file_names";
    pub const LIST_FILE_VERSIONS: &str = "b2_list_file_versions";
    pub const GET_FILE_INFO: &str = "b2_get_file_info";
    pub const HIDE_FILE: &str = "b2_hide_file";
    pub const DELETE_FILE_VERSION: &str = "b2_delete_file_version";
    pub const COPY_FILE: &str = "b2_copy_file";
    pub const DOWNLOAD_FILE_BY_ID: &str = "b2_download_file_by_id";
    pub const GET_DOWNLOAD_AUTHORIZATION: &str = "b2_get_download_authorization";

    pub const START_LARGE_FILE: &str = "b2_start_large_file";
    pub const GET_UPLOAD_PART_URL: &str = "b2_get_upload_part_url";
    pub const FINISH_LARGE_FILE: &str = "b2_finish_large_file";
    pub const LIST_PARTS: &str = "b2_list_parts";
    pub const CANCEL_LARGE_FILE: &str = "b2_cancel_large_file";
    pub const LIST_UNFINISHED_LARGE_FILES: &str = "b2_list_unfinished_large_files";
    pub const COPY_PART: &str = "b2_copy_part";
}

pub(crate) mod headers {
    pub const PART_NUMBER: &str = "X-Bz-Part-Number";
    pub const CONTENT_SHA1: &str = "X-Bz-Content-Sha1";
    pub const FILE_NAME: &str = "X-Bz-File-Name";
    pub const FILE_ID: &str = "X-Bz-File-Id";
    pub const UPLOAD_TIMESTAMP: &str = "X-Bz-Upload-Timestamp";
    pub const INFO_PREFIX: &str = "X-Bz-Info-";
}

/// Everything except unreserved characters and `/` is escaped
const FILE_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encode a file name for headers and download paths
pub fn encode_file_name(name: &str) -> String {
    utf8_percent_encode(name, FILE_NAME_ENCODE_SET).to_string()
}

/// Decode a percent-encoded header value (`+` stands for a space)
pub fn decode_header_value(value: &str) -> String {
    percent_decode_str(&value.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Reject part numbers outside 1..=10000
pub fn validate_part_number(part_number: u32) -> Result<()> {
    if (MIN_PART_NUMBER..=MAX_PART_NUMBER).contains(&part_number) {
        Ok(())
    } else {
        Err(ClientError::InvalidPartNumber(part_number))
    }
}

fn api_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), API_PATH, endpoint)
}

pub(crate) fn authorize_request(auth_url: &str, basic_authorization: &str) -> Result<ApiRequest> {
    ApiRequest::new(Method::GET, auth_url).header("Authorization", basic_authorization)
}

/// POST a JSON payload to an API endpoint with the session token
pub(crate) fn json_request<T: Serialize>(
    state: &SessionState,
    endpoint: &str,
    payload: &T,
) -> Result<ApiRequest> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| ClientError::Config(format!("could not encode {endpoint} payload: {e}")))?;

    Ok(ApiRequest::new(Method::POST, api_url(&state.api_url, endpoint))
        .header("Authorization", state.authorization_token())?
        .header("Content-Type", "application/json")?
        .body(body))
}

pub(crate) fn upload_part_request(
    slot: &PartUploadSlot,
    part_number: u32,
    data: Bytes,
    checksum: ChecksumMode,
) -> Result<ApiRequest> {
    validate_part_number(part_number)?;
    let sha1 = checksum.header_value(&data);

    Ok(ApiRequest::new(Method::POST, slot.upload_url.as_str())
        .header("Authorization", &slot.authorization_token)?
        .header(headers::PART_NUMBER, &part_number.to_string())?
        .header(headers::CONTENT_SHA1, &sha1)?
        .body(data))
}

pub(crate) fn upload_file_request(
    upload_url: &UploadUrl,
    data: Bytes,
    file_name: &str,
    options: &FileOptions,
    checksum: ChecksumMode,
) -> Result<ApiRequest> {
    let sha1 = checksum.header_value(&data);

    let mut request = ApiRequest::new(Method::POST, upload_url.upload_url.as_str())
        .header("Authorization", &upload_url.authorization_token)?
        .header(headers::FILE_NAME, &encode_file_name(file_name))?
        .header(headers::CONTENT_SHA1, &sha1)?
        .header("Content-Type", options.content_type_or_auto())?;

    for (key, value) in options.limited_metadata() {
        request = request.header(
            &format!("{}{}", headers::INFO_PREFIX, key),
            &encode_file_name(value),
        )?;
    }

    Ok(request.body(data))
}

pub(crate) fn download_by_id_request(
    state: &SessionState,
    file_id: &str,
    range: Option<ByteRange>,
) -> Result<ApiRequest> {
    let body = serde_json::to_vec(&FileIdPayload { file_id })
        .map_err(|e| ClientError::Config(format!("could not encode download payload: {e}")))?;

    let request = ApiRequest::new(
        Method::POST,
        api_url(&state.download_url, endpoints::DOWNLOAD_FILE_BY_ID),
    )
    .header("Authorization", state.authorization_token())?
    .header("Content-Type", "application/json")?
    .body(body);

    with_range(request, range)
}

pub(crate) fn download_by_name_request(
    state: &SessionState,
    bucket_name: &str,
    file_name: &str,
    range: Option<ByteRange>,
) -> Result<ApiRequest> {
    let url = format!(
        "{}/file/{}/{}",
        state.download_url,
        encode_file_name(bucket_name),
        encode_file_name(file_name)
    );
    let request =
        ApiRequest::new(Method::GET, url).header("Authorization", state.authorization_token())?;

    with_range(request, range)
}

fn with_range(request: ApiRequest, range: Option<ByteRange>) -> Result<ApiRequest> {
    match range {
        Some(range) => request.header("Range", &range.to_string()),
        None => Ok(request),
    }
}

/// Metadata as a JSON object, capped like the header form
pub(crate) fn file_info_map(options: &FileOptions) -> Option<serde_json::Map<String, serde_json::Value>> {
    if options.metadata.is_empty() {
        return None;
    }
    Some(
        options
            .limited_metadata()
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect(),
    )
}

// ==================== Payloads ====================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountPayload<'a> {
    pub account_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BucketPayload<'a> {
    pub account_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_type: Option<crate::types::BucketType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_info: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle_rules: Option<&'a [LifecycleRule]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_rules: Option<&'a [CorsRule]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_revision_is: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BucketIdPayload<'a> {
    pub bucket_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileIdPayload<'a> {
    pub file_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListFilesPayload<'a> {
    pub bucket_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HideFilePayload<'a> {
    pub bucket_id: &'a str,
    pub file_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteFilePayload<'a> {
    pub file_id: &'a str,
    pub file_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CopyFilePayload<'a> {
    pub source_file_id: &'a str,
    pub file_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_bucket_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub metadata_directive: MetadataDirective,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_info: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DownloadAuthorizationPayload<'a> {
    pub bucket_id: &'a str,
    pub file_name_prefix: &'a str,
    pub valid_duration_in_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b2_content_disposition: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartLargeFilePayload<'a> {
    pub bucket_id: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_info: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FinishLargeFilePayload<'a> {
    pub file_id: &'a str,
    pub part_sha1_array: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListPartsPayload<'a> {
    pub file_id: &'a str,
    pub start_part_number: u32,
    pub max_part_count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListUnfinishedPayload<'a> {
    pub bucket_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_count: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CopyPartPayload<'a> {
    pub source_file_id: &'a str,
    pub large_file_id: &'a str,
    pub part_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_file_name_keeps_slashes() {
        assert_eq!(encode_file_name("reports/2024 q1.csv"), "reports/2024%20q1.csv");
        assert_eq!(encode_file_name("a+b&c"), "a%2Bb%26c");
        assert_eq!(encode_file_name("naïve.txt"), "na%C3%AFve.txt");
    }

    #[test]
    fn test_decode_header_value() {
        assert_eq!(decode_header_value("reports/2024%20q1.csv"), "reports/2024 q1.csv");
        assert_eq!(decode_header_value("hello+world"), "hello world");
        assert_eq!(decode_header_value("a%2Bb"), "a+b");
    }

    #[test]
    fn test_part_number_bounds() {
        assert!(validate_part_number(1).is_ok());
        assert!(validate_part_number(10_000).is_ok());
        assert!(matches!(validate_part_number(0), Err(ClientError::InvalidPartNumber(0))));
        assert!(matches!(
            validate_part_number(10_001),
            Err(ClientError::InvalidPartNumber(10_001))
        ));
    }

    #[test]
    fn test_upload_part_request_headers() {
        let slot = PartUploadSlot {
            file_id: "f1".to_string(),
            upload_url: "https://pod.test/b2api/v2/b2_upload_part/f1".to_string(),
            authorization_token: "slot-token".to_string(),
        };
        let request =
            upload_part_request(&slot, 2, Bytes::from_static(b"abc"), ChecksumMode::Verify).unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, slot.upload_url);
        assert_eq!(request.header_str("authorization"), Some("slot-token"));
        assert_eq!(request.header_str("x-bz-part-number"), Some("2"));
        assert_eq!(
            request.header_str("x-bz-content-sha1"),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
    }

    #[test]
    fn test_unverified_upload_part_request() {
        let slot = PartUploadSlot {
            file_id: "f1".to_string(),
            upload_url: "https://pod.test/upload".to_string(),
            authorization_token: "slot-token".to_string(),
        };
        let request =
            upload_part_request(&slot, 1, Bytes::from_static(b"abc"), ChecksumMode::Unverified)
                .unwrap();
        assert_eq!(request.header_str("x-bz-content-sha1"), Some("do_not_verify"));
    }

    #[test]
    fn test_upload_file_request_headers() {
        let url = UploadUrl {
            bucket_id: "bucket-1".to_string(),
            upload_url: "https://pod.test/upload".to_string(),
            authorization_token: "upload-token".to_string(),
        };
        let options = FileOptions::new().with_metadata("author", "J Doe");
        let request = upload_file_request(
            &url,
            Bytes::from_static(b"abc"),
            "dir/report 1.csv",
            &options,
            ChecksumMode::Verify,
        )
        .unwrap();

        assert_eq!(request.header_str("x-bz-file-name"), Some("dir/report%201.csv"));
        assert_eq!(request.header_str("content-type"), Some("b2/x-auto"));
        assert_eq!(request.header_str("x-bz-info-author"), Some("J%20Doe"));
    }

    #[test]
    fn test_repeated_metadata_key_sends_one_header() {
        let url = UploadUrl {
            bucket_id: "bucket-1".to_string(),
            upload_url: "https://pod.test/upload".to_string(),
            authorization_token: "upload-token".to_string(),
        };
        let options = FileOptions::new()
            .with_metadata("author", "a")
            .with_metadata("author", "b");
        let request = upload_file_request(
            &url,
            Bytes::from_static(b"abc"),
            "a.txt",
            &options,
            ChecksumMode::Verify,
        )
        .unwrap();

        let values: Vec<&str> = request
            .headers
            .get_all("x-bz-info-author")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["b"]);
    }

    #[test]
    fn test_file_info_map_keeps_insertion_order_and_distinct_keys() {
        let mut options = FileOptions::new()
            .with_metadata("zeta", "1")
            .with_metadata("alpha", "2");
        for _ in 0..10 {
            options.metadata.push(("dup".to_string(), "v".to_string()));
        }
        options = options.with_metadata("alpha", "3");

        let map = file_info_map(&options).unwrap();
        let entries: Vec<(&str, &str)> = map
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str().unwrap()))
            .collect();
        assert_eq!(entries, vec![("zeta", "1"), ("alpha", "3"), ("dup", "v")]);
    }

    #[test]
    fn test_copy_part_payload_omits_missing_range() {
        let payload = CopyPartPayload {
            source_file_id: "src",
            large_file_id: "dst",
            part_number: 1,
            range: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"sourceFileId": "src", "largeFileId": "dst", "partNumber": 1})
        );
    }

    #[test]
    fn test_download_authorization_payload_field_names() {
        let payload = DownloadAuthorizationPayload {
            bucket_id: "b1",
            file_name_prefix: "public/",
            valid_duration_in_seconds: 3600,
            b2_content_disposition: Some("attachment"),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["validDurationInSeconds"], 3600);
        assert_eq!(value["b2ContentDisposition"], "attachment");
    }
}
