//! Common types for the client SDK

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Content type asking the service to detect the type from the file name
pub const AUTO_CONTENT_TYPE: &str = "b2/x-auto";

/// Maximum number of user metadata entries sent with a file
pub const MAX_FILE_INFO_ENTRIES: usize = 10;

/// Lowest valid part number
pub const MIN_PART_NUMBER: u32 = 1;

/// Highest valid part number
pub const MAX_PART_NUMBER: u32 = 10_000;

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}

// ==================== Buckets ====================

/// Bucket visibility
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BucketType {
    /// Only authorized keys can read
    #[default]
    AllPrivate,
    /// Anyone can download
    AllPublic,
    /// Holds snapshots
    Snapshot,
    /// A type this client does not know about
    #[serde(other)]
    Unknown,
}

/// A bucket
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Owning account
    #[serde(default)]
    pub account_id: Option<String>,
    /// Bucket id
    pub bucket_id: String,
    /// Bucket name
    pub bucket_name: String,
    /// Visibility
    pub bucket_type: BucketType,
    /// Bucket info map
    #[serde(default)]
    pub bucket_info: HashMap<String, String>,
    /// Lifecycle rules
    #[serde(default)]
    pub lifecycle_rules: Vec<LifecycleRule>,
    /// CORS rules
    #[serde(default)]
    pub cors_rules: Vec<CorsRule>,
    /// Revision, bumped on every update
    #[serde(default)]
    pub revision: u64,
}

/// Rule for hiding and deleting old file versions
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRule {
    /// Days after hiding before a version is deleted
    pub days_from_hiding_to_deleting: Option<u32>,
    /// Days after upload before a version is hidden
    pub days_from_uploading_to_hiding: Option<u32>,
    /// Files this rule applies to
    pub file_name_prefix: String,
}

/// Cross-origin rule for browser access
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsRule {
    pub cors_rule_name: String,
    pub allowed_origins: Vec<String>,
    pub allowed_operations: Vec<String>,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    #[serde(default)]
    pub expose_headers: Vec<String>,
    pub max_age_seconds: u32,
}

/// Settings for creating or updating a bucket
#[derive(Clone, Debug, Default)]
pub struct BucketOptions {
    /// Visibility
    pub bucket_type: BucketType,
    /// `Cache-Control: max-age` in seconds, stored as bucket info
    pub cache_control: Option<u32>,
    /// Lifecycle rules
    pub lifecycle_rules: Vec<LifecycleRule>,
    /// CORS rules
    pub cors_rules: Vec<CorsRule>,
}

impl BucketOptions {
    /// Options with only a bucket type
    pub fn new(bucket_type: BucketType) -> Self {
        Self {
            bucket_type,
            ..Default::default()
        }
    }

    /// Set the cache max-age
    pub fn with_cache_control(mut self, max_age_secs: u32) -> Self {
        self.cache_control = Some(max_age_secs);
        self
    }

    /// Add a lifecycle rule
    pub fn with_lifecycle_rule(mut self, rule: LifecycleRule) -> Self {
        self.lifecycle_rules.push(rule);
        self
    }

    /// Add a CORS rule
    pub fn with_cors_rule(mut self, rule: CorsRule) -> Self {
        self.cors_rules.push(rule);
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct BucketList {
    pub buckets: Vec<Bucket>,
}

// ==================== Files ====================

/// A stored file version
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// File id
    pub file_id: String,
    /// File name
    pub file_name: String,
    /// Owning account
    #[serde(default)]
    pub account_id: Option<String>,
    /// Owning bucket
    #[serde(default)]
    pub bucket_id: Option<String>,
    /// "upload", "start", "hide" or "folder"
    #[serde(default)]
    pub action: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub content_length: u64,
    /// Hex SHA-1 of the content ("none" for large files)
    #[serde(default)]
    pub content_sha1: Option<String>,
    /// Content type
    #[serde(default)]
    pub content_type: Option<String>,
    /// User metadata
    #[serde(default)]
    pub file_info: HashMap<String, String>,
    /// Upload time in milliseconds since the epoch
    #[serde(default)]
    pub upload_timestamp: i64,
}

impl StoredFile {
    /// Upload time
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.upload_timestamp)
    }
}

/// One page of a file listing
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    /// Files on this page
    pub files: Vec<StoredFile>,
    /// Name to resume from, if more results exist
    #[serde(default)]
    pub next_file_name: Option<String>,
    /// Id to resume from (version listings only)
    #[serde(default)]
    pub next_file_id: Option<String>,
}

/// Options for listing files
#[derive(Clone, Debug, Default)]
pub struct ListFilesOptions {
    /// Bucket to list (falls back to the configured default)
    pub bucket_id: Option<String>,
    /// Start listing at this name
    pub start_file_name: Option<String>,
    /// Start listing at this id (version listings only)
    pub start_file_id: Option<String>,
    /// Filter by prefix
    pub prefix: Option<String>,
    /// Delimiter for grouping into folders
    pub delimiter: Option<String>,
    /// Maximum files to return
    pub max_file_count: Option<u32>,
}

/// Content type and user metadata for a new file
#[derive(Clone, Debug, Default)]
pub struct FileOptions {
    /// Content type; the auto-detect sentinel when absent
    pub content_type: Option<String>,
    /// User metadata in insertion order
    pub metadata: Vec<(String, String)>,
}

impl FileOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set content type
    pub fn with_content_type(mut self, ct: impl Into<String>) -> Self {
        self.content_type = Some(ct.into());
        self
    }

    /// Add user metadata; an existing key keeps its position and takes the new value
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.metadata.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.metadata.push((key, value)),
        }
        self
    }

    pub(crate) fn content_type_or_auto(&self) -> &str {
        match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() => ct,
            _ => AUTO_CONTENT_TYPE,
        }
    }

    /// Distinct keys in first-seen order, each with its last value, capped
    pub(crate) fn limited_metadata(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = Vec::with_capacity(self.metadata.len());
        for (key, value) in &self.metadata {
            match entries.iter_mut().find(|(k, _)| *k == key.as_str()) {
                Some(entry) => entry.1 = value.as_str(),
                None => entries.push((key.as_str(), value.as_str())),
            }
        }
        entries.truncate(MAX_FILE_INFO_ENTRIES);
        entries
    }
}

/// Bucket-scoped upload endpoint for single-shot uploads
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrl {
    pub bucket_id: String,
    pub upload_url: String,
    pub authorization_token: String,
}

impl fmt::Debug for UploadUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadUrl")
            .field("bucket_id", &self.bucket_id)
            .field("upload_url", &self.upload_url)
            .field("authorization_token", &"<redacted>")
            .finish()
    }
}

/// Whether a copy keeps or replaces the source metadata
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetadataDirective {
    #[default]
    Copy,
    Replace,
}

/// Options for a server-side file copy
#[derive(Clone, Debug, Default)]
pub struct CopyOptions {
    /// Bucket to copy into; the source bucket when absent
    pub destination_bucket_id: Option<String>,
    /// Copy only this byte range
    pub range: Option<ByteRange>,
    /// Keep or replace metadata
    pub metadata_directive: MetadataDirective,
    /// New content type and metadata, used with `MetadataDirective::Replace`
    pub file: FileOptions,
}

/// An inclusive byte range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range covering `start..=end`
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered (0 for an inverted range)
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        (self.end - self.start).saturating_add(1)
    }

    /// Check for an inverted range
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// A downloaded file
#[derive(Clone, Debug)]
pub struct DownloadedFile {
    /// File content
    pub data: Bytes,
    /// File id
    pub file_id: Option<String>,
    /// File name
    pub file_name: Option<String>,
    /// Hex SHA-1 of the whole file
    pub content_sha1: Option<String>,
    /// Content type
    pub content_type: Option<String>,
    /// User metadata
    pub file_info: HashMap<String, String>,
    /// Upload time
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Token for downloading files under a prefix from a private bucket
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAuthorization {
    pub bucket_id: String,
    pub file_name_prefix: String,
    pub authorization_token: String,
}

// ==================== Large files ====================

/// File-scoped upload endpoint for one part at a time
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUploadSlot {
    pub file_id: String,
    pub upload_url: String,
    pub authorization_token: String,
}

impl fmt::Debug for PartUploadSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartUploadSlot")
            .field("file_id", &self.file_id)
            .field("upload_url", &self.upload_url)
            .field("authorization_token", &"<redacted>")
            .finish()
    }
}

/// A part as recorded by the service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    /// Large file the part belongs to
    pub file_id: String,
    /// Part number (1-10000)
    pub part_number: u32,
    /// Part size in bytes
    pub content_length: u64,
    /// Hex SHA-1 of the part, as verified by the service
    pub content_sha1: String,
    /// Upload time in milliseconds since the epoch
    #[serde(default)]
    pub upload_timestamp: i64,
}

impl PartRecord {
    /// Upload time
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.upload_timestamp)
    }
}

/// One page of parts of an unfinished large file
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartList {
    /// Parts on this page
    pub parts: Vec<PartRecord>,
    /// Part number to resume from, if more parts exist
    #[serde(default)]
    pub next_part_number: Option<u32>,
}

/// Result of cancelling a large file
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledFile {
    pub file_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub bucket_id: Option<String>,
    pub file_name: String,
}

/// A large file assembled from its parts
#[derive(Clone, Debug)]
pub struct FinishedFile {
    /// The stored file
    pub file: StoredFile,
    /// Number of parts it was assembled from
    pub part_count: usize,
}

impl FinishedFile {
    /// File id (equal to the id issued at start)
    pub fn file_id(&self) -> &str {
        &self.file.file_id
    }
}

/// One page of unfinished large files
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteUploads {
    /// Unfinished uploads on this page
    pub files: Vec<StoredFile>,
    /// Id to resume from, if more exist
    #[serde(default)]
    pub next_file_id: Option<String>,
}

/// Options for listing unfinished large files
#[derive(Clone, Debug, Default)]
pub struct ListIncompleteOptions {
    /// Bucket to list (falls back to the configured default)
    pub bucket_id: Option<String>,
    /// Start listing at this file id
    pub start_file_id: Option<String>,
    /// Maximum files to return
    pub max_file_count: Option<u32>,
}
