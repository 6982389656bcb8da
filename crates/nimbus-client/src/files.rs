//! Single-shot file operations

use crate::api::{
    self, endpoints, headers, BucketIdPayload, CopyFilePayload, DeleteFilePayload,
    DownloadAuthorizationPayload, FileIdPayload, HideFilePayload, ListFilesPayload,
};
use crate::checksum::ChecksumMode;
use crate::classify;
use crate::client::ClientCore;
use crate::types::*;
use crate::{ApiResponse, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const API: &str = "files";

/// Single-shot file operations
#[derive(Clone)]
pub struct Files {
    core: Arc<ClientCore>,
}

impl Files {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    // ==================== Listing ====================

    /// List file names in a bucket
    #[instrument(skip(self))]
    pub async fn list_names(&self, options: ListFilesOptions) -> Result<FileList> {
        self.list(endpoints::LIST_FILE_NAMES, &options).await
    }

    /// List all versions of the files in a bucket
    #[instrument(skip(self))]
    pub async fn list_versions(&self, options: ListFilesOptions) -> Result<FileList> {
        self.list(endpoints::LIST_FILE_VERSIONS, &options).await
    }

    async fn list(&self, endpoint: &str, options: &ListFilesOptions) -> Result<FileList> {
        let bucket_id = self
            .core
            .config
            .resolve_bucket_id(options.bucket_id.as_deref())?;

        let state = self.core.authorized().await?;
        let start_file_id = if endpoint == endpoints::LIST_FILE_VERSIONS {
            options.start_file_id.as_deref()
        } else {
            None
        };
        let payload = ListFilesPayload {
            bucket_id: &bucket_id,
            start_file_name: options.start_file_name.as_deref(),
            start_file_id,
            max_file_count: options.max_file_count,
            prefix: options.prefix.as_deref(),
            delimiter: options.delimiter.as_deref(),
        };
        self.core.post(&state, endpoint, &payload, API).await
    }

    /// Get metadata of one file version
    #[instrument(skip(self))]
    pub async fn get_info(&self, file_id: &str) -> Result<StoredFile> {
        let state = self.core.authorized().await?;
        self.core
            .post(&state, endpoints::GET_FILE_INFO, &FileIdPayload { file_id }, API)
            .await
    }

    // ==================== Uploads ====================

    /// Get a bucket-scoped upload endpoint
    #[instrument(skip(self))]
    pub async fn get_upload_url(&self, bucket_id: Option<&str>) -> Result<UploadUrl> {
        let bucket_id = self.core.config.resolve_bucket_id(bucket_id)?;
        let state = self.core.authorized().await?;
        self.core
            .post(
                &state,
                endpoints::GET_UPLOAD_URL,
                &BucketIdPayload {
                    bucket_id: &bucket_id,
                },
                API,
            )
            .await
    }

    /// Upload a file through an upload endpoint.
    ///
    /// Throttled or unavailable responses are retried once after the
    /// configured delay.
    #[instrument(skip(self, data, upload_url, options))]
    pub async fn upload(
        &self,
        data: impl Into<Bytes>,
        file_name: &str,
        upload_url: &UploadUrl,
        options: &FileOptions,
        checksum: ChecksumMode,
    ) -> Result<StoredFile> {
        let data = data.into();
        let size = data.len();

        let request = api::upload_file_request(upload_url, data, file_name, options, checksum)?;
        let response = self.core.send_upload(request, API).await?;
        let file: StoredFile = classify::parse_response(response, Some(API))?;
        info!(file_id = %file.file_id, size, "Uploaded file");
        Ok(file)
    }

    /// Fetch an upload endpoint and upload a file through it
    pub async fn upload_to_bucket(
        &self,
        data: impl Into<Bytes>,
        file_name: &str,
        bucket_id: Option<&str>,
        options: &FileOptions,
    ) -> Result<StoredFile> {
        let upload_url = self.get_upload_url(bucket_id).await?;
        self.upload(data, file_name, &upload_url, options, ChecksumMode::Verify)
            .await
    }

    // ==================== Downloads ====================

    /// Download a file (or a byte range of it) by id
    #[instrument(skip(self))]
    pub async fn download_by_id(
        &self,
        file_id: &str,
        range: Option<ByteRange>,
    ) -> Result<DownloadedFile> {
        let state = self.core.authorized().await?;
        let request = api::download_by_id_request(&state, file_id, range)?;
        let response = self.core.send(request, API).await?;
        Ok(downloaded_file(response))
    }

    /// Download a file (or a byte range of it) by bucket and file name
    #[instrument(skip(self))]
    pub async fn download_by_name(
        &self,
        bucket_name: &str,
        file_name: &str,
        range: Option<ByteRange>,
    ) -> Result<DownloadedFile> {
        let state = self.core.authorized().await?;
        let request = api::download_by_name_request(&state, bucket_name, file_name, range)?;
        let response = self.core.send(request, API).await?;
        Ok(downloaded_file(response))
    }

    /// Get a token for downloading files under a prefix of a private bucket
    #[instrument(skip(self))]
    pub async fn get_download_authorization(
        &self,
        file_name_prefix: &str,
        valid_duration_secs: u32,
        bucket_id: Option<&str>,
        content_disposition: Option<&str>,
    ) -> Result<DownloadAuthorization> {
        let bucket_id = self.core.config.resolve_bucket_id(bucket_id)?;
        let state = self.core.authorized().await?;
        let payload = DownloadAuthorizationPayload {
            bucket_id: &bucket_id,
            file_name_prefix,
            valid_duration_in_seconds: valid_duration_secs,
            b2_content_disposition: content_disposition,
        };
        self.core
            .post(&state, endpoints::GET_DOWNLOAD_AUTHORIZATION, &payload, API)
            .await
    }

    // ==================== Mutations ====================

    /// Delete one version of a file
    #[instrument(skip(self))]
    pub async fn delete(&self, file_id: &str, file_name: &str) -> Result<StoredFile> {
        let state = self.core.authorized().await?;
        let payload = DeleteFilePayload { file_id, file_name };
        self.core
            .post(&state, endpoints::DELETE_FILE_VERSION, &payload, API)
            .await
    }

    /// Hide a file so it no longer shows up in name listings
    #[instrument(skip(self))]
    pub async fn hide(&self, file_name: &str, bucket_id: Option<&str>) -> Result<StoredFile> {
        let bucket_id = self.core.config.resolve_bucket_id(bucket_id)?;
        let state = self.core.authorized().await?;
        let payload = HideFilePayload {
            bucket_id: &bucket_id,
            file_name,
        };
        self.core
            .post(&state, endpoints::HIDE_FILE, &payload, API)
            .await
    }

    /// Copy a stored file server-side
    #[instrument(skip(self, options))]
    pub async fn copy(
        &self,
        source_file_id: &str,
        new_file_name: &str,
        options: &CopyOptions,
    ) -> Result<StoredFile> {
        let state = self.core.authorized().await?;

        let replace = options.metadata_directive == MetadataDirective::Replace;
        let payload = CopyFilePayload {
            source_file_id,
            file_name: new_file_name,
            destination_bucket_id: options.destination_bucket_id.as_deref(),
            range: options.range.map(|r| r.to_string()),
            metadata_directive: options.metadata_directive,
            content_type: replace.then(|| options.file.content_type_or_auto()),
            file_info: if replace {
                api::file_info_map(&options.file)
            } else {
                None
            },
        };
        self.core
            .post(&state, endpoints::COPY_FILE, &payload, API)
            .await
    }
}

fn downloaded_file(response: ApiResponse) -> DownloadedFile {
    let header = |name: &str| response.header_str(name).map(str::to_string);

    let mut file_info = HashMap::new();
    for (name, value) in response.headers.iter() {
        let Some(key) = name.as_str().strip_prefix("x-bz-info-") else {
            continue;
        };
        if let Ok(v) = value.to_str() {
            file_info.insert(key.to_string(), api::decode_header_value(v));
        }
    }

    let uploaded_at = header(headers::UPLOAD_TIMESTAMP)
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(chrono::DateTime::from_timestamp_millis);

    debug!("Downloaded {} bytes", response.body.len());
    DownloadedFile {
        file_id: header(headers::FILE_ID),
        file_name: header(headers::FILE_NAME).map(|n| api::decode_header_value(&n)),
        content_sha1: header(headers::CONTENT_SHA1),
        content_type: header("Content-Type"),
        file_info,
        uploaded_at,
        data: response.body,
    }
}
