//! Large-file uploads
//!
//! A large file is assembled server-side from parts that are uploaded (or
//! copied) independently and numbered 1..=10000. [`LargeFiles`] exposes the
//! raw protocol steps; [`LargeFileUpload`] wraps one logical upload and keeps
//! the ledger of parts the service has acknowledged, so that `finish` can
//! send their checksums in part order.

use crate::api::{
    self, endpoints, CopyPartPayload, FileIdPayload, FinishLargeFilePayload, ListPartsPayload,
    ListUnfinishedPayload, StartLargeFilePayload,
};
use crate::checksum::ChecksumMode;
use crate::classify;
use crate::client::ClientCore;
use crate::types::*;
use crate::{ClientError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const API: &str = "large files";

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(UploadProgress) + Send + Sync>;

/// Upload progress information
#[derive(Clone, Debug)]
pub struct UploadProgress {
    /// Bytes uploaded so far
    pub bytes_uploaded: u64,
    /// Total bytes to upload
    pub total_bytes: u64,
    /// Last part uploaded
    pub current_part: u32,
    /// Total number of parts
    pub total_parts: u32,
}

impl UploadProgress {
    /// Get percentage complete
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.bytes_uploaded as f64 / self.total_bytes as f64) * 100.0
    }
}

/// Large-file protocol operations
#[derive(Clone)]
pub struct LargeFiles {
    core: Arc<ClientCore>,
}

impl LargeFiles {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    /// Start a large file; the returned file has no parts yet
    #[instrument(skip(self, options))]
    pub async fn start(
        &self,
        bucket_id: Option<&str>,
        file_name: &str,
        options: &FileOptions,
    ) -> Result<StoredFile> {
        let bucket_id = self.core.config.resolve_bucket_id(bucket_id)?;
        let state = self.core.authorized().await?;

        let payload = StartLargeFilePayload {
            bucket_id: &bucket_id,
            file_name,
            content_type: options.content_type_or_auto(),
            file_info: api::file_info_map(options),
        };
        let file: StoredFile = self
            .core
            .post(&state, endpoints::START_LARGE_FILE, &payload, API)
            .await?;
        info!(file_id = %file.file_id, "Started large file");
        Ok(file)
    }

    /// Start a large file and return a handle that tracks its parts
    pub async fn start_upload(
        &self,
        bucket_id: Option<&str>,
        file_name: &str,
        options: &FileOptions,
    ) -> Result<LargeFileUpload> {
        let file = self.start(bucket_id, file_name, options).await?;
        Ok(LargeFileUpload::new(self.clone(), file))
    }

    /// Get a fresh upload slot for the parts of a large file
    #[instrument(skip(self))]
    pub async fn get_part_upload_slot(&self, file_id: &str) -> Result<PartUploadSlot> {
        let state = self.core.authorized().await?;
        self.core
            .post(&state, endpoints::GET_UPLOAD_PART_URL, &FileIdPayload { file_id }, API)
            .await
    }

    /// Upload one part, with its checksum verified by the service
    pub async fn upload_part(
        &self,
        data: impl Into<Bytes>,
        part_number: u32,
        slot: &PartUploadSlot,
    ) -> Result<PartRecord> {
        self.upload_part_with_checksum(data, part_number, slot, ChecksumMode::Verify)
            .await
    }

    /// Upload one part.
    ///
    /// The part number is checked before anything is sent. Throttled or
    /// unavailable responses are retried once after the configured delay.
    #[instrument(skip(self, data, slot), fields(file_id = %slot.file_id))]
    pub async fn upload_part_with_checksum(
        &self,
        data: impl Into<Bytes>,
        part_number: u32,
        slot: &PartUploadSlot,
        checksum: ChecksumMode,
    ) -> Result<PartRecord> {
        let data = data.into();
        let size = data.len();

        let request = api::upload_part_request(slot, part_number, data, checksum)?;
        let response = self.core.send_upload(request, API).await?;
        let part: PartRecord = classify::parse_response(response, Some(API))?;
        debug!(part_number, size, "Uploaded part");
        Ok(part)
    }

    /// Copy a stored file (or a range of it) into a part of a large file
    #[instrument(skip(self))]
    pub async fn copy_part(
        &self,
        source_file_id: &str,
        large_file_id: &str,
        part_number: u32,
        range: Option<ByteRange>,
    ) -> Result<PartRecord> {
        api::validate_part_number(part_number)?;
        let state = self.core.authorized().await?;

        let payload = CopyPartPayload {
            source_file_id,
            large_file_id,
            part_number,
            range: range.map(|r| r.to_string()),
        };
        self.core
            .post(&state, endpoints::COPY_PART, &payload, API)
            .await
    }

    /// Assemble a large file from its parts.
    ///
    /// `part_sha1s` holds the checksum of every part in part-number order,
    /// starting at part 1.
    #[instrument(skip(self, part_sha1s), fields(parts = part_sha1s.len()))]
    pub async fn finish(&self, file_id: &str, part_sha1s: &[String]) -> Result<FinishedFile> {
        let state = self.core.authorized().await?;

        let payload = FinishLargeFilePayload {
            file_id,
            part_sha1_array: part_sha1s,
        };
        let file: StoredFile = self
            .core
            .post(&state, endpoints::FINISH_LARGE_FILE, &payload, API)
            .await?;
        info!(file_id = %file.file_id, "Finished large file");
        Ok(FinishedFile {
            file,
            part_count: part_sha1s.len(),
        })
    }

    /// List one page of the parts uploaded so far
    #[instrument(skip(self))]
    pub async fn list_parts(
        &self,
        file_id: &str,
        start_part_number: u32,
        max_part_count: u32,
    ) -> Result<PartList> {
        api::validate_part_number(start_part_number)?;
        let state = self.core.authorized().await?;

        let payload = ListPartsPayload {
            file_id,
            start_part_number,
            max_part_count,
        };
        self.core
            .post(&state, endpoints::LIST_PARTS, &payload, API)
            .await
    }

    /// List every part, following the pagination cursor
    pub async fn list_all_parts(&self, file_id: &str) -> Result<Vec<PartRecord>> {
        let mut parts = Vec::new();
        let mut start = MIN_PART_NUMBER;

        loop {
            let page = self.list_parts(file_id, start, 1000).await?;
            parts.extend(page.parts);
            match page.next_part_number {
                Some(next) if next > start => start = next,
                _ => break,
            }
        }

        Ok(parts)
    }

    /// Cancel a large file and discard its parts
    #[instrument(skip(self))]
    pub async fn cancel(&self, file_id: &str) -> Result<CancelledFile> {
        let state = self.core.authorized().await?;
        let cancelled: CancelledFile = self
            .core
            .post(&state, endpoints::CANCEL_LARGE_FILE, &FileIdPayload { file_id }, API)
            .await?;
        info!(file_id = %cancelled.file_id, "Cancelled large file");
        Ok(cancelled)
    }

    /// List large files that were started but neither finished nor cancelled
    #[instrument(skip(self))]
    pub async fn list_incomplete(&self, options: ListIncompleteOptions) -> Result<IncompleteUploads> {
        let bucket_id = self
            .core
            .config
            .resolve_bucket_id(options.bucket_id.as_deref())?;
        let state = self.core.authorized().await?;

        let payload = ListUnfinishedPayload {
            bucket_id: &bucket_id,
            start_file_id: options.start_file_id.as_deref(),
            max_file_count: options.max_file_count,
        };
        self.core
            .post(&state, endpoints::LIST_UNFINISHED_LARGE_FILES, &payload, API)
            .await
    }

    /// Upload an in-memory buffer as a large file.
    ///
    /// The buffer is split into parts of `part_size` bytes (the session's
    /// recommended size when `None`) and uploaded in order through one slot.
    /// A failed part leaves the file unfinished; cancelling it is up to the
    /// caller.
    pub async fn upload_bytes(
        &self,
        bucket_id: Option<&str>,
        file_name: &str,
        data: Bytes,
        options: &FileOptions,
        part_size: Option<u64>,
        progress: Option<ProgressCallback>,
    ) -> Result<FinishedFile> {
        if data.is_empty() {
            return Err(ClientError::Config("nothing to upload".to_string()));
        }

        let state = self.core.authorized().await?;
        let part_size = part_size
            .unwrap_or(state.recommended_part_size)
            .max(state.absolute_minimum_part_size)
            .max(1);
        let total_bytes = data.len() as u64;
        let total_parts = total_bytes.div_ceil(part_size);
        if total_parts > u64::from(MAX_PART_NUMBER) {
            return Err(ClientError::Config(format!(
                "{total_bytes} bytes need {total_parts} parts of {part_size} bytes, more than {MAX_PART_NUMBER}"
            )));
        }
        let total_parts = total_parts as u32;

        let upload = self.start_upload(bucket_id, file_name, options).await?;
        let slot = upload.get_part_upload_slot().await?;

        for part_number in MIN_PART_NUMBER..=total_parts {
            let start = u64::from(part_number - 1) * part_size;
            let end = (start + part_size).min(total_bytes);
            let chunk = data.slice(start as usize..end as usize);

            upload.upload_part(chunk, part_number, &slot).await?;
            let bytes_uploaded = end;

            if let Some(ref cb) = progress {
                cb(UploadProgress {
                    bytes_uploaded,
                    total_bytes,
                    current_part: part_number,
                    total_parts,
                });
            }
        }

        upload.finish().await
    }
}

/// Lifecycle of one large-file upload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    /// Started, no part acknowledged yet
    Started,
    /// At least one part acknowledged
    PartsInProgress,
    /// Assembled; terminal
    Finished,
    /// Discarded; terminal
    Cancelled,
}

impl UploadState {
    /// Check for `Finished` or `Cancelled`
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::PartsInProgress => "in progress",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

struct Ledger {
    state: UploadState,
    parts: BTreeMap<u32, PartRecord>,
}

/// Handle for one logical large-file upload.
///
/// Parts may be uploaded concurrently through a shared reference; each
/// acknowledged part is recorded once per part number (a re-uploaded part
/// replaces its earlier record). Once finished or cancelled, every further
/// operation fails with [`ClientError::UploadClosed`] without a request.
pub struct LargeFileUpload {
    large_files: LargeFiles,
    file: StoredFile,
    ledger: Mutex<Ledger>,
}

impl LargeFileUpload {
    fn new(large_files: LargeFiles, file: StoredFile) -> Self {
        Self {
            large_files,
            file,
            ledger: Mutex::new(Ledger {
                state: UploadState::Started,
                parts: BTreeMap::new(),
            }),
        }
    }

    /// File id issued at start
    pub fn file_id(&self) -> &str {
        &self.file.file_id
    }

    /// File name
    pub fn file_name(&self) -> &str {
        &self.file.file_name
    }

    /// The file as returned by start
    pub fn file(&self) -> &StoredFile {
        &self.file
    }

    /// Current state
    pub fn state(&self) -> UploadState {
        self.ledger.lock().state
    }

    /// Acknowledged parts in part-number order
    pub fn parts(&self) -> Vec<PartRecord> {
        self.ledger.lock().parts.values().cloned().collect()
    }

    /// Checksums of the acknowledged parts in part-number order
    pub fn part_checksums(&self) -> Vec<String> {
        self.ledger
            .lock()
            .parts
            .values()
            .map(|p| p.content_sha1.clone())
            .collect()
    }

    fn ensure_open(&self) -> Result<()> {
        let state = self.ledger.lock().state;
        if state.is_terminal() {
            return Err(ClientError::UploadClosed {
                file_id: self.file.file_id.clone(),
                state: state.to_string(),
            });
        }
        Ok(())
    }

    fn record(&self, part: &PartRecord) {
        let mut ledger = self.ledger.lock();
        if ledger.state.is_terminal() {
            return;
        }
        ledger.parts.insert(part.part_number, part.clone());
        ledger.state = UploadState::PartsInProgress;
    }

    /// Get a fresh slot for uploading parts of this file
    pub async fn get_part_upload_slot(&self) -> Result<PartUploadSlot> {
        self.ensure_open()?;
        self.large_files.get_part_upload_slot(self.file_id()).await
    }

    /// Upload one part with a verified checksum and record it
    pub async fn upload_part(
        &self,
        data: impl Into<Bytes>,
        part_number: u32,
        slot: &PartUploadSlot,
    ) -> Result<PartRecord> {
        self.upload_part_with_checksum(data, part_number, slot, ChecksumMode::Verify)
            .await
    }

    /// Upload one part and record it
    pub async fn upload_part_with_checksum(
        &self,
        data: impl Into<Bytes>,
        part_number: u32,
        slot: &PartUploadSlot,
        checksum: ChecksumMode,
    ) -> Result<PartRecord> {
        api::validate_part_number(part_number)?;
        self.ensure_open()?;
        if slot.file_id != self.file.file_id {
            return Err(ClientError::Config(format!(
                "upload slot belongs to {}, not {}",
                slot.file_id, self.file.file_id
            )));
        }

        let part = self
            .large_files
            .upload_part_with_checksum(data, part_number, slot, checksum)
            .await?;
        self.record(&part);
        Ok(part)
    }

    /// Copy a stored file (or a range of it) into a part and record it
    pub async fn copy_part(
        &self,
        source_file_id: &str,
        part_number: u32,
        range: Option<ByteRange>,
    ) -> Result<PartRecord> {
        api::validate_part_number(part_number)?;
        self.ensure_open()?;

        let part = self
            .large_files
            .copy_part(source_file_id, self.file_id(), part_number, range)
            .await?;
        self.record(&part);
        Ok(part)
    }

    /// Finish with the recorded checksums.
    ///
    /// Fails with [`ClientError::MissingPart`] if the recorded part numbers
    /// do not run from 1 without gaps.
    pub async fn finish(&self) -> Result<FinishedFile> {
        self.ensure_open()?;
        let checksums = self.contiguous_checksums()?;

        let finished = self.large_files.finish(self.file_id(), &checksums).await?;
        self.ledger.lock().state = UploadState::Finished;
        Ok(finished)
    }

    /// Cancel the upload and discard its parts
    pub async fn cancel(&self) -> Result<CancelledFile> {
        self.ensure_open()?;

        let cancelled = self.large_files.cancel(self.file_id()).await?;
        self.ledger.lock().state = UploadState::Cancelled;
        Ok(cancelled)
    }

    fn contiguous_checksums(&self) -> Result<Vec<String>> {
        let ledger = self.ledger.lock();
        let mut checksums = Vec::with_capacity(ledger.parts.len());

        for (expected, (&number, part)) in (MIN_PART_NUMBER..).zip(ledger.parts.iter()) {
            if number != expected {
                return Err(ClientError::MissingPart(expected));
            }
            checksums.push(part.content_sha1.clone());
        }

        if checksums.is_empty() {
            return Err(ClientError::MissingPart(MIN_PART_NUMBER));
        }
        Ok(checksums)
    }
}

impl fmt::Debug for LargeFileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = self.ledger.lock();
        f.debug_struct("LargeFileUpload")
            .field("file_id", &self.file.file_id)
            .field("file_name", &self.file.file_name)
            .field("state", &ledger.state)
            .field("parts", &ledger.parts.len())
            .finish()
    }
}
