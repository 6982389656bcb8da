//! # Nimbus Client SDK
//!
//! A client SDK for a JSON/HTTP cloud object-storage API.
//!
//! ## Features
//!
//! - **Single-flight sessions**: concurrent callers share one authentication exchange
//! - **Large files**: start, upload or copy parts, finish or cancel, with a part ledger
//! - **Typed errors**: every service failure carries status, code, message and a retry flag
//! - **Pluggable transport**: reqwest by default, any [`Transport`] in tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use nimbus_client::{Config, Credentials, FileOptions, NimbusClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = NimbusClient::new(
//!         Credentials::new("key-id", "application-key"),
//!         Config::default().with_default_bucket("bucket-id"),
//!     )?;
//!
//!     // Upload a large file part by part
//!     let upload = client
//!         .large_files()
//!         .start_upload(None, "backup.tar", &FileOptions::new())
//!         .await?;
//!     let slot = upload.get_part_upload_slot().await?;
//!     upload.upload_part(vec![0u8; 5_000_000], 1, &slot).await?;
//!     upload.upload_part(vec![1u8; 1_000], 2, &slot).await?;
//!     let finished = upload.finish().await?;
//!     println!("{} assembled from {} parts", finished.file_id(), finished.part_count);
//!
//!     Ok(())
//! }
//! ```

mod api;
mod buckets;
mod checksum;
mod classify;
mod client;
mod config;
mod error;
mod files;
mod large_files;
mod session;
mod transport;
mod types;

#[cfg(test)]
mod testing;

pub use api::{decode_header_value, encode_file_name, validate_part_number};
pub use buckets::{validate_bucket_name, Buckets};
pub use checksum::{sha1_hex, ChecksumMode, DO_NOT_VERIFY};
pub use classify::{classify, is_retryable_status};
pub use client::NimbusClient;
pub use config::{resolve_bucket_id, Config, DEFAULT_AUTH_URL};
pub use error::{AuthError, ClientError, Result, ServiceError};
pub use files::Files;
pub use large_files::{
    LargeFileUpload, LargeFiles, ProgressCallback, UploadProgress, UploadState,
};
pub use session::{Capabilities, Credentials, Session, SessionState};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
pub use types::*;
