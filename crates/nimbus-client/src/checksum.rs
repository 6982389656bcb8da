//! Content checksums
//!
//! The service verifies every uploaded body against a lowercase hex SHA-1
//! digest sent alongside it.

use sha1::{Digest, Sha1};

/// Header value asking the service to skip verification
pub const DO_NOT_VERIFY: &str = "do_not_verify";

/// Compute the lowercase hex SHA-1 digest of a buffer
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// How an upload declares its content checksum
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChecksumMode {
    /// Compute the digest locally and let the service verify it
    #[default]
    Verify,
    /// Send the bytes without integrity verification
    Unverified,
}

impl ChecksumMode {
    /// Value of the checksum header for `data`
    pub fn header_value(self, data: &[u8]) -> String {
        match self {
            Self::Verify => sha1_hex(data),
            Self::Unverified => DO_NOT_VERIFY.to_string(),
        }
    }
}
