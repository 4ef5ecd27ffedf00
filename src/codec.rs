//! Snapshot container format.
//!
//! ```text
//! | magic "BKSN" (4) | version u16 LE (2) | payload len u64 LE (8) | sha256 (32) | payload |
//! ```
//!
//! The payload is the database file exactly as it sits on disk, so a restore
//! reproduces the file byte-for-byte.

use std::{sync::Arc, time::Duration};

use sha2::{Digest, Sha256};

use crate::{database::Database, errors::CodecError};

const MAGIC: [u8; 4] = *b"BKSN";
pub const FORMAT_VERSION: u16 = 1;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = 4 + 2 + 8 + DIGEST_LEN;

/// Serializes the live database into snapshot blobs and checks blobs before use.
#[derive(Clone)]
pub struct SnapshotCodec {
    database: Arc<dyn Database>,
    lock_wait: Duration,
}

impl SnapshotCodec {
    pub fn new(database: Arc<dyn Database>, lock_wait: Duration) -> Self {
        Self {
            database,
            lock_wait,
        }
    }

    /// Captures a consistent point-in-time snapshot of the live database.
    pub async fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let payload = self.database.open_for_snapshot_read(self.lock_wait).await?;
        if payload.is_empty() {
            return Err(CodecError::Corrupt("database file is empty".into()));
        }
        Ok(wrap(&payload))
    }

    /// Structural check run before any destructive restore.
    pub fn validate(bytes: &[u8]) -> bool {
        Self::decode(bytes).is_ok()
    }

    /// Returns the database payload of a validated blob.
    pub fn decode(bytes: &[u8]) -> Result<&[u8], CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Corrupt("snapshot is empty".into()));
        }
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Corrupt(format!(
                "snapshot is truncated ({} bytes)",
                bytes.len()
            )));
        }
        if bytes[..4] != MAGIC {
            return Err(CodecError::Corrupt("missing snapshot header".into()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version == 0 || version > FORMAT_VERSION {
            return Err(CodecError::Corrupt(format!(
                "unsupported snapshot version {version}"
            )));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[6..14]);
        let declared = u64::from_le_bytes(len_bytes);
        let payload = &bytes[HEADER_LEN..];
        if declared != payload.len() as u64 || payload.is_empty() {
            return Err(CodecError::Corrupt(format!(
                "payload length {} does not match header ({declared})",
                payload.len()
            )));
        }
        let digest = Sha256::digest(payload);
        if digest.as_slice() != &bytes[14..HEADER_LEN] {
            return Err(CodecError::Corrupt("checksum mismatch".into()));
        }
        Ok(payload)
    }
}

fn wrap(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&Sha256::digest(payload));
    out.extend_from_slice(payload);
    out
}
