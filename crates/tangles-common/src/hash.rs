//! Content identity for processed images
//!
//! Two independent functions over the same payload:
//!
//! - a SHA-256 **content digest**, rendered as lowercase hex, used as storage key material
//! - a CRC-32C **integrity checksum** handed to the storage backend at write time
//!
//! The CRC lookup table is built once by [`ContentHasher::new`] and shared by
//! cloning the hasher; nothing here touches process-wide state.

use crate::types::{ContentDigest, Crc32c};
use crc::{Crc, CRC_32_ISCSI};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use thiserror::Error;

/// A write into the digest accumulator failed.
///
/// Unreachable for in-memory payloads; callers treat it as fatal and never retry.
#[derive(Error, Debug)]
#[error("Failed to accumulate content digest: {0}")]
pub struct HashError(#[from] io::Error);

/// Computes content digests and integrity checksums
#[derive(Clone)]
pub struct ContentHasher {
    castagnoli: Arc<Crc<u32>>,
}

impl ContentHasher {
    /// Build the hasher, including the Castagnoli lookup table.
    ///
    /// Construct once at startup and clone it into every component that needs it.
    pub fn new() -> Self {
        Self {
            castagnoli: Arc::new(Crc::<u32>::new(&CRC_32_ISCSI)),
        }
    }

    /// SHA-256 digest of an in-memory payload
    pub fn digest(&self, data: &[u8]) -> Result<ContentDigest, HashError> {
        let mut reader = data;
        self.digest_reader(&mut reader)
    }

    /// SHA-256 digest of everything readable from `reader`
    pub fn digest_reader<R: Read + ?Sized>(&self, reader: &mut R) -> Result<ContentDigest, HashError> {
        let mut hasher = Sha256::new();
        io::copy(reader, &mut hasher)?;
        Ok(ContentDigest::from_bytes(hasher.finalize().into()))
    }

    /// CRC-32C of an in-memory payload
    pub fn checksum(&self, data: &[u8]) -> Crc32c {
        Crc32c::new(self.castagnoli.checksum(data))
    }

    /// Start an incremental CRC-32C computation
    pub fn running_checksum(&self) -> RunningChecksum<'_> {
        RunningChecksum {
            digest: self.castagnoli.digest(),
        }
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher")
            .field("checksum", &"crc32c")
            .field("digest", &"sha256")
            .finish()
    }
}

/// Incremental CRC-32C over data that arrives in chunks
pub struct RunningChecksum<'a> {
    digest: crc::Digest<'a, u32>,
}

impl RunningChecksum<'_> {
    pub fn update(&mut self, chunk: &[u8]) {
        self.digest.update(chunk);
    }

    pub fn finish(self) -> Crc32c {
        Crc32c::new(self.digest.finalize())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_digest_known_vector() {
        let hasher = ContentHasher::new();
        let digest = hasher.digest(b"hello world").unwrap();
        assert_eq!(
            digest.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_digest_empty_payload() {
        let hasher = ContentHasher::new();
        let digest = hasher.digest(b"").unwrap();
        assert_eq!(
            digest.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_checksum_castagnoli_check_value() {
        // Standard check value for CRC-32C over "123456789"
        let hasher = ContentHasher::new();
        assert_eq!(hasher.checksum(b"123456789").value(), 0xE306_9283);
        assert_eq!(hasher.checksum(b"").value(), 0);
    }

    #[test]
    fn test_digest_read_failure_is_hash_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }

        let hasher = ContentHasher::new();
        let err = hasher.digest_reader(&mut Broken).unwrap_err();
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_cloned_hasher_agrees() {
        let hasher = ContentHasher::new();
        let cloned = hasher.clone();
        assert_eq!(hasher.checksum(b"tangles"), cloned.checksum(b"tangles"));
    }

    proptest! {
        #[test]
        fn prop_digest_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let hasher = ContentHasher::new();
            let first = hasher.digest(&data).unwrap();
            let second = hasher.digest(&data).unwrap();
            prop_assert_eq!(first.as_str().len(), 64);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_chunked_checksum_matches_whole(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            split in 0usize..4096,
        ) {
            let hasher = ContentHasher::new();
            let split = split.min(data.len());
            let mut running = hasher.running_checksum();
            running.update(&data[..split]);
            running.update(&data[split..]);
            prop_assert_eq!(running.finish(), hasher.checksum(&data));
        }
    }
}
