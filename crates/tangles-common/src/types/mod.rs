//! Common types used across Tangles

use crate::error::{Result, TanglesError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Maximum length of an image extension, excluding the dot.
pub const MAX_EXTENSION_LEN: usize = 16;

/// Opaque identifier of a raw upload in the blob store.
///
/// Only ever used as a lookup key; the pipeline copies it into the processed
/// record as provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SourceRef(String);

impl SourceRef {
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(TanglesError::InvalidSourceRef(
                "source reference must not be empty".to_string(),
            ));
        }
        Ok(Self(source))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 content digest, always 64 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CRC-32C (Castagnoli) integrity checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Crc32c(u32);

impl Crc32c {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Crc32c {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Content-addressed storage key: `<content-digest>.<extension>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Depends only on the processed bytes (through the digest) and the
    /// extension, never on the source that produced them.
    pub fn new(digest: &ContentDigest, extension: &Extension) -> Self {
        Self(format!("{}.{}", digest, extension))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase alphanumeric file extension without the leading dot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Extension(String);

impl Extension {
    pub fn new(extension: &str) -> Result<Self> {
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        if extension.is_empty()
            || extension.len() > MAX_EXTENSION_LEN
            || !extension.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(TanglesError::InvalidExtension(format!(
                "'{}' must be 1-{} ASCII letters or digits",
                extension, MAX_EXTENSION_LEN
            )));
        }
        Ok(Self(extension.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive metadata produced by a transformer alongside the processed bytes.
///
/// This is the partial record: the content digest and provenance are only
/// attached by the ingestion pipeline when it builds a [`ProcessedImage`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    extension: Extension,

    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,

    /// Transformer-specific attributes (dimensions, byte length, ...)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, serde_json::Value>,
}

impl ImageMetadata {
    pub fn new(extension: &str) -> Result<Self> {
        Ok(Self {
            extension: Extension::new(extension)?,
            mime_type: None,
            attributes: BTreeMap::new(),
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn extension(&self) -> &Extension {
        &self.extension
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

/// A fully populated processed image record.
///
/// Built once by the pipeline from the transformer's metadata, the digest of
/// the processed bytes, and the originating source. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedImage {
    #[serde(flatten)]
    metadata: ImageMetadata,

    /// Digest of the processed bytes; storage key material
    sha256: ContentDigest,

    /// Source the processed bytes were produced from
    source: SourceRef,
}

impl ProcessedImage {
    pub fn new(metadata: ImageMetadata, sha256: ContentDigest, source: SourceRef) -> Self {
        Self {
            metadata,
            sha256,
            source,
        }
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    pub fn extension(&self) -> &Extension {
        self.metadata.extension()
    }

    pub fn sha256(&self) -> &ContentDigest {
        &self.sha256
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn storage_key(&self) -> StorageKey {
        StorageKey::new(&self.sha256, self.metadata.extension())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn digest_of(byte: u8) -> ContentDigest {
        ContentDigest::from_bytes([byte; 32])
    }

    #[test]
    fn test_source_ref_rejects_blank() {
        assert!(SourceRef::new("").is_err());
        assert!(SourceRef::new("   ").is_err());
        assert_eq!(SourceRef::new("abc123").unwrap().as_str(), "abc123");
    }

    #[test]
    fn test_content_digest_is_lowercase_hex() {
        let digest = ContentDigest::from_bytes([0xAB; 32]);
        assert_eq!(digest.as_str(), "ab".repeat(32));
    }

    #[test]
    fn test_extension_normalisation() {
        assert_eq!(Extension::new("PNG").unwrap().as_str(), "png");
        assert_eq!(Extension::new(".webp").unwrap().as_str(), "webp");
        assert!(Extension::new("").is_err());
        assert!(Extension::new("tar.gz").is_err());
        assert!(Extension::new("../png").is_err());
        assert!(Extension::new(&"a".repeat(MAX_EXTENSION_LEN + 1)).is_err());
    }

    #[test]
    fn test_storage_key_format() {
        let digest = digest_of(0xab);
        let key = StorageKey::new(&digest, &Extension::new("png").unwrap());
        assert_eq!(key.as_str(), format!("{}.png", "ab".repeat(32)));
    }

    #[test]
    fn test_storage_key_ignores_source() {
        let metadata = ImageMetadata::new("png").unwrap();
        let first = ProcessedImage::new(metadata.clone(), digest_of(1), SourceRef::new("abc123").unwrap());
        let second = ProcessedImage::new(metadata, digest_of(1), SourceRef::new("xyz789").unwrap());

        assert_eq!(first.storage_key(), second.storage_key());
        assert_ne!(first, second);
    }

    #[test]
    fn test_crc32c_rendering() {
        assert_eq!(Crc32c::new(0xE306_9283).to_string(), "e3069283");
        assert_eq!(Crc32c::new(7).to_string(), "00000007");
    }

    #[test]
    fn test_processed_image_serialization() {
        let metadata = ImageMetadata::new("png")
            .unwrap()
            .with_mime_type("image/png")
            .with_attribute("width", 4);
        let image = ProcessedImage::new(metadata, digest_of(0), SourceRef::new("abc123").unwrap());

        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["extension"], "png");
        assert_eq!(json["mime_type"], "image/png");
        assert_eq!(json["attributes"]["width"], 4);
        assert_eq!(json["sha256"], "00".repeat(32));
        assert_eq!(json["source"], "abc123");
    }
}
