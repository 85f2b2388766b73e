//! Format-sniffing transformer that stores uploads unchanged

use async_trait::async_trait;
use tangles_common::ImageMetadata;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use super::{TransformError, Transformer};
use crate::blobs::BlobReader;
use crate::context::Context;

/// Default cap on the size of an accepted upload (32 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 32 * 1024 * 1024;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff";

/// Image container formats recognised from their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
}

impl ImageFormat {
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(PNG_MAGIC) {
            Some(Self::Png)
        } else if data.starts_with(JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(Self::WebP)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Pixel dimensions, for formats that carry them in a fixed header
    pub fn dimensions(self, data: &[u8]) -> Option<(u32, u32)> {
        match self {
            Self::Png if data.len() >= 24 && &data[12..16] == b"IHDR" => Some((
                u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
                u32::from_be_bytes([data[20], data[21], data[22], data[23]]),
            )),
            Self::Gif if data.len() >= 10 => Some((
                u32::from(u16::from_le_bytes([data[6], data[7]])),
                u32::from(u16::from_le_bytes([data[8], data[9]])),
            )),
            _ => None,
        }
    }
}

/// Stores the upload as-is after checking it is an image we know about
#[derive(Debug, Clone)]
pub struct Passthrough {
    max_bytes: u64,
}

impl Passthrough {
    pub fn new() -> Self {
        Self::with_max_bytes(DEFAULT_MAX_BYTES)
    }

    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Default for Passthrough {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transformer for Passthrough {
    #[instrument(skip(self, ctx, reader), fields(max_bytes = self.max_bytes))]
    async fn process(
        &self,
        ctx: &Context,
        reader: BlobReader,
    ) -> Result<(ImageMetadata, Vec<u8>), TransformError> {
        let mut data = Vec::new();
        let mut limited = reader.take(self.max_bytes.saturating_add(1));
        ctx.run(limited.read_to_end(&mut data)).await??;

        if data.len() as u64 > self.max_bytes {
            return Err(TransformError::TooLarge {
                limit: self.max_bytes,
            });
        }
        if data.is_empty() {
            return Err(TransformError::Malformed("empty upload".to_string()));
        }

        let format = ImageFormat::sniff(&data).ok_or_else(|| {
            let head: String = data.iter().take(8).map(|b| format!("{b:02x}")).collect();
            TransformError::UnsupportedFormat(format!("unrecognised leading bytes {head}"))
        })?;

        let mut metadata = ImageMetadata::new(format.extension())?
            .with_mime_type(format.mime_type())
            .with_attribute("bytes", data.len());
        if let Some((width, height)) = format.dimensions(&data) {
            metadata = metadata.with_attribute("width", width).with_attribute("height", height);
        }

        debug!(format = ?format, bytes = data.len(), "Accepted upload");
        Ok((metadata, data))
    }
}
