//! Core value types: the captured photo, its OCR text, and parsed dishes.

use crate::error::MenuError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A captured or uploaded photo of a menu.
///
/// Cheap to clone: the bytes live behind an `Arc` so the orchestrator can
/// hand the same image to a spawned run without copying it.
#[derive(Clone, PartialEq, Eq)]
pub struct MenuImage {
    bytes: Arc<[u8]>,
    media_type: String,
}

impl MenuImage {
    /// Wrap raw bytes with their declared media type (e.g. `"image/jpeg"`).
    ///
    /// No validation happens here; [`MenuImage::validate`] is called by the
    /// extractor so that a camera frame with a bogus type still reaches the
    /// pipeline and fails there with `InvalidInput`.
    pub fn new(bytes: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            media_type: media_type.into(),
        }
    }

    /// Read a file from disk, sniffing its media type from the magic bytes.
    ///
    /// Files whose format cannot be recognised are tagged
    /// `application/octet-stream` so that validation rejects them.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, MenuError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MenuError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                MenuError::Extraction {
                    detail: format!("cannot read '{}': {}", path.display(), e),
                }
            }
        })?;
        let media_type = sniff_media_type(&bytes);
        Ok(Self::new(bytes, media_type))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Whether the declared media type is an `image/*` type.
    pub fn is_image(&self) -> bool {
        match self.media_type.split_once('/') {
            Some((top, sub)) => top.trim().eq_ignore_ascii_case("image") && !sub.trim().is_empty(),
            None => false,
        }
    }

    /// Reject inputs that do not declare an image media type.
    pub fn validate(&self) -> Result<(), MenuError> {
        if self.is_image() {
            Ok(())
        } else {
            Err(MenuError::InvalidInput {
                media_type: self.media_type.clone(),
            })
        }
    }

    /// File extension matching the media type, used for temp files.
    pub fn extension(&self) -> &'static str {
        image::ImageFormat::from_mime_type(&self.media_type)
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("png")
    }
}

impl fmt::Debug for MenuImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuImage")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Guess a media type from magic bytes.
pub fn sniff_media_type(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

/// OCR output for one [`MenuImage`]. Empty text is a valid value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedText(String);

impl ExtractedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the text holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recommended dish: a non-empty name and a short description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl DishRecord {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}
