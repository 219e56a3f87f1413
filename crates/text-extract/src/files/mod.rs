//! Input files as seen by extraction strategies.
//!
//! Strategies only operate on images. A [`FileFormat`] says whether it already
//! is one, or whether it can be turned into a sequence of page images. Actual
//! format conversion (PDF rasterization and the like) lives outside this crate;
//! implementors of [`FileFormat`] bring it with them.

pub mod mime;

use crate::{ExtractError, Result};
use std::path::Path;
use std::sync::Arc;

pub use mime::{detect_mime_type, detect_mime_type_from_bytes, is_image_mime};

/// Capability interface for a file handed to a strategy.
pub trait FileFormat: Send + Sync {
    /// Media type of the file, e.g. `image/png`.
    fn mime_type(&self) -> &str;

    fn is_image(&self) -> bool {
        is_image_mime(self.mime_type())
    }

    fn can_convert_to_images(&self) -> bool;

    /// Produce one image per page, in order.
    fn convert_to_images(&self) -> Result<Vec<ImageFile>>;

    /// Whether a strategy can process this file at all.
    fn is_image_representable(&self) -> bool {
        self.is_image() || self.can_convert_to_images()
    }
}

/// A single in-memory image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: Option<String>,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageFile {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            name: None,
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Build from raw bytes, sniffing the media type.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = detect_mime_type_from_bytes(&data);
        Self::new(data, mime_type)
    }
}

impl FileFormat for ImageFile {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn can_convert_to_images(&self) -> bool {
        self.is_image()
    }

    fn convert_to_images(&self) -> Result<Vec<ImageFile>> {
        if self.is_image() {
            Ok(vec![self.clone()])
        } else {
            Err(ExtractError::validation(format!(
                "Cannot convert {} to images",
                self.mime_type
            )))
        }
    }
}

/// Pages that have already been split into images, such as a scanned
/// multi-page document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSequence {
    pub pages: Vec<ImageFile>,
}

pub const IMAGE_SEQUENCE_MIME_TYPE: &str = "application/x-image-sequence";

impl ImageSequence {
    pub fn new(pages: Vec<ImageFile>) -> Self {
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl FileFormat for ImageSequence {
    fn mime_type(&self) -> &str {
        IMAGE_SEQUENCE_MIME_TYPE
    }

    fn can_convert_to_images(&self) -> bool {
        true
    }

    fn convert_to_images(&self) -> Result<Vec<ImageFile>> {
        Ok(self.pages.clone())
    }
}

/// A file with no image representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFile {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl BinaryFile {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}

impl FileFormat for BinaryFile {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn can_convert_to_images(&self) -> bool {
        false
    }

    fn convert_to_images(&self) -> Result<Vec<ImageFile>> {
        Err(ExtractError::validation(format!(
            "Cannot convert {} to images",
            self.mime_type
        )))
    }
}

/// Load a file from disk.
///
/// Images become an [`ImageFile`]; everything else a [`BinaryFile`].
pub fn load_file(path: impl AsRef<Path>) -> Result<Arc<dyn FileFormat>> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let mime_type = detect_mime_type(path).unwrap_or_else(|_| detect_mime_type_from_bytes(&data));

    tracing::debug!("Loaded {} ({} bytes, {})", path.display(), data.len(), mime_type);

    if is_image_mime(&mime_type) {
        let mut image = ImageFile::new(data, mime_type);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            image = image.with_name(name);
        }
        Ok(Arc::new(image))
    } else {
        Ok(Arc::new(BinaryFile::new(data, mime_type)))
    }
}

/// Load several image files as one page sequence, in the given order.
pub fn load_pages<P: AsRef<Path>>(paths: &[P]) -> Result<ImageSequence> {
    let mut pages = Vec::with_capacity(paths.len());

    for path in paths {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let mime_type = detect_mime_type(path).unwrap_or_else(|_| detect_mime_type_from_bytes(&data));

        if !is_image_mime(&mime_type) {
            return Err(ExtractError::validation(format!(
                "{} is not an image ({})",
                path.display(),
                mime_type
            )));
        }

        let mut image = ImageFile::new(data, mime_type);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            image = image.with_name(name);
        }
        pages.push(image);
    }

    Ok(ImageSequence::new(pages))
}
