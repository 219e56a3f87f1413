//! MIME type detection for input files.
//!
//! Extension lookup first, then `mime_guess`, then content sniffing with `infer`.

use crate::{ExtractError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

pub const PDF_MIME_TYPE: &str = "application/pdf";
pub const OCTET_STREAM_MIME_TYPE: &str = "application/octet-stream";

static EXT_TO_MIME: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    m.insert("bmp", "image/bmp");
    m.insert("gif", "image/gif");
    m.insert("jpg", "image/jpeg");
    m.insert("jpeg", "image/jpeg");
    m.insert("png", "image/png");
    m.insert("tiff", "image/tiff");
    m.insert("tif", "image/tiff");
    m.insert("webp", "image/webp");
    m.insert("jp2", "image/jp2");
    m.insert("pnm", "image/x-portable-anymap");
    m.insert("pbm", "image/x-portable-bitmap");
    m.insert("pgm", "image/x-portable-graymap");
    m.insert("ppm", "image/x-portable-pixmap");

    m.insert("pdf", PDF_MIME_TYPE);
    m.insert("txt", "text/plain");
    m.insert("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document");

    m
});

/// Detect the MIME type of a file from its path.
///
/// Falls back to sniffing the file's leading bytes when the extension is
/// unknown.
pub fn detect_mime_type(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();

    let extension = path.extension().and_then(|ext| ext.to_str()).map(|s| s.to_lowercase());

    if let Some(ext) = &extension
        && let Some(mime_type) = EXT_TO_MIME.get(ext.as_str())
    {
        return Ok(mime_type.to_string());
    }

    if let Some(mime) = mime_guess::from_path(path).first() {
        return Ok(mime.to_string());
    }

    if path.is_file()
        && let Some(kind) = infer::get_from_path(path)?
    {
        return Ok(kind.mime_type().to_string());
    }

    Err(ExtractError::validation(format!(
        "Could not determine MIME type from file path: {}",
        path.display()
    )))
}

/// Detect the MIME type from content. Unknown content is `application/octet-stream`.
pub fn detect_mime_type_from_bytes(content: &[u8]) -> String {
    infer::get(content)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| OCTET_STREAM_MIME_TYPE.to_string())
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}
