//! Tesseract CLI reader.
//!
//! Runs the `tesseract` binary on a temporary copy of each image. Tesseract has
//! no accelerated mode, so asking for one fails and strategies fall back to CPU.

use super::{ReaderFactory, TextReader};
use crate::files::ImageFile;
use crate::{ExtractError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

static LANGUAGE_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("en", "eng");
    m.insert("de", "deu");
    m.insert("fr", "fra");
    m.insert("es", "spa");
    m.insert("it", "ita");
    m.insert("pt", "por");
    m.insert("nl", "nld");
    m.insert("pl", "pol");
    m.insert("ru", "rus");
    m.insert("uk", "ukr");
    m.insert("tr", "tur");
    m.insert("ar", "ara");
    m.insert("he", "heb");
    m.insert("hi", "hin");
    m.insert("ja", "jpn");
    m.insert("ko", "kor");
    m.insert("zh", "chi_sim");
    m.insert("ch_sim", "chi_sim");
    m.insert("ch_tra", "chi_tra");
    m
});

/// Map a language code to Tesseract's. Unknown codes pass through.
pub fn to_tesseract_language(code: &str) -> String {
    let code = code.trim().to_lowercase();
    LANGUAGE_CODES
        .get(code.as_str())
        .map(|c| c.to_string())
        .unwrap_or(code)
}

/// Language argument for `tesseract -l`, e.g. `eng+deu`.
pub fn tesseract_languages(languages: &[String]) -> String {
    languages
        .iter()
        .map(|code| to_tesseract_language(code))
        .collect::<Vec<_>>()
        .join("+")
}

/// Creates [`TesseractReader`]s. The binary is located when a reader is created.
#[derive(Debug, Clone, Default)]
pub struct TesseractReaderFactory {
    binary: Option<PathBuf>,
}

impl TesseractReaderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `tesseract` binary instead of searching `PATH`.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    fn locate_binary(&self) -> Result<PathBuf> {
        if let Some(binary) = &self.binary {
            return Ok(binary.clone());
        }

        which::which("tesseract").map_err(|e| {
            ExtractError::ocr_with_source("tesseract not found (install tesseract-ocr)", e)
        })
    }
}

impl ReaderFactory for TesseractReaderFactory {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn create_reader(&self, languages: &[String], accelerated: bool) -> Result<Box<dyn TextReader>> {
        if accelerated {
            return Err(ExtractError::ocr("tesseract has no accelerated mode"));
        }

        let binary = self.locate_binary()?;
        let language = tesseract_languages(languages);

        Ok(Box::new(TesseractReader { binary, language }))
    }
}

/// A Tesseract invocation bound to a language set.
#[derive(Debug, Clone)]
pub struct TesseractReader {
    binary: PathBuf,
    language: String,
}

impl TesseractReader {
    pub fn language(&self) -> &str {
        &self.language
    }
}

impl TextReader for TesseractReader {
    fn read_text(&mut self, image: &ImageFile) -> Result<Vec<String>> {
        let extension = mime_guess::get_mime_extensions_str(&image.mime_type)
            .and_then(|exts| exts.first())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_else(|| ".img".to_string());

        let mut input = tempfile::Builder::new().suffix(&extension).tempfile()?;
        input.write_all(&image.data)?;
        input.flush()?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .args(["-l", &self.language])
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::ocr(format!("tesseract failed: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_mapping() {
        assert_eq!(to_tesseract_language("en"), "eng");
        assert_eq!(to_tesseract_language(" DE "), "deu");
        assert_eq!(to_tesseract_language("ch_sim"), "chi_sim");
        assert_eq!(to_tesseract_language("eng"), "eng");
    }

    #[test]
    fn test_accelerated_mode_refused() {
        let factory = TesseractReaderFactory::with_binary("/usr/bin/tesseract");
        let err = factory.create_reader(&["en".to_string()], true).err().unwrap();
        assert!(matches!(err, ExtractError::Ocr { .. }));
    }

    #[test]
    fn test_languages_joined_for_cli() {
        assert_eq!(tesseract_languages(&["en".to_string(), "de".to_string()]), "eng+deu");
        assert_eq!(tesseract_languages(&["fr".to_string()]), "fra");
    }

    #[test]
    fn test_missing_binary_surfaces_io_error() {
        let factory = TesseractReaderFactory::with_binary("/nonexistent/tesseract");
        let mut reader = factory.create_reader(&["en".to_string()], false).unwrap();
        let err = reader
            .read_text(&ImageFile::new(vec![0x89, 0x50, 0x4E, 0x47], "image/png"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }
}
