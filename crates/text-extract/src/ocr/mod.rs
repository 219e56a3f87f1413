//! OCR reader plumbing shared by the strategies.
//!
//! The OCR engine itself is opaque: a [`ReaderFactory`] creates a
//! [`TextReader`] for a language set, optionally on an accelerator. This module
//! owns the parts with behavior of their own:
//!
//! - [`LazyReader`] creates the reader on first use, falls back to CPU when the
//!   accelerated attempt fails and recreates it when the languages change. A
//!   strategy checks the reader out for the length of one extraction so its
//!   own lock is free while progress is reported.
//! - [`read_units`] runs a reader over page images one at a time or in
//!   fixed-size batches, isolating per-unit failures.

pub mod tesseract;

use crate::files::ImageFile;
use crate::{ExtractError, Result};
use std::sync::Arc;

pub use tesseract::{TesseractReader, TesseractReaderFactory};

/// Separator placed between the text of consecutive page units.
pub const PAGE_SEPARATOR: &str = "\n\n--- PAGE BREAK ---\n\n";

/// An initialized OCR engine.
pub trait TextReader: Send {
    /// Recognize one image, returning its text blocks in reading order.
    fn read_text(&mut self, image: &ImageFile) -> Result<Vec<String>>;

    /// Recognize several images in one engine call.
    ///
    /// Returns exactly one entry per input image. Engines without native
    /// batching keep the default, which reads the images one by one.
    fn read_batch(&mut self, images: &[ImageFile]) -> Vec<Result<Vec<String>>> {
        images.iter().map(|image| self.read_text(image)).collect()
    }
}

/// Creates [`TextReader`]s.
pub trait ReaderFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Create a reader for `languages`, on an accelerator when `accelerated` is set.
    fn create_reader(&self, languages: &[String], accelerated: bool) -> Result<Box<dyn TextReader>>;

    /// Free accelerator memory after a reader has been dropped.
    fn release_accelerator_memory(&self) {}
}

/// A reader slot that is filled on first use.
pub struct LazyReader {
    factory: Arc<dyn ReaderFactory>,
    reader: Option<Box<dyn TextReader>>,
    languages: Vec<String>,
    accelerated: bool,
    lent: bool,
}

/// A reader moved out of its [`LazyReader`] by [`LazyReader::checkout`].
pub struct LentReader {
    reader: Box<dyn TextReader>,
    accelerated: bool,
}

impl LentReader {
    pub fn reader(&mut self) -> &mut dyn TextReader {
        self.reader.as_mut()
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerated
    }
}

impl LazyReader {
    pub fn new(factory: Arc<dyn ReaderFactory>) -> Self {
        Self {
            factory,
            reader: None,
            languages: Vec::new(),
            accelerated: false,
            lent: false,
        }
    }

    pub fn factory(&self) -> &Arc<dyn ReaderFactory> {
        &self.factory
    }

    /// Whether a reader exists, including one that is checked out.
    pub fn is_initialized(&self) -> bool {
        self.reader.is_some() || self.lent
    }

    /// Whether the current reader runs on an accelerator.
    pub fn is_accelerated(&self) -> bool {
        self.is_initialized() && self.accelerated
    }

    /// Return the reader for `languages`, creating it if needed.
    ///
    /// When `accelerated` is set the accelerated attempt comes first; if it
    /// fails, the reader is created on CPU and `accelerated` is cleared. Only a
    /// failure of the CPU attempt is returned. A failed attempt leaves the slot
    /// empty so the next call tries again.
    pub fn get_or_init(
        &mut self,
        strategy: &str,
        languages: &[String],
        accelerated: &mut bool,
    ) -> Result<&mut Box<dyn TextReader>> {
        if self.reader.is_some() && self.languages != languages {
            tracing::debug!(
                "{}: languages changed from {:?} to {:?}, recreating reader",
                strategy,
                self.languages,
                languages
            );
            self.release();
        }

        if self.reader.is_none() {
            let reader = if *accelerated {
                match self.factory.create_reader(languages, true) {
                    Ok(reader) => reader,
                    Err(e) => {
                        tracing::warn!(
                            "{}: accelerated {} reader failed ({}), falling back to CPU",
                            strategy,
                            self.factory.name(),
                            e
                        );
                        *accelerated = false;
                        self.create_cpu_reader(strategy, languages)?
                    }
                }
            } else {
                self.create_cpu_reader(strategy, languages)?
            };

            tracing::info!(
                "{}: {} reader ready (languages: {}, accelerated: {})",
                strategy,
                self.factory.name(),
                languages.join(","),
                *accelerated
            );

            self.reader = Some(reader);
            self.languages = languages.to_vec();
            self.accelerated = *accelerated;
            self.lent = false;
        }

        match self.reader.as_mut() {
            Some(reader) => Ok(reader),
            None => Err(ExtractError::backend_initialization(strategy, "reader unavailable")),
        }
    }

    /// Like [`get_or_init`](Self::get_or_init), but moves the reader out of the
    /// slot. The slot still counts as initialized until the reader comes back
    /// through [`restore`](Self::restore).
    pub fn checkout(&mut self, strategy: &str, languages: &[String], accelerated: &mut bool) -> Result<LentReader> {
        self.get_or_init(strategy, languages, accelerated)?;

        match self.reader.take() {
            Some(reader) => {
                self.lent = true;
                Ok(LentReader {
                    reader,
                    accelerated: self.accelerated,
                })
            }
            None => Err(ExtractError::backend_initialization(strategy, "reader unavailable")),
        }
    }

    /// Put back a reader taken with [`checkout`](Self::checkout).
    ///
    /// If the slot was released while the reader was out, the reader is
    /// dropped here and its accelerator memory freed.
    pub fn restore(&mut self, lent: LentReader) {
        if self.lent && self.reader.is_none() {
            self.lent = false;
            self.reader = Some(lent.reader);
            return;
        }

        drop(lent.reader);
        if lent.accelerated {
            self.factory.release_accelerator_memory();
        }
    }

    /// Drop the reader and free accelerator memory it held.
    ///
    /// A checked-out reader is dropped when it is restored.
    pub fn release(&mut self) {
        if self.reader.take().is_some() && self.accelerated {
            self.factory.release_accelerator_memory();
        }
        self.lent = false;
        self.accelerated = false;
        self.languages.clear();
    }

    fn create_cpu_reader(&self, strategy: &str, languages: &[String]) -> Result<Box<dyn TextReader>> {
        self.factory.create_reader(languages, false).map_err(|e| {
            ExtractError::backend_initialization_with_source(
                strategy,
                format!("could not create {} reader", self.factory.name()),
                e,
            )
        })
    }
}

impl std::fmt::Debug for LazyReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyReader")
            .field("factory", &self.factory.name())
            .field("initialized", &self.reader.is_some())
            .field("languages", &self.languages)
            .field("accelerated", &self.accelerated)
            .field("lent", &self.lent)
            .finish()
    }
}

/// A page unit the reader could not process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// 1-based page number.
    pub page: usize,
    pub error: String,
}

/// Per-unit output of [`read_units`], in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitResults {
    /// Text blocks per unit. Failed units hold no blocks.
    pub blocks: Vec<Vec<String>>,
    pub failures: Vec<UnitFailure>,
}

impl UnitResults {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn text_blocks(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    /// Text of each unit, blocks joined by newlines.
    pub fn page_texts(&self) -> Vec<String> {
        self.blocks.iter().map(|blocks| blocks.join("\n")).collect()
    }

    /// All units joined with [`PAGE_SEPARATOR`]. Empty units keep their slot.
    pub fn joined_text(&self) -> String {
        self.page_texts().join(PAGE_SEPARATOR)
    }

    pub fn all_failed(&self) -> bool {
        !self.blocks.is_empty() && self.failures.len() == self.blocks.len()
    }
}

/// Run `reader` over `images`.
///
/// With `batch_size` set and more than one image, images go to the engine in
/// chunks of that size; otherwise one at a time. A failing unit is recorded as
/// empty and the remaining units are still processed. `on_progress` receives
/// `(done, total)` after each engine call.
pub fn read_units<F>(
    reader: &mut dyn TextReader,
    images: &[ImageFile],
    batch_size: Option<usize>,
    mut on_progress: F,
) -> UnitResults
where
    F: FnMut(usize, usize),
{
    let total = images.len();
    let mut results = UnitResults {
        blocks: Vec::with_capacity(total),
        failures: Vec::new(),
    };

    match batch_size.filter(|size| *size > 0 && total > 1) {
        Some(size) => {
            for chunk in images.chunks(size) {
                let mut outputs = reader.read_batch(chunk).into_iter();
                for _ in chunk {
                    let output = outputs
                        .next()
                        .unwrap_or_else(|| Err(ExtractError::ocr("engine returned fewer results than images")));
                    record_unit(&mut results, output);
                }
                on_progress(results.len(), total);
            }
        }
        None => {
            for image in images {
                let output = reader.read_text(image);
                record_unit(&mut results, output);
                on_progress(results.len(), total);
            }
        }
    }

    results
}

fn record_unit(results: &mut UnitResults, output: Result<Vec<String>>) {
    let page = results.blocks.len() + 1;
    match output {
        Ok(blocks) => results.blocks.push(blocks),
        Err(e) => {
            tracing::warn!("OCR failed on page {}: {}", page, e);
            results.failures.push(UnitFailure {
                page,
                error: e.to_string(),
            });
            results.blocks.push(Vec::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Calls {
        single: usize,
        batches: Vec<usize>,
        created: Vec<bool>,
        released: usize,
    }

    struct ScriptedReader {
        calls: Arc<Mutex<Calls>>,
        fail_on: Option<u8>,
    }

    impl TextReader for ScriptedReader {
        fn read_text(&mut self, image: &ImageFile) -> Result<Vec<String>> {
            self.calls.lock().single += 1;
            read(image, self.fail_on)
        }

        fn read_batch(&mut self, images: &[ImageFile]) -> Vec<Result<Vec<String>>> {
            self.calls.lock().batches.push(images.len());
            images.iter().map(|image| read(image, self.fail_on)).collect()
        }
    }

    fn read(image: &ImageFile, fail_on: Option<u8>) -> Result<Vec<String>> {
        let id = image.data[0];
        if Some(id) == fail_on {
            Err(ExtractError::ocr(format!("bad page {id}")))
        } else {
            Ok(vec![format!("page {id}")])
        }
    }

    struct ScriptedFactory {
        calls: Arc<Mutex<Calls>>,
        accelerated_works: bool,
        cpu_works: bool,
    }

    impl ReaderFactory for ScriptedFactory {
        fn name(&self) -> &str {
            "scripted"
        }

        fn create_reader(&self, _languages: &[String], accelerated: bool) -> Result<Box<dyn TextReader>> {
            self.calls.lock().created.push(accelerated);
            let works = if accelerated { self.accelerated_works } else { self.cpu_works };
            if !works {
                return Err(ExtractError::ocr("cannot create reader"));
            }
            Ok(Box::new(ScriptedReader {
                calls: Arc::clone(&self.calls),
                fail_on: None,
            }))
        }

        fn release_accelerator_memory(&self) {
            self.calls.lock().released += 1;
        }
    }

    fn images(count: u8) -> Vec<ImageFile> {
        (1..=count).map(|i| ImageFile::new(vec![i], "image/png")).collect()
    }

    fn factory(accelerated_works: bool, cpu_works: bool) -> (Arc<Mutex<Calls>>, Arc<dyn ReaderFactory>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let factory: Arc<dyn ReaderFactory> = Arc::new(ScriptedFactory {
            calls: Arc::clone(&calls),
            accelerated_works,
            cpu_works,
        });
        (calls, factory)
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_lazy_reader_created_once() {
        let (calls, factory) = factory(true, true);
        let mut lazy = LazyReader::new(factory);
        let mut accelerated = true;

        lazy.get_or_init("test", &langs(&["en"]), &mut accelerated).unwrap();
        lazy.get_or_init("test", &langs(&["en"]), &mut accelerated).unwrap();

        assert!(accelerated);
        assert!(lazy.is_accelerated());
        assert_eq!(calls.lock().created, vec![true]);
    }

    #[test]
    fn test_lazy_reader_falls_back_to_cpu() {
        let (calls, factory) = factory(false, true);
        let mut lazy = LazyReader::new(factory);
        let mut accelerated = true;

        lazy.get_or_init("test", &langs(&["en"]), &mut accelerated).unwrap();

        assert!(!accelerated);
        assert!(!lazy.is_accelerated());
        assert_eq!(calls.lock().created, vec![true, false]);
    }

    #[test]
    fn test_lazy_reader_cpu_failure_surfaces_and_retries_later() {
        let (calls, factory) = factory(false, false);
        let mut lazy = LazyReader::new(factory);
        let mut accelerated = false;

        let err = lazy.get_or_init("test", &langs(&["en"]), &mut accelerated).err().unwrap();
        assert!(matches!(err, ExtractError::BackendInitialization { .. }));
        assert!(!lazy.is_initialized());

        let _ = lazy.get_or_init("test", &langs(&["en"]), &mut accelerated);
        assert_eq!(calls.lock().created, vec![false, false]);
    }

    #[test]
    fn test_lazy_reader_recreated_on_language_change() {
        let (calls, factory) = factory(true, true);
        let mut lazy = LazyReader::new(factory);
        let mut accelerated = true;

        lazy.get_or_init("test", &langs(&["en"]), &mut accelerated).unwrap();
        lazy.get_or_init("test", &langs(&["en", "de"]), &mut accelerated).unwrap();

        let calls = calls.lock();
        assert_eq!(calls.created, vec![true, true]);
        assert_eq!(calls.released, 1);
    }

    #[test]
    fn test_release_frees_accelerator_memory() {
        let (calls, factory) = factory(true, true);
        let mut lazy = LazyReader::new(factory);
        let mut accelerated = true;

        lazy.get_or_init("test", &langs(&["en"]), &mut accelerated).unwrap();
        lazy.release();
        lazy.release();

        assert!(!lazy.is_initialized());
        assert_eq!(calls.lock().released, 1);
    }

    #[test]
    fn test_checkout_and_restore_keep_reader() {
        let (calls, factory) = factory(true, true);
        let mut lazy = LazyReader::new(factory);
        let mut accelerated = true;

        let mut lent = lazy.checkout("test", &langs(&["en"]), &mut accelerated).unwrap();
        assert!(lazy.is_initialized());
        assert!(lazy.is_accelerated());
        assert!(lent.is_accelerated());
        assert_eq!(lent.reader().read_text(&images(1)[0]).unwrap(), vec!["page 1"]);

        lazy.restore(lent);
        let lent = lazy.checkout("test", &langs(&["en"]), &mut accelerated).unwrap();
        lazy.restore(lent);

        let calls = calls.lock();
        assert_eq!(calls.created, vec![true]);
        assert_eq!(calls.released, 0);
    }

    #[test]
    fn test_release_while_checked_out_drops_reader_on_restore() {
        let (calls, factory) = factory(true, true);
        let mut lazy = LazyReader::new(factory);
        let mut accelerated = true;

        let lent = lazy.checkout("test", &langs(&["en"]), &mut accelerated).unwrap();
        lazy.release();
        assert!(!lazy.is_initialized());
        assert_eq!(calls.lock().released, 0);

        lazy.restore(lent);
        assert!(!lazy.is_initialized());
        assert_eq!(calls.lock().released, 1);

        lazy.get_or_init("test", &langs(&["en"]), &mut accelerated).unwrap();
        assert_eq!(calls.lock().created, vec![true, true]);
    }

    #[test]
    fn test_read_units_batches() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut reader = ScriptedReader {
            calls: Arc::clone(&calls),
            fail_on: None,
        };
        let mut progress = Vec::new();

        let results = read_units(&mut reader, &images(5), Some(4), |done, total| progress.push((done, total)));

        assert_eq!(results.len(), 5);
        assert_eq!(calls.lock().batches, vec![4, 1]);
        assert_eq!(progress, vec![(4, 5), (5, 5)]);
        assert_eq!(results.joined_text().matches(PAGE_SEPARATOR).count(), 4);
    }

    #[test]
    fn test_read_units_single_image_not_batched() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut reader = ScriptedReader {
            calls: Arc::clone(&calls),
            fail_on: None,
        };

        let results = read_units(&mut reader, &images(1), Some(4), |_, _| {});

        assert_eq!(results.len(), 1);
        assert!(calls.lock().batches.is_empty());
        assert_eq!(calls.lock().single, 1);
    }

    #[test]
    fn test_read_units_isolates_failures() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut reader = ScriptedReader {
            calls: Arc::clone(&calls),
            fail_on: Some(3),
        };

        let results = read_units(&mut reader, &images(5), None, |_, _| {});

        assert_eq!(results.len(), 5);
        assert_eq!(results.failures.len(), 1);
        assert_eq!(results.failures[0].page, 3);
        assert_eq!(results.text_blocks(), 4);
        assert!(!results.all_failed());

        let segments: Vec<String> = results
            .joined_text()
            .split(PAGE_SEPARATOR)
            .map(str::to_string)
            .collect();
        assert_eq!(segments, vec!["page 1", "page 2", "", "page 4", "page 5"]);
    }

    #[test]
    fn test_short_batch_output_marks_missing_units_failed() {
        struct ShortReader;

        impl TextReader for ShortReader {
            fn read_text(&mut self, _image: &ImageFile) -> Result<Vec<String>> {
                Ok(vec!["x".to_string()])
            }

            fn read_batch(&mut self, _images: &[ImageFile]) -> Vec<Result<Vec<String>>> {
                vec![Ok(vec!["x".to_string()])]
            }
        }

        let results = read_units(&mut ShortReader, &images(3), Some(3), |_, _| {});
        assert_eq!(results.len(), 3);
        assert_eq!(results.failures.len(), 2);
    }

    #[test]
    fn test_all_failed() {
        let results = UnitResults {
            blocks: vec![Vec::new(), Vec::new()],
            failures: vec![
                UnitFailure {
                    page: 1,
                    error: "x".to_string(),
                },
                UnitFailure {
                    page: 2,
                    error: "y".to_string(),
                },
            ],
        };
        assert!(results.all_failed());
        assert!(!UnitResults::default().all_failed());
    }
}
