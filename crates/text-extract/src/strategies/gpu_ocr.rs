//! Accelerator-aware OCR strategy.
//!
//! Resolves its device once, on the first extraction, creates the reader on
//! that device with a CPU fallback, and batches page units when running
//! accelerated.

use super::catalog::StrategyDescriptor;
use super::traits::{Strategy, StrategyContext, base_metadata, ensure_image_input, split_languages};
use crate::acceleration::{AcceleratorProbe, DeviceSelection, default_probes, select_device};
use crate::config::{DEFAULT_BATCH_SIZE, RuntimeSettings, StrategyConfig};
use crate::files::FileFormat;
use crate::ocr::{LazyReader, ReaderFactory, TesseractReaderFactory, read_units};
use crate::progress::{PROGRESS, progress_meta};
use crate::types::ExtractResult;
use crate::{ExtractError, Result};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Config key forcing acceleration on or off.
pub const USE_GPU_KEY: &str = "use_gpu";
/// Config key setting the accelerated batch size.
pub const BATCH_SIZE_KEY: &str = "batch_size";

struct GpuOcrState {
    reader: LazyReader,
    selection: Option<DeviceSelection>,
}

/// OCR strategy that uses an accelerator when one is available.
///
/// Device precedence: the `USE_GPU` environment variable, then the `use_gpu`
/// config key, then the accelerator probes. Batch size precedence: the
/// `batch_size` config key, then `GPU_BATCH_SIZE`, then 4.
///
/// Extractions on one instance run one at a time. The progress callback runs
/// without the state lock held, so it may call back into the strategy, but it
/// must not start another extraction on the same instance.
pub struct GpuOcrStrategy {
    context: StrategyContext,
    probes: Vec<Arc<dyn AcceleratorProbe>>,
    settings: Option<RuntimeSettings>,
    extraction: Mutex<()>,
    state: Mutex<GpuOcrState>,
}

impl GpuOcrStrategy {
    pub const NAME: &'static str = "gpu-ocr";
    pub const CLASS: &'static str = "text_extract::strategies::GpuOcrStrategy";

    /// Strategy using Tesseract and the default accelerator probes.
    pub fn new() -> Self {
        Self {
            context: StrategyContext::new(),
            probes: default_probes(),
            settings: None,
            extraction: Mutex::new(()),
            state: Mutex::new(GpuOcrState {
                reader: LazyReader::new(Arc::new(TesseractReaderFactory::new())),
                selection: None,
            }),
        }
    }

    pub fn with_reader_factory(mut self, factory: Arc<dyn ReaderFactory>) -> Self {
        self.state.get_mut().reader = LazyReader::new(factory);
        self
    }

    pub fn with_probes(mut self, probes: Vec<Arc<dyn AcceleratorProbe>>) -> Self {
        self.probes = probes;
        self
    }

    /// Use fixed settings instead of reading the environment on first use.
    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor::new(Self::CLASS, Self::NAME, Self::construct)
    }

    fn construct() -> Result<Arc<dyn Strategy>> {
        Ok(Arc::new(Self::new()))
    }

    /// The resolved device, or `None` before the first extraction.
    pub fn selection(&self) -> Option<DeviceSelection> {
        self.state.lock().selection
    }

    /// Whether extraction runs accelerated, once resolved.
    pub fn gpu_enabled(&self) -> Option<bool> {
        self.selection().map(|s| s.accelerated())
    }

    pub fn reader_initialized(&self) -> bool {
        self.state.lock().reader.is_initialized()
    }

    fn settings(&self) -> RuntimeSettings {
        self.settings.clone().unwrap_or_else(RuntimeSettings::from_env)
    }

    fn batch_size(config: &StrategyConfig, settings: &RuntimeSettings) -> usize {
        config
            .get_usize(BATCH_SIZE_KEY)
            .filter(|size| *size > 0)
            .or(settings.gpu_batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

impl Default for GpuOcrStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for GpuOcrStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "OCR with accelerator detection, CPU fallback and batched page processing"
    }

    fn context(&self) -> &StrategyContext {
        &self.context
    }

    fn cleanup(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.reader.is_initialized() {
            tracing::debug!("{}: releasing reader", Self::NAME);
        }
        state.reader.release();
        Ok(())
    }

    #[cfg_attr(feature = "otel", tracing::instrument(
        skip(self, file),
        fields(
            strategy.name = Self::NAME,
            file.mime_type = file.mime_type(),
        )
    ))]
    fn extract_text(&self, file: &dyn FileFormat, language: &str) -> Result<ExtractResult> {
        ensure_image_input(Self::NAME, file)?;

        let start = Instant::now();
        let images = file.convert_to_images()?;
        let languages = split_languages(language);
        let config = self.strategy_config();
        let settings = self.settings();
        let batch_size = Self::batch_size(&config, &settings);

        let _running = self.extraction.lock();

        let (resolved, lent) = {
            let mut guard = self.state.lock();
            let GpuOcrState { reader, selection } = &mut *guard;

            let mut resolved = match *selection {
                Some(resolved) => resolved,
                None => {
                    let resolved = select_device(settings.use_gpu, config.get_bool(USE_GPU_KEY), &self.probes);
                    tracing::info!(
                        "{}: using {} ({:?})",
                        Self::NAME,
                        resolved.device,
                        resolved.source
                    );
                    *selection = Some(resolved);
                    resolved
                }
            };

            let lent = if images.is_empty() {
                None
            } else {
                let mut accelerated = resolved.accelerated();
                let lent = reader.checkout(Self::NAME, &languages, &mut accelerated)?;
                if resolved.accelerated() && !accelerated {
                    resolved = resolved.cpu_fallback();
                    *selection = Some(resolved);
                }
                Some(lent)
            };

            (resolved, lent)
        };

        let accelerated = resolved.accelerated();

        let mut metadata = base_metadata(Self::NAME, language, images.len());
        metadata.insert("gpu_used".to_string(), json!(accelerated));
        metadata.insert("device".to_string(), json!(resolved.device.as_str()));
        metadata.insert(
            "batch_size".to_string(),
            json!(if accelerated { batch_size } else { 1 }),
        );

        let Some(mut lent) = lent else {
            metadata.insert("total_text_blocks".to_string(), json!(0));
            metadata.insert("processing_time".to_string(), processing_time(start));
            return Ok(ExtractResult::new("", metadata));
        };

        let batch = (accelerated && images.len() > 1).then_some(batch_size);

        tracing::debug!(
            "{}: processing {} page(s) on {}{}",
            Self::NAME,
            images.len(),
            resolved.device,
            batch.map(|b| format!(" in batches of {}", b)).unwrap_or_default()
        );

        // The state lock is free here, so the callback may query or clean up this strategy.
        let units = read_units(lent.reader(), &images, batch, |done, total| {
            self.update_state(
                PROGRESS,
                &progress_meta(format!("Processed {} of {} pages", done, total), done, total),
            );
        });
        self.state.lock().reader.restore(lent);

        if units.all_failed() {
            let first = units.failures.first().map(|f| f.error.as_str()).unwrap_or("unknown error");
            return Err(ExtractError::ocr(format!(
                "All {} pages failed OCR: {}",
                units.len(),
                first
            )));
        }

        metadata.insert("total_text_blocks".to_string(), json!(units.text_blocks()));
        metadata.insert("processing_time".to_string(), processing_time(start));

        if !units.failures.is_empty() {
            let failed: Vec<_> = units
                .failures
                .iter()
                .map(|f| json!({ "page": f.page, "error": f.error }))
                .collect();
            metadata.insert("failed_units".to_string(), json!(failed));
        }

        Ok(ExtractResult::new(units.joined_text(), metadata))
    }
}

/// Seconds since `start`, rounded to milliseconds.
fn processing_time(start: Instant) -> serde_json::Value {
    json!((start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0)
}

impl std::fmt::Debug for GpuOcrStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GpuOcrStrategy")
            .field("context", &self.context)
            .field("reader", &state.reader)
            .field("selection", &state.selection)
            .finish()
    }
}
