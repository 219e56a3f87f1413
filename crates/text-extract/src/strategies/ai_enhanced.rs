//! OCR followed by model-based analysis of the recognized text.
//!
//! Backend problems never fail an extraction here: a missing analyzer model
//! leaves the text unscored, an OCR failure produces an empty text with the
//! error recorded under `ocr_error`.

use super::catalog::StrategyDescriptor;
use super::gpu_ocr::USE_GPU_KEY;
use super::traits::{Strategy, StrategyContext, base_metadata, ensure_image_input, split_languages};
use crate::acceleration::{AcceleratorProbe, CudaProbe, DeviceSelection, MetalProbe, select_device};
use crate::analysis::{AnalyzerLoader, QualityLoader, TextAnalyzer, enhance};
use crate::config::RuntimeSettings;
use crate::files::{FileFormat, ImageFile};
use crate::ocr::{LazyReader, LentReader, ReaderFactory, TesseractReaderFactory, UnitResults, read_units};
use crate::progress::{PROGRESS, progress_meta};
use crate::types::ExtractResult;
use crate::{ExtractError, Result};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

struct AiState {
    reader: LazyReader,
    selection: Option<DeviceSelection>,
    model: Option<Arc<dyn TextAnalyzer>>,
}

/// OCR plus text analysis on the best available device (CUDA, then Metal, then CPU).
///
/// Extractions on one instance run one at a time. Progress is reported without
/// the state lock held.
pub struct AiEnhancedStrategy {
    context: StrategyContext,
    probes: Vec<Arc<dyn AcceleratorProbe>>,
    settings: Option<RuntimeSettings>,
    loader: Option<Arc<dyn AnalyzerLoader>>,
    extraction: Mutex<()>,
    state: Mutex<AiState>,
}

impl AiEnhancedStrategy {
    pub const NAME: &'static str = "ai-enhanced";
    pub const CLASS: &'static str = "text_extract::strategies::AiEnhancedStrategy";

    pub fn new() -> Self {
        Self {
            context: StrategyContext::new(),
            probes: vec![Arc::new(CudaProbe), Arc::new(MetalProbe)],
            settings: None,
            loader: Some(Arc::new(QualityLoader)),
            extraction: Mutex::new(()),
            state: Mutex::new(AiState {
                reader: LazyReader::new(Arc::new(TesseractReaderFactory::new())),
                selection: None,
                model: None,
            }),
        }
    }

    pub fn with_analyzer_loader(mut self, loader: Arc<dyn AnalyzerLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Run without an analyzer model. Results carry the unanalyzed confidence.
    pub fn without_analyzer(mut self) -> Self {
        self.loader = None;
        self
    }

    pub fn with_reader_factory(mut self, factory: Arc<dyn ReaderFactory>) -> Self {
        self.state.get_mut().reader = LazyReader::new(factory);
        self
    }

    pub fn with_probes(mut self, probes: Vec<Arc<dyn AcceleratorProbe>>) -> Self {
        self.probes = probes;
        self
    }

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

    pub fn selection(&self) -> Option<DeviceSelection> {
        self.state.lock().selection
    }

    pub fn model_loaded(&self) -> bool {
        self.state.lock().model.is_some()
    }

    fn load_model(&self, slot: &mut Option<Arc<dyn TextAnalyzer>>, selection: DeviceSelection) {
        if slot.is_some() {
            return;
        }

        let Some(loader) = &self.loader else {
            return;
        };

        match loader.load(selection.device) {
            Ok(model) => {
                tracing::info!(
                    "{}: loaded {} analyzer on {}",
                    Self::NAME,
                    model.model_name(),
                    selection.device
                );
                *slot = Some(model);
            }
            Err(e) => {
                tracing::warn!("{}: could not load {} analyzer: {}", Self::NAME, loader.name(), e);
            }
        }
    }

    fn recognize(&self, lent: &mut LentReader, images: &[ImageFile]) -> Result<UnitResults> {
        let units = read_units(lent.reader(), images, None, |done, total| {
            self.update_state(
                PROGRESS,
                &progress_meta(format!("Recognized {} of {} pages", done, total), done, total),
            );
        });

        if units.all_failed() {
            let first = units.failures.first().map(|f| f.error.as_str()).unwrap_or("unknown error");
            return Err(ExtractError::ocr(format!(
                "All {} pages failed OCR: {}",
                units.len(),
                first
            )));
        }

        Ok(units)
    }
}

impl Default for AiEnhancedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for AiEnhancedStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "OCR with model-based confidence analysis"
    }

    fn context(&self) -> &StrategyContext {
        &self.context
    }

    fn cleanup(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.reader.release();
        state.model = None;
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
        let settings = self.settings.clone().unwrap_or_else(RuntimeSettings::from_env);

        let _running = self.extraction.lock();

        let mut guard = self.state.lock();
        let AiState {
            reader,
            selection,
            model,
        } = &mut *guard;

        let mut resolved = *selection.get_or_insert_with(|| {
            let resolved = select_device(settings.use_gpu, config.get_bool(USE_GPU_KEY), &self.probes);
            tracing::info!("{}: using {} ({:?})", Self::NAME, resolved.device, resolved.source);
            resolved
        });

        self.load_model(model, resolved);
        let analyzer = model.clone();

        let checkout = if images.is_empty() {
            None
        } else {
            let mut accelerated = resolved.accelerated();
            let checkout = reader.checkout(Self::NAME, &languages, &mut accelerated);
            if checkout.is_ok() && resolved.accelerated() && !accelerated {
                resolved = resolved.cpu_fallback();
                *selection = Some(resolved);
            }
            Some(checkout)
        };
        drop(guard);

        let mut metadata = base_metadata(Self::NAME, language, images.len());

        let recognized = checkout.map(|checkout| {
            checkout.and_then(|mut lent| {
                let units = self.recognize(&mut lent, &images);
                self.state.lock().reader.restore(lent);
                units
            })
        });

        let text = match recognized {
            None => String::new(),
            Some(Ok(units)) => {
                if !units.failures.is_empty() {
                    let failed: Vec<_> = units
                        .failures
                        .iter()
                        .map(|f| json!({ "page": f.page, "error": f.error }))
                        .collect();
                    metadata.insert("failed_units".to_string(), json!(failed));
                }
                units.joined_text()
            }
            Some(Err(e)) => {
                tracing::warn!("{}: text recognition failed: {}", Self::NAME, e);
                metadata.insert("ocr_error".to_string(), json!(e.to_string()));
                String::new()
            }
        };

        self.update_state(PROGRESS, &progress_meta("Analyzing text", images.len(), images.len()));

        let enhancement = enhance(analyzer.as_deref(), text, resolved.device);

        metadata.insert("processing_device".to_string(), json!(resolved.device.as_str()));
        metadata.insert("gpu_accelerated".to_string(), json!(resolved.accelerated()));
        metadata.insert("ai_enhanced".to_string(), json!(analyzer.is_some()));
        metadata.insert("confidence_score".to_string(), json!(enhancement.confidence));
        metadata.insert(
            "processing_time".to_string(),
            json!((start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0),
        );
        metadata.insert("analysis".to_string(), enhancement.analysis);

        Ok(ExtractResult::new(enhancement.text, metadata))
    }
}

impl std::fmt::Debug for AiEnhancedStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AiEnhancedStrategy")
            .field("context", &self.context)
            .field("reader", &state.reader)
            .field("selection", &state.selection)
            .field("model_loaded", &state.model.is_some())
            .finish()
    }
}
