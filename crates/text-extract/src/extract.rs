//! One-call extraction through the registry.
//!
//! [`extract_with_strategy`] looks up a strategy, applies the per-call config
//! and callback, runs the extraction and reports a terminal `SUCCESS` or
//! `FAILURE` state through the callback.

use crate::config::StrategyConfig;
use crate::files::FileFormat;
use crate::progress::{FAILURE, SUCCESS, StateCallback};
use crate::strategies::{DEFAULT_LANGUAGE, StrategyRegistry};
use crate::types::{ExtractResult, Metadata};
use crate::Result;
use serde_json::json;

/// Per-call options for [`extract_with_strategy`].
#[derive(Clone)]
pub struct ExtractOptions {
    /// Comma-separated language codes.
    pub language: String,
    /// Replaces the strategy's config when set.
    pub config: Option<StrategyConfig>,
    /// Installed as the strategy's state callback when set.
    pub callback: Option<StateCallback>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            config: None,
            callback: None,
        }
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_config(mut self, config: StrategyConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_callback(mut self, callback: StateCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl std::fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("language", &self.language)
            .field("config", &self.config)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Look up `strategy_name`, configure it and extract text from `file`.
///
/// A callback in `options` replaces any callback already installed on the
/// strategy; without one the strategy's current callback is kept.
///
/// # Errors
///
/// Lookup errors (`UnknownStrategy`, `Config`) and extraction errors are
/// returned unchanged. Extraction errors are also reported as `FAILURE`.
pub fn extract_with_strategy(
    registry: &StrategyRegistry,
    strategy_name: &str,
    file: &dyn FileFormat,
    options: &ExtractOptions,
) -> Result<ExtractResult> {
    let strategy = registry.get_strategy(strategy_name)?;

    if let Some(config) = &options.config {
        strategy.set_strategy_config(config.clone());
    }

    if let Some(callback) = &options.callback {
        strategy.set_update_state_callback(Some(callback.clone()));
    }

    tracing::debug!(
        "Extracting {} with '{}' (language: {})",
        file.mime_type(),
        strategy.name(),
        options.language
    );

    match strategy.extract_text(file, &options.language) {
        Ok(result) => {
            let mut meta = Metadata::new();
            meta.insert("strategy".to_string(), json!(strategy.name()));
            meta.insert("pages_processed".to_string(), json!(result.pages_processed()));
            strategy.update_state(SUCCESS, &meta);
            Ok(result)
        }
        Err(e) => {
            tracing::warn!("Extraction with '{}' failed: {}", strategy.name(), e);
            let mut meta = Metadata::new();
            meta.insert("strategy".to_string(), json!(strategy.name()));
            meta.insert("error".to_string(), json!(e.to_string()));
            strategy.update_state(FAILURE, &meta);
            Err(e)
        }
    }
}

/// Async form of [`extract_with_strategy`], run on the blocking thread pool.
#[cfg(feature = "tokio-runtime")]
pub async fn extract_with_strategy_async(
    registry: std::sync::Arc<StrategyRegistry>,
    strategy_name: String,
    file: std::sync::Arc<dyn FileFormat>,
    options: ExtractOptions,
) -> Result<ExtractResult> {
    let span = tracing::Span::current();

    tokio::task::spawn_blocking(move || {
        let _guard = span.entered();
        extract_with_strategy(&registry, &strategy_name, file.as_ref(), &options)
    })
    .await
    .map_err(|e| crate::ExtractError::Other(format!("Extraction task failed: {}", e)))?
}
