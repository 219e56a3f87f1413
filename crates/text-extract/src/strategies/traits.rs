//! The strategy contract.
//!
//! Every extraction backend implements [`Strategy`]. The registry stores
//! strategies as `Arc<dyn Strategy>`, so all methods take `&self`; mutable
//! state lives behind interior mutability. The config and callback slots every
//! strategy needs are bundled in [`StrategyContext`].

use crate::config::StrategyConfig;
use crate::files::FileFormat;
use crate::progress::StateCallback;
use crate::types::{ExtractResult, LANGUAGE_KEY, Metadata, PAGES_PROCESSED_KEY, STRATEGY_KEY};
use crate::{ExtractError, Result};
use parking_lot::RwLock;
use serde_json::json;

/// Language used when the caller does not pass one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Config and callback slots shared by all strategies.
#[derive(Default)]
pub struct StrategyContext {
    config: RwLock<StrategyConfig>,
    callback: RwLock<Option<StateCallback>>,
}

impl StrategyContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current config.
    pub fn config(&self) -> StrategyConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: StrategyConfig) {
        *self.config.write() = config;
    }

    pub fn set_callback(&self, callback: Option<StateCallback>) {
        *self.callback.write() = callback;
    }

    pub fn has_callback(&self) -> bool {
        self.callback.read().is_some()
    }

    /// Invoke the callback, if any. The lock is not held during the call.
    pub fn report(&self, state: &str, meta: &Metadata) {
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(state, meta);
        }
    }
}

impl std::fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContext")
            .field("config", &*self.config.read())
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

/// A named, interchangeable text-extraction backend.
///
/// # Thread Safety
///
/// Strategies must be `Send + Sync`. A single instance is not meant to serve
/// concurrent callers, but lazily created state must be guarded so that misuse
/// serializes instead of corrupting it.
///
/// # Example
///
/// ```rust
/// use text_extract::files::FileFormat;
/// use text_extract::strategies::{Strategy, StrategyContext, base_metadata, ensure_image_input};
/// use text_extract::{ExtractResult, Result};
///
/// #[derive(Default)]
/// struct Echo {
///     context: StrategyContext,
/// }
///
/// impl Strategy for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     fn context(&self) -> &StrategyContext {
///         &self.context
///     }
///
///     fn extract_text(&self, file: &dyn FileFormat, language: &str) -> Result<ExtractResult> {
///         ensure_image_input(self.name(), file)?;
///         let pages = file.convert_to_images()?.len();
///         Ok(ExtractResult::new("", base_metadata(self.name(), language, pages)))
///     }
/// }
/// ```
pub trait Strategy: Send + Sync {
    /// Registry key for this strategy.
    ///
    /// Must not depend on instance state. The registry trims and lowercases it
    /// before storing.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Config and callback slots backing the default methods below.
    fn context(&self) -> &StrategyContext;

    /// Called once when the strategy is registered.
    ///
    /// Expensive backend resources should still be created lazily on the
    /// first `extract_text` call.
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Release backend resources. The next `extract_text` re-creates them.
    fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    /// Extract text from `file`.
    ///
    /// `language` holds one or more comma-separated language codes. Files that
    /// are neither images nor convertible to images fail with
    /// [`ExtractError::UnsupportedFormat`] before any backend work happens.
    /// The result's metadata always carries `strategy`, `language` and
    /// `pages_processed`.
    fn extract_text(&self, file: &dyn FileFormat, language: &str) -> Result<ExtractResult>;

    /// Replace the strategy's config. Resources that already exist are kept.
    fn set_strategy_config(&self, config: StrategyConfig) {
        self.context().set_config(config);
    }

    fn strategy_config(&self) -> StrategyConfig {
        self.context().config()
    }

    fn set_update_state_callback(&self, callback: Option<StateCallback>) {
        self.context().set_callback(callback);
    }

    /// Report a state change. No-op without a callback.
    fn update_state(&self, state: &str, meta: &Metadata) {
        self.context().report(state, meta);
    }
}

/// Normalize a strategy name for storage and lookup.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Reject names that cannot be registry keys.
pub fn validate_strategy_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ExtractError::validation("Strategy name cannot be empty"));
    }

    if name.contains(char::is_whitespace) {
        return Err(ExtractError::validation(format!(
            "Strategy name '{}' cannot contain whitespace",
            name
        )));
    }

    Ok(())
}

/// Fail with `UnsupportedFormat` unless `file` is an image or convertible to one.
pub fn ensure_image_input(strategy: &str, file: &dyn FileFormat) -> Result<()> {
    if file.is_image_representable() {
        Ok(())
    } else {
        Err(ExtractError::unsupported_format(strategy, file.mime_type()))
    }
}

/// Split a comma-separated language string into codes.
///
/// Blank input yields the default language.
pub fn split_languages(language: &str) -> Vec<String> {
    let languages: Vec<String> = language
        .split(',')
        .map(|code| code.trim().to_lowercase())
        .filter(|code| !code.is_empty())
        .collect();

    if languages.is_empty() {
        vec![DEFAULT_LANGUAGE.to_string()]
    } else {
        languages
    }
}

/// Metadata with the keys every result must carry.
pub fn base_metadata(strategy: &str, language: &str, pages_processed: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(STRATEGY_KEY.to_string(), json!(strategy));
    metadata.insert(LANGUAGE_KEY.to_string(), json!(language));
    metadata.insert(PAGES_PROCESSED_KEY.to_string(), json!(pages_processed));
    metadata
}
