//! Strategy registry.
//!
//! Maps normalized names to strategy instances. Strategies arrive from three
//! sources, with this precedence:
//!
//! 1. explicit registration ([`StrategyRegistry::register`] and friends),
//! 2. the declarative strategies file,
//! 3. auto-discovery over the [`StrategyCatalog`].
//!
//! The later sources only fill names that are still free, so whichever source
//! registers a name first keeps it. Only the explicit override path
//! ([`StrategyRegistry::register_or_replace`]) replaces an existing entry.
//!
//! The file and discovery tiers run lazily, the first time a lookup misses.

use super::catalog::StrategyCatalog;
use super::traits::{Strategy, normalize_name, validate_strategy_name};
use crate::config::{RuntimeSettings, StrategiesFile, StrategyConfig};
use crate::{ExtractError, Result};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Registry of extraction strategies.
///
/// # Thread Safety
///
/// The name table is guarded by a read/write lock and population is
/// serialized, so a registry can be shared as `Arc<StrategyRegistry>`.
///
/// # Example
///
/// ```rust,no_run
/// use text_extract::StrategyRegistry;
///
/// let registry = StrategyRegistry::new();
/// let strategy = registry.get_strategy("GPU-OCR")?;
/// assert_eq!(strategy.name(), "gpu-ocr");
/// # Ok::<(), text_extract::ExtractError>(())
/// ```
pub struct StrategyRegistry {
    strategies: RwLock<IndexMap<String, Arc<dyn Strategy>>>,
    configs: RwLock<IndexMap<String, StrategyConfig>>,
    catalog: StrategyCatalog,
    config_path: Option<PathBuf>,
    config_loaded: AtomicBool,
    discovered: AtomicBool,
    population: Mutex<()>,
}

impl StrategyRegistry {
    /// Registry backed by the built-in strategy catalog.
    pub fn new() -> Self {
        Self::with_catalog(StrategyCatalog::builtin())
    }

    /// Registry with an empty catalog: nothing is discovered and config files
    /// cannot name any implementation.
    pub fn new_empty() -> Self {
        Self::with_catalog(StrategyCatalog::new())
    }

    pub fn with_catalog(catalog: StrategyCatalog) -> Self {
        Self {
            strategies: RwLock::new(IndexMap::new()),
            configs: RwLock::new(IndexMap::new()),
            catalog,
            config_path: None,
            config_loaded: AtomicBool::new(false),
            discovered: AtomicBool::new(false),
            population: Mutex::new(()),
        }
    }

    /// Read strategies from `path` instead of `OCR_CONFIG_PATH` or the default file.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    /// Get a strategy by name.
    ///
    /// The name is trimmed and lowercased. On a miss the registry loads the
    /// strategies file, then runs auto-discovery, checking again after each
    /// step. Each step runs once per registry. A missing strategies file is
    /// skipped; a malformed one fails the lookup.
    ///
    /// # Errors
    ///
    /// - `UnknownStrategy` listing every registered name if nothing matches
    /// - `Config` if the strategies file exists but is invalid
    pub fn get_strategy(&self, name: &str) -> Result<Arc<dyn Strategy>> {
        let key = normalize_name(name);

        if let Some(strategy) = self.lookup(&key) {
            return Ok(strategy);
        }

        if !self.config_loaded.load(Ordering::Acquire) {
            self.populate_from_config()?;
            if let Some(strategy) = self.lookup(&key) {
                return Ok(strategy);
            }
        }

        if !self.discovered.load(Ordering::Acquire) {
            {
                let _guard = self.population.lock();
                if !self.discovered.load(Ordering::Acquire) {
                    self.discover_locked();
                }
            }
            if let Some(strategy) = self.lookup(&key) {
                return Ok(strategy);
            }
        }

        Err(ExtractError::UnknownStrategy {
            name: key,
            available: self.list(),
        })
    }

    /// Register a strategy under its own name.
    ///
    /// Calls `initialize()` on the strategy first.
    ///
    /// # Errors
    ///
    /// - `DuplicateStrategy` if the name is taken
    /// - `Validation` if the name is empty or contains whitespace
    /// - any error from `initialize()`
    pub fn register(&self, strategy: Arc<dyn Strategy>) -> Result<()> {
        let name = strategy.name().to_string();
        self.register_as(&name, strategy)
    }

    /// Register a strategy under an explicit name.
    pub fn register_as(&self, name: &str, strategy: Arc<dyn Strategy>) -> Result<()> {
        let key = normalize_name(name);
        validate_strategy_name(&key)?;

        if self.strategies.read().contains_key(&key) {
            return Err(ExtractError::DuplicateStrategy { name: key });
        }

        strategy.initialize()?;

        let mut strategies = self.strategies.write();
        if strategies.contains_key(&key) {
            return Err(ExtractError::DuplicateStrategy { name: key });
        }

        tracing::info!("Registered strategy '{}'", key);
        strategies.insert(key, strategy);
        Ok(())
    }

    /// Register a strategy under its own name, replacing any existing entry.
    pub fn register_or_replace(&self, strategy: Arc<dyn Strategy>) -> Result<()> {
        let name = strategy.name().to_string();
        self.register_or_replace_as(&name, strategy)
    }

    /// Register under an explicit name, replacing any existing entry.
    ///
    /// A replaced strategy gets `cleanup()` called and loses its file config.
    pub fn register_or_replace_as(&self, name: &str, strategy: Arc<dyn Strategy>) -> Result<()> {
        let key = normalize_name(name);
        validate_strategy_name(&key)?;

        strategy.initialize()?;

        let previous = self.strategies.write().insert(key.clone(), strategy);
        self.configs.write().shift_remove(&key);

        if let Some(previous) = previous {
            tracing::info!("Replaced strategy '{}'", key);
            if let Err(e) = previous.cleanup() {
                tracing::warn!("Cleanup of replaced strategy '{}' failed: {}", key, e);
            }
        } else {
            tracing::info!("Registered strategy '{}'", key);
        }

        Ok(())
    }

    /// Register unless the name is taken.
    ///
    /// Returns `Ok(false)` and leaves the existing entry alone on a duplicate.
    /// This is the path used by config loading and discovery.
    pub fn register_if_absent(&self, name: &str, strategy: Arc<dyn Strategy>) -> Result<bool> {
        let key = normalize_name(name);
        validate_strategy_name(&key)?;

        if self.strategies.read().contains_key(&key) {
            tracing::debug!("Strategy '{}' already registered, skipping", key);
            return Ok(false);
        }

        strategy.initialize()?;

        let mut strategies = self.strategies.write();
        if strategies.contains_key(&key) {
            tracing::debug!("Strategy '{}' already registered, skipping", key);
            return Ok(false);
        }

        tracing::debug!("Registered strategy '{}'", key);
        strategies.insert(key, strategy);
        Ok(true)
    }

    /// Construct a `Default` strategy type and register it under its own name.
    pub fn register_type<S>(&self) -> Result<()>
    where
        S: Strategy + Default + 'static,
    {
        self.register(Arc::new(S::default()))
    }

    /// Load the strategies file and register its entries.
    ///
    /// `None` reads the registry's configured path, else `OCR_CONFIG_PATH`,
    /// else `config/strategies.yaml`. Every entry is validated and its class
    /// resolved in the catalog before anything is registered. Each strategy
    /// receives the entry's remaining keys as its config. Names that are
    /// already registered are skipped.
    ///
    /// Returns the number of strategies registered.
    ///
    /// # Errors
    ///
    /// `Config` if the file is missing or invalid, an entry lacks `class`, or
    /// a class is not in the catalog.
    pub fn load_strategies_from_config(&self, path: Option<&Path>) -> Result<usize> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| self.resolved_config_path());
        let file = StrategiesFile::from_file(&path)?;
        self.load_strategies(&file)
    }

    /// Register the entries of an already-parsed strategies file.
    ///
    /// Loading the file the registry would read on a lookup miss marks the
    /// file tier done. Any other file leaves it pending, so a later miss still
    /// reads the configured file.
    pub fn load_strategies(&self, file: &StrategiesFile) -> Result<usize> {
        let mut resolved = Vec::with_capacity(file.entries.len());
        for entry in &file.entries {
            let key = normalize_name(&entry.name);
            validate_strategy_name(&key).map_err(|e| {
                ExtractError::config_with_source(format!("Invalid strategy name '{}'", entry.name), e)
            })?;
            let descriptor = self.catalog.resolve(&entry.class)?;
            resolved.push((key, entry, descriptor));
        }

        let mut registered = 0;
        for (key, entry, descriptor) in resolved {
            if self.contains(&key) {
                tracing::debug!("Strategy '{}' already registered, skipping config entry", key);
                continue;
            }

            let strategy = (descriptor.construct)().map_err(|e| {
                ExtractError::config_with_source(
                    format!("Could not construct strategy '{}' ({})", entry.name, entry.class),
                    e,
                )
            })?;
            strategy.set_strategy_config(entry.config.clone());

            if self.register_if_absent(&key, strategy)? {
                self.configs.write().insert(key.clone(), entry.config.clone());
                tracing::info!("Loaded strategy '{}' from config ({})", key, entry.class);
                registered += 1;
            }
        }

        if file.path.as_deref() == Some(self.resolved_config_path().as_path()) {
            self.config_loaded.store(true, Ordering::Release);
        }
        Ok(registered)
    }

    /// Construct and register every discoverable catalog entry under its own name.
    ///
    /// Construction and initialization failures are logged and skipped; taken
    /// names are left alone. Returns the number of strategies registered.
    pub fn autodiscover_strategies(&self) -> usize {
        let _guard = self.population.lock();
        self.discover_locked()
    }

    /// Run the file and discovery tiers now instead of on the first miss.
    ///
    /// Same rules as lookup: a missing strategies file is skipped, a malformed
    /// one is an error. Tiers that already ran are not repeated.
    pub fn populate(&self) -> Result<()> {
        if !self.config_loaded.load(Ordering::Acquire) {
            self.populate_from_config()?;
        }

        let _guard = self.population.lock();
        if !self.discovered.load(Ordering::Acquire) {
            self.discover_locked();
        }
        Ok(())
    }

    /// Registered names, in registration order.
    pub fn list(&self) -> Vec<String> {
        self.strategies.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.read().contains_key(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.strategies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.read().is_empty()
    }

    /// Config a strategy received from the strategies file.
    ///
    /// `None` for strategies that were not loaded from a file.
    pub fn strategy_config(&self, name: &str) -> Option<StrategyConfig> {
        self.configs.read().get(&normalize_name(name)).cloned()
    }

    /// Remove a strategy, calling `cleanup()` on it.
    ///
    /// Returns whether the name was registered.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let key = normalize_name(name);
        let removed = self.strategies.write().shift_remove(&key);
        self.configs.write().shift_remove(&key);

        match removed {
            Some(strategy) => {
                strategy.cleanup()?;
                tracing::info!("Removed strategy '{}'", key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Call `cleanup()` on every registered strategy. Registrations are kept.
    ///
    /// Every strategy is cleaned up even if one fails; the first error is returned.
    pub fn cleanup_all(&self) -> Result<()> {
        let strategies: Vec<(String, Arc<dyn Strategy>)> = self
            .strategies
            .read()
            .iter()
            .map(|(name, strategy)| (name.clone(), Arc::clone(strategy)))
            .collect();

        let mut first_error = None;
        for (name, strategy) in strategies {
            if let Err(e) = strategy.cleanup() {
                tracing::warn!("Cleanup of strategy '{}' failed: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn lookup(&self, key: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.read().get(key).cloned()
    }

    fn resolved_config_path(&self) -> PathBuf {
        self.config_source().0
    }

    /// The strategies file for the lazy tier and whether it was set explicitly
    /// (builder or `OCR_CONFIG_PATH`) rather than defaulted.
    fn config_source(&self) -> (PathBuf, bool) {
        if let Some(path) = &self.config_path {
            return (path.clone(), true);
        }

        let settings = RuntimeSettings::from_env();
        let explicit = settings.config_path.is_some();
        (settings.strategies_path(), explicit)
    }

    fn populate_from_config(&self) -> Result<()> {
        let _guard = self.population.lock();
        if self.config_loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        let (path, explicit) = self.config_source();
        if !path.exists() {
            if explicit {
                tracing::warn!("Strategies file {} does not exist, skipping", path.display());
            } else {
                tracing::debug!("No strategies file at {}, skipping", path.display());
            }
            self.config_loaded.store(true, Ordering::Release);
            return Ok(());
        }

        let file = StrategiesFile::from_file(&path)?;
        let registered = self.load_strategies(&file)?;
        self.config_loaded.store(true, Ordering::Release);
        tracing::debug!("Loaded {} strategies from {}", registered, path.display());
        Ok(())
    }

    fn discover_locked(&self) -> usize {
        let mut registered = 0;

        for descriptor in self.catalog.discoverable() {
            let strategy = match (descriptor.construct)() {
                Ok(strategy) => strategy,
                Err(e) => {
                    tracing::warn!("Skipping strategy {}: construction failed: {}", descriptor.class, e);
                    continue;
                }
            };

            let name = strategy.name().to_string();
            match self.register_if_absent(&name, strategy) {
                Ok(true) => {
                    tracing::debug!("Discovered strategy '{}' ({})", name, descriptor.class);
                    registered += 1;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Skipping strategy {}: {}", descriptor.class, e),
            }
        }

        self.discovered.store(true, Ordering::Release);
        registered
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.list())
            .field("config_path", &self.config_path)
            .field("config_loaded", &self.config_loaded.load(Ordering::Relaxed))
            .field("discovered", &self.discovered.load(Ordering::Relaxed))
            .finish()
    }
}
