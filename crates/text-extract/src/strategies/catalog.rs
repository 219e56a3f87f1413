//! Factory table of strategy implementations.
//!
//! Declarative config names an implementation by path (its `class`), e.g.
//! `text_extract::strategies::GpuOcrStrategy`. The catalog maps those paths to
//! constructors. Auto-discovery constructs every entry whose path lies inside
//! the strategy namespace.

use super::Strategy;
use crate::{ExtractError, Result};
use indexmap::IndexMap;
use std::sync::Arc;

/// Path segment marking implementations that take part in auto-discovery.
pub const STRATEGY_NAMESPACE: &str = "::strategies::";

/// Constructor for a strategy implementation.
pub type StrategyConstructor = fn() -> Result<Arc<dyn Strategy>>;

/// One catalog entry.
#[derive(Clone, Copy)]
pub struct StrategyDescriptor {
    /// Implementation path used as `class` in config files.
    pub class: &'static str,
    /// Name the strategy registers under when discovered.
    pub name: &'static str,
    pub construct: StrategyConstructor,
}

impl StrategyDescriptor {
    pub const fn new(class: &'static str, name: &'static str, construct: StrategyConstructor) -> Self {
        Self { class, name, construct }
    }

    pub fn is_discoverable(&self) -> bool {
        self.class.contains(STRATEGY_NAMESPACE)
    }
}

impl std::fmt::Debug for StrategyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyDescriptor")
            .field("class", &self.class)
            .field("name", &self.name)
            .finish()
    }
}

/// Known strategy implementations, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct StrategyCatalog {
    entries: IndexMap<&'static str, StrategyDescriptor>,
}

impl StrategyCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the strategies shipped in this crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.add(super::GpuOcrStrategy::descriptor());
        catalog.add(super::AiEnhancedStrategy::descriptor());
        catalog
    }

    /// Add or replace an entry by class path.
    pub fn add(&mut self, descriptor: StrategyDescriptor) -> &mut Self {
        self.entries.insert(descriptor.class, descriptor);
        self
    }

    pub fn with(mut self, descriptor: StrategyDescriptor) -> Self {
        self.add(descriptor);
        self
    }

    pub fn get(&self, class: &str) -> Option<&StrategyDescriptor> {
        self.entries.get(class.trim())
    }

    /// Look up a class path, failing with a `Config` error when unknown.
    pub fn resolve(&self, class: &str) -> Result<&StrategyDescriptor> {
        self.get(class).ok_or_else(|| {
            ExtractError::config(format!(
                "Unknown strategy class '{}'. Known classes: {}",
                class,
                self.classes().join(", ")
            ))
        })
    }

    pub fn classes(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Entries inside the strategy namespace, in insertion order.
    pub fn discoverable(&self) -> impl Iterator<Item = &StrategyDescriptor> {
        self.entries.values().filter(|d| d.is_discoverable())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
