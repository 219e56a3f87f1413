//! Extraction strategies and their registry.
//!
//! - [`Strategy`]: the contract every backend implements
//! - [`StrategyRegistry`]: name lookup with lazy config loading and discovery
//! - [`StrategyCatalog`]: constructors addressable by implementation path
//! - [`GpuOcrStrategy`], [`AiEnhancedStrategy`]: the built-in strategies

pub mod ai_enhanced;
pub mod catalog;
pub mod gpu_ocr;
pub mod registry;
pub mod traits;

pub use ai_enhanced::AiEnhancedStrategy;
pub use catalog::{STRATEGY_NAMESPACE, StrategyCatalog, StrategyConstructor, StrategyDescriptor};
pub use gpu_ocr::GpuOcrStrategy;
pub use registry::StrategyRegistry;
pub use traits::{
    DEFAULT_LANGUAGE, Strategy, StrategyContext, base_metadata, ensure_image_input, normalize_name, split_languages,
    validate_strategy_name,
};
