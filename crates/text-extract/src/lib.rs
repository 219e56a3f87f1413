//! text-extract - Pluggable Text Extraction Strategies
//!
//! text-extract lets a document pipeline pick one of several interchangeable
//! text-extraction backends by name at runtime. Backends register explicitly,
//! through a declarative strategies file, or through auto-discovery.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use text_extract::{ExtractOptions, StrategyRegistry, extract_with_strategy, files::load_file};
//!
//! # fn main() -> text_extract::Result<()> {
//! let registry = StrategyRegistry::new();
//! let file = load_file("scan.png")?;
//! let result = extract_with_strategy(&registry, "gpu-ocr", file.as_ref(), &ExtractOptions::default())?;
//! println!("{}", result.text());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Strategies** (`strategies`): the `Strategy` contract, registry, catalog and built-in strategies
//! - **OCR** (`ocr`): lazy reader with CPU fallback, batched page processing, Tesseract reader
//! - **Acceleration** (`acceleration`): accelerator probes and device selection
//! - **Analysis** (`analysis`): post-OCR confidence scoring
//! - **Files** (`files`): the `FileFormat` capability and MIME detection
//! - **Config** (`config`): strategies file and environment settings
//!
//! # Features
//!
//! - `tokio-runtime` (default): async extraction and a channel adapter for progress reports
//! - `otel`: tracing spans around strategy extraction

#![deny(unsafe_code)]

pub mod acceleration;
pub mod analysis;
pub mod config;
pub mod error;
pub mod extract;
pub mod files;
pub mod ocr;
pub mod progress;
pub mod strategies;
pub mod types;

pub use error::{ExtractError, Result};
pub use types::{ExtractResult, Metadata};

pub use config::{RuntimeSettings, StrategiesFile, StrategyConfig, StrategyEntry};
pub use extract::{ExtractOptions, extract_with_strategy};
pub use files::{FileFormat, ImageFile, ImageSequence};
pub use progress::{StateCallback, StateUpdate};
pub use strategies::{AiEnhancedStrategy, GpuOcrStrategy, Strategy, StrategyCatalog, StrategyRegistry};

#[cfg(feature = "tokio-runtime")]
pub use extract::extract_with_strategy_async;
