//! Post-OCR text analysis.
//!
//! An analyzer model scores chunks of recognized text. The scores are folded
//! into a single confidence value for the result:
//!
//! - only the first [`MAX_CHUNKS`] chunks of [`CHUNK_SIZE`] characters are scored,
//! - each chunk contributes its highest score,
//! - the confidence is the mean over scored chunks.

pub mod quality;

use crate::acceleration::Device;
use crate::Result;
use serde_json::{Value, json};
use std::sync::Arc;

pub use quality::{QualityAnalyzer, QualityLoader};

/// Characters per analyzed chunk.
pub const CHUNK_SIZE: usize = 512;
/// Chunks analyzed per result.
pub const MAX_CHUNKS: usize = 3;
/// Confidence when chunks were analyzed but none produced a score.
pub const UNSCORED_CONFIDENCE: f64 = 0.8;
/// Confidence when there is no model or nothing to analyze.
pub const UNANALYZED_CONFIDENCE: f64 = 1.0;
/// Confidence when the analyzer failed.
pub const FAILED_CONFIDENCE: f64 = 0.5;

/// A loaded text analysis model.
pub trait TextAnalyzer: Send + Sync {
    fn model_name(&self) -> &str;

    /// Per-label scores for one chunk, each in `0.0..=1.0`.
    fn score(&self, chunk: &str) -> Result<Vec<f64>>;
}

/// Loads a [`TextAnalyzer`] onto a device.
pub trait AnalyzerLoader: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, device: Device) -> Result<Arc<dyn TextAnalyzer>>;
}

/// Outcome of [`enhance`].
#[derive(Debug, Clone, PartialEq)]
pub struct Enhancement {
    pub text: String,
    pub confidence: f64,
    pub analysis: Value,
}

/// Split `text` into chunks of at most `size` characters, keeping at most `max` chunks.
pub fn chunk_text(text: &str, size: usize, max: usize) -> Vec<&str> {
    if size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (index, (offset, _)) in text.char_indices().enumerate() {
        if index > 0 && index % size == 0 {
            chunks.push(&text[start..offset]);
            start = offset;
            count = 0;
            if chunks.len() == max {
                return chunks;
            }
        }
        count += 1;
    }

    if count > 0 && chunks.len() < max {
        chunks.push(&text[start..]);
    }

    chunks
}

/// Score `text` with `analyzer` and derive the result confidence.
pub fn enhance(analyzer: Option<&dyn TextAnalyzer>, text: String, device: Device) -> Enhancement {
    let Some(analyzer) = analyzer else {
        return Enhancement {
            text,
            confidence: UNANALYZED_CONFIDENCE,
            analysis: json!({}),
        };
    };

    if text.trim().is_empty() {
        return Enhancement {
            text,
            confidence: UNANALYZED_CONFIDENCE,
            analysis: json!({}),
        };
    }

    let mut analyzed = 0usize;
    let mut best_scores = Vec::new();

    for chunk in chunk_text(&text, CHUNK_SIZE, MAX_CHUNKS) {
        if chunk.trim().is_empty() {
            continue;
        }

        match analyzer.score(chunk) {
            Ok(scores) => {
                analyzed += 1;
                if let Some(best) = scores.into_iter().reduce(f64::max) {
                    best_scores.push(best);
                }
            }
            Err(e) => {
                tracing::warn!("Text analysis with {} failed: {}", analyzer.model_name(), e);
                return Enhancement {
                    text,
                    confidence: FAILED_CONFIDENCE,
                    analysis: json!({ "error": e.to_string() }),
                };
            }
        }
    }

    let confidence = if best_scores.is_empty() {
        UNSCORED_CONFIDENCE
    } else {
        best_scores.iter().sum::<f64>() / best_scores.len() as f64
    };

    Enhancement {
        text,
        confidence,
        analysis: json!({
            "chunks_analyzed": analyzed,
            "ai_model_used": true,
            "model": analyzer.model_name(),
            "processing_device": device.as_str(),
        }),
    }
}
