//! Heuristic OCR quality scoring.
//!
//! The default analyzer. Scores a chunk from 0.0 to 1.0 by penalizing typical
//! OCR artifacts and rewarding sentence structure. It needs no model files and
//! runs on any device.

use super::{AnalyzerLoader, TextAnalyzer};
use crate::Result;
use crate::acceleration::Device;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

const OCR_PENALTY_WEIGHT: f64 = 0.5;
const STRUCTURE_BONUS_WEIGHT: f64 = 0.2;
const BASE_SCORE: f64 = 0.8;

const MIN_TEXT_LENGTH: usize = 10;
const MIN_SENTENCE_WORDS: f64 = 5.0;
const MAX_SENTENCE_WORDS: f64 = 30.0;

static SCATTERED_CHARS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-zA-Z]\s{2,}[a-zA-Z]\s{2,}[a-zA-Z]\b")
        .expect("Scattered chars regex pattern is valid and should compile")
});
static REPEATED_PUNCT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[.]{3,}|[_]{3,}|[-]{3,}").expect("Repeated punctuation regex pattern is valid and should compile")
});
static ISOLATED_PUNCT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s[.,;:!?]\s").expect("Isolated punctuation regex pattern is valid and should compile"));
static MALFORMED_WORDS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-zA-Z]+[0-9]+[a-zA-Z]+[a-zA-Z0-9]*\b")
        .expect("Malformed words regex pattern is valid and should compile")
});
static EXCESSIVE_WHITESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]{3,}").expect("Excessive whitespace regex pattern is valid and should compile"));
static NOISE_CHARS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[|~^`¦§¬]+").expect("Noise chars regex pattern is valid and should compile"));

static SENTENCE_DETECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?](\s+[A-Z]|\s*$)").expect("Sentence detection regex pattern is valid and should compile"));

#[inline]
fn sum_match_lengths(text: &str, pattern: &Regex) -> usize {
    pattern.find_iter(text).map(|m| m.len()).sum()
}

/// Quality of a piece of recognized text, from 0.0 (noise) to 1.0 (clean prose).
pub fn quality_score(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    if trimmed.len() < MIN_TEXT_LENGTH {
        return 0.1;
    }

    let total_chars = text.len() as f64;
    let mut score = BASE_SCORE;

    score -= ocr_penalty(text, total_chars) * OCR_PENALTY_WEIGHT;
    score += structure_bonus(trimmed) * STRUCTURE_BONUS_WEIGHT;

    score.clamp(0.0, 1.0)
}

fn ocr_penalty(text: &str, total_chars: f64) -> f64 {
    let artifact_chars = sum_match_lengths(text, &SCATTERED_CHARS_PATTERN)
        + sum_match_lengths(text, &REPEATED_PUNCT_PATTERN)
        + sum_match_lengths(text, &ISOLATED_PUNCT_PATTERN)
        + sum_match_lengths(text, &MALFORMED_WORDS_PATTERN)
        + sum_match_lengths(text, &EXCESSIVE_WHITESPACE_PATTERN)
        + sum_match_lengths(text, &NOISE_CHARS_PATTERN);

    let alphabetic = text.chars().filter(|c| c.is_alphabetic()).count() as f64;
    let non_text_ratio = 1.0 - alphabetic / text.chars().filter(|c| !c.is_whitespace()).count().max(1) as f64;

    ((artifact_chars as f64 / total_chars) + (non_text_ratio - 0.3).max(0.0)).min(1.0)
}

fn structure_bonus(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    if words == 0.0 {
        return 0.0;
    }

    let sentences = SENTENCE_DETECT.find_iter(text).count() as f64;
    let mut bonus: f64 = 0.0;

    if sentences > 0.0 {
        bonus += 0.5;
        let avg_words = words / sentences;
        if (MIN_SENTENCE_WORDS..=MAX_SENTENCE_WORDS).contains(&avg_words) {
            bonus += 0.3;
        }
    }

    if text.chars().next().is_some_and(char::is_uppercase) {
        bonus += 0.2;
    }

    bonus.min(1.0)
}

/// [`TextAnalyzer`] backed by [`quality_score`].
#[derive(Debug, Default, Clone, Copy)]
pub struct QualityAnalyzer;

impl TextAnalyzer for QualityAnalyzer {
    fn model_name(&self) -> &str {
        "text-quality"
    }

    fn score(&self, chunk: &str) -> Result<Vec<f64>> {
        Ok(vec![quality_score(chunk)])
    }
}

/// Loads [`QualityAnalyzer`]; the device is irrelevant to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct QualityLoader;

impl AnalyzerLoader for QualityLoader {
    fn name(&self) -> &str {
        "text-quality"
    }

    fn load(&self, device: Device) -> Result<Arc<dyn TextAnalyzer>> {
        tracing::debug!("Loading text-quality analyzer (requested device: {})", device);
        Ok(Arc::new(QualityAnalyzer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(quality_score(""), 0.0);
        assert_eq!(quality_score("   \n"), 0.0);
    }

    #[test]
    fn test_short_text() {
        assert_eq!(quality_score("Hi."), 0.1);
    }

    #[test]
    fn test_clean_prose_scores_high() {
        let text = "The quarterly report shows steady growth. Revenue increased in every region this year.";
        assert!(quality_score(text) > 0.9, "score was {}", quality_score(text));
    }

    #[test]
    fn test_ocr_noise_scores_lower() {
        let clean = "The quarterly report shows steady growth. Revenue increased in every region this year.";
        let noisy = "T h e   q u a r t 3rly r3p0rt ||| ~~ ..... s h o w s ; ___ gr0wth";
        assert!(quality_score(noisy) < quality_score(clean));
        assert!(quality_score(noisy) < 0.6, "score was {}", quality_score(noisy));
    }

    #[test]
    fn test_score_in_range() {
        for text in ["a", "||||||||||||||||||||", "Plain words without punctuation here", "1234 5678 9012 3456"] {
            let score = quality_score(text);
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_analyzer_returns_single_score() {
        let scores = QualityAnalyzer.score("Some clean text. Another sentence here.").unwrap();
        assert_eq!(scores.len(), 1);
    }

    #[test]
    fn test_loader_ignores_device() {
        let analyzer = QualityLoader.load(Device::Cuda).unwrap();
        assert_eq!(analyzer.model_name(), "text-quality");
    }
}
