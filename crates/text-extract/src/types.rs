use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata attached to an [`ExtractResult`].
///
/// Keys are strings, values are any JSON value. `serde_json` is built with
/// `preserve_order`, so keys keep their insertion order when serialized.
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key holding the name of the strategy that produced a result.
pub const STRATEGY_KEY: &str = "strategy";
/// Metadata key holding the language string passed to `extract_text`.
pub const LANGUAGE_KEY: &str = "language";
/// Metadata key holding the number of page units that were processed.
pub const PAGES_PROCESSED_KEY: &str = "pages_processed";

/// Outcome of a single `extract_text` call.
///
/// Immutable once built. Every strategy guarantees that `metadata` contains
/// [`STRATEGY_KEY`], [`LANGUAGE_KEY`] and [`PAGES_PROCESSED_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractResult {
    text: String,
    metadata: Metadata,
}

impl ExtractResult {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Look up a single metadata value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn strategy(&self) -> Option<&str> {
        self.metadata.get(STRATEGY_KEY).and_then(Value::as_str)
    }

    pub fn language(&self) -> Option<&str> {
        self.metadata.get(LANGUAGE_KEY).and_then(Value::as_str)
    }

    pub fn pages_processed(&self) -> Option<u64> {
        self.metadata.get(PAGES_PROCESSED_KEY).and_then(Value::as_u64)
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Consume the result, returning its text and metadata.
    pub fn into_parts(self) -> (String, Metadata) {
        (self.text, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_metadata() -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(STRATEGY_KEY.to_string(), json!("gpu-ocr"));
        metadata.insert(LANGUAGE_KEY.to_string(), json!("en,de"));
        metadata.insert(PAGES_PROCESSED_KEY.to_string(), json!(3));
        metadata
    }

    #[test]
    fn test_accessors() {
        let result = ExtractResult::new("hello", sample_metadata());
        assert_eq!(result.text(), "hello");
        assert_eq!(result.strategy(), Some("gpu-ocr"));
        assert_eq!(result.language(), Some("en,de"));
        assert_eq!(result.pages_processed(), Some(3));
        assert!(!result.is_empty());
    }

    #[test]
    fn test_empty_text_is_allowed() {
        let result = ExtractResult::new("  \n", sample_metadata());
        assert!(result.is_empty());
        assert_eq!(result.pages_processed(), Some(3));
    }

    #[test]
    fn test_serialization_preserves_key_order() {
        let result = ExtractResult::new("text", sample_metadata());
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"text":"text","metadata":{"strategy":"gpu-ocr","language":"en,de","pages_processed":3}}"#
        );

        let back: ExtractResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_into_parts() {
        let (text, metadata) = ExtractResult::new("abc", sample_metadata()).into_parts();
        assert_eq!(text, "abc");
        assert_eq!(metadata.len(), 3);
    }
}
