//! Strategies file and runtime settings loading tests.
//!
//! This module tests:
//! - Loading strategies files in YAML, TOML and JSON
//! - Discovering config/strategies.yaml in parent directories
//! - Error messages for missing or malformed files
//! - Reading USE_GPU, GPU_BATCH_SIZE and OCR_CONFIG_PATH from the environment

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use text_extract::config::{RuntimeSettings, StrategiesFile};
use text_extract::ExtractError;

const YAML: &str = r#"
strategies:
  gpu-ocr:
    class: text_extract::strategies::GpuOcrStrategy
    use_gpu: true
    batch_size: 8
  ai-enhanced:
    class: text_extract::strategies::AiEnhancedStrategy
"#;

const TOML: &str = r#"
[strategies.gpu-ocr]
class = "text_extract::strategies::GpuOcrStrategy"
use_gpu = true
batch_size = 8

[strategies.ai-enhanced]
class = "text_extract::strategies::AiEnhancedStrategy"
"#;

const JSON: &str = r#"{
  "strategies": {
    "gpu-ocr": {
      "class": "text_extract::strategies::GpuOcrStrategy",
      "use_gpu": true,
      "batch_size": 8
    },
    "ai-enhanced": { "class": "text_extract::strategies::AiEnhancedStrategy" }
  }
}"#;

fn assert_standard_entries(file: &StrategiesFile) {
    assert_eq!(file.entries.len(), 2);

    let entry = |name: &str| file.entries.iter().find(|e| e.name == name).unwrap();

    let gpu = entry("gpu-ocr");
    assert_eq!(gpu.class, "text_extract::strategies::GpuOcrStrategy");
    assert_eq!(gpu.config.get_bool("use_gpu"), Some(true));
    assert_eq!(gpu.config.get_usize("batch_size"), Some(8));
    assert_eq!(gpu.config.len(), 2);

    let ai = entry("ai-enhanced");
    assert_eq!(ai.class, "text_extract::strategies::AiEnhancedStrategy");
    assert!(ai.config.is_empty());
}

/// Test that every supported format yields the same entries.
#[test]
fn test_from_file_all_formats() {
    let dir = TempDir::new().unwrap();

    for (name, content) in [("s.yaml", YAML), ("s.yml", YAML), ("s.toml", TOML), ("s.json", JSON)] {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();

        let file = StrategiesFile::from_file(&path).unwrap();
        assert_standard_entries(&file);
        assert_eq!(file.path.as_deref(), Some(path.as_path()));
    }
}

/// Test that files without a known extension are read as YAML.
#[test]
fn test_from_file_defaults_to_yaml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strategies.conf");
    fs::write(&path, YAML).unwrap();

    assert_standard_entries(&StrategiesFile::from_file(&path).unwrap());
}

/// Test the error for a file that does not exist.
#[test]
fn test_missing_file_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.yaml");

    let err = StrategiesFile::from_file(&path).unwrap_err();

    assert!(matches!(err, ExtractError::Config { .. }));
    assert!(err.to_string().contains("Config file not found"));
}

/// Test the error for malformed content in each format.
#[test]
fn test_malformed_content_errors() {
    let dir = TempDir::new().unwrap();

    for (name, content, expected) in [
        ("bad.yaml", "strategies: [unclosed", "Invalid YAML"),
        ("bad.toml", "[strategies\nclass = ", "Invalid TOML"),
        ("bad.json", "{\"strategies\": ", "Invalid JSON"),
    ] {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();

        let err = StrategiesFile::from_file(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Config { .. }), "{name}: {err}");
        assert!(err.to_string().contains(expected), "{name}: {err}");
    }
}

/// Test that an entry must be a mapping with a class.
#[test]
fn test_entry_without_class() {
    let err = StrategiesFile::from_yaml_str("strategies:\n  plain: just-a-string\n").unwrap_err();
    assert!(err.to_string().contains("'plain'"));

    let err = StrategiesFile::from_yaml_str("strategies:\n  blank:\n    class: '  '\n").unwrap_err();
    assert!(err.to_string().contains("'blank'"));
}

/// Test that the strategies section must be a mapping.
#[test]
fn test_strategies_section_shape() {
    let err = StrategiesFile::from_yaml_str("strategies:\n  - gpu-ocr\n").unwrap_err();
    assert!(err.to_string().contains("must be a mapping"));

    let err = StrategiesFile::from_json_str("[]").unwrap_err();
    assert!(err.to_string().contains("Missing 'strategies' section"));
}

/// Test that an empty strategies section is valid.
#[test]
fn test_empty_strategies_section() {
    let file = StrategiesFile::from_toml_str("[strategies]\n").unwrap();
    assert!(file.is_empty());
}

/// Test discovering config/strategies.yaml from a nested directory.
#[test]
#[serial_test::serial]
fn test_discover_in_parent_directory() {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("config");
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(&nested).unwrap();
    fs::write(config_dir.join("strategies.yaml"), YAML).unwrap();

    let original = std::env::current_dir().unwrap();
    std::env::set_current_dir(&nested).unwrap();

    let discovered = StrategiesFile::discover();

    std::env::set_current_dir(&original).unwrap();

    let file = discovered.unwrap().expect("strategies file should be discovered");
    assert_standard_entries(&file);
    assert!(file.path.unwrap().ends_with("config/strategies.yaml"));
}

/// Test that discovery returns None when no file exists up the tree.
#[test]
#[serial_test::serial]
fn test_discover_none() {
    let dir = TempDir::new().unwrap();

    let original = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let discovered = StrategiesFile::discover();

    std::env::set_current_dir(&original).unwrap();

    // A strategies file higher up the real tree would be found as well.
    if let Some(file) = discovered.unwrap() {
        let path = file.path.unwrap();
        assert!(!path.starts_with(dir.path()));
    }
}

/// Test reading runtime settings from the process environment.
#[test]
#[serial_test::serial]
fn test_runtime_settings_from_env() {
    unsafe {
        std::env::set_var("USE_GPU", "Yes");
        std::env::set_var("GPU_BATCH_SIZE", "16");
        std::env::set_var("OCR_CONFIG_PATH", "custom.yaml");
    }

    let settings = RuntimeSettings::from_env();

    unsafe {
        std::env::set_var("USE_GPU", "maybe");
        std::env::set_var("GPU_BATCH_SIZE", "0");
    }

    let invalid = RuntimeSettings::from_env();

    unsafe {
        std::env::remove_var("USE_GPU");
        std::env::remove_var("GPU_BATCH_SIZE");
        std::env::remove_var("OCR_CONFIG_PATH");
    }

    assert_eq!(settings.use_gpu, Some(true));
    assert_eq!(settings.gpu_batch_size, Some(16));
    assert_eq!(settings.config_path, Some(PathBuf::from("custom.yaml")));
    assert_eq!(settings.strategies_path(), PathBuf::from("custom.yaml"));

    assert_eq!(invalid.use_gpu, None);
    assert_eq!(invalid.gpu_batch_size, None);

    assert_eq!(RuntimeSettings::from_env(), RuntimeSettings::default());
}
