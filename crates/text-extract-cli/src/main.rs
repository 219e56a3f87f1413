//! text-extract CLI
//!
//! Run a named extraction strategy over image files, or list the strategies
//! the registry can provide.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use text_extract::files::{load_file, load_pages};
use text_extract::progress::{self, PROGRESS};
use text_extract::{
    ExtractOptions, FileFormat, RuntimeSettings, StrategiesFile, StrategyRegistry, extract_with_strategy_async,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Plain extracted text
    Text,
    /// Text and metadata as JSON
    Json,
}

#[derive(Parser)]
#[command(name = "text-extract")]
#[command(version, about = "Extract text from images with pluggable strategies", long_about = None)]
struct Cli {
    /// Strategies file (YAML, TOML or JSON). Defaults to OCR_CONFIG_PATH, then the nearest config/strategies.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available strategies
    List,

    /// Extract text from one file, or from several page images as one document
    Extract {
        /// Input file(s). Several paths are treated as the pages of one document
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Strategy name
        #[arg(short, long, default_value = "gpu-ocr")]
        strategy: String,

        /// Comma-separated language codes
        #[arg(short, long, default_value = "en")]
        language: String,

        /// Strategy config override as key=value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Do not print progress to stderr
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "text_extract=debug,text_extract_cli=debug"
    } else {
        "text_extract=warn"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let registry = Arc::new(build_registry(cli.config.as_deref())?);

    match cli.command {
        Commands::List => list(&registry),
        Commands::Extract {
            paths,
            strategy,
            language,
            overrides,
            format,
            quiet,
        } => extract(registry, paths, strategy, language, overrides, format, quiet).await,
    }
}

/// `--config` wins, then `OCR_CONFIG_PATH`. Without either, the nearest
/// `config/strategies.yaml` in the current directory or a parent is loaded.
fn build_registry(config: Option<&Path>) -> Result<StrategyRegistry> {
    if let Some(path) = config {
        if !path.exists() {
            bail!("Strategies file not found: {}", path.display());
        }
        return Ok(StrategyRegistry::new().with_config_path(path));
    }

    if RuntimeSettings::from_env().config_path.is_some() {
        return Ok(StrategyRegistry::new());
    }

    let Some(file) = StrategiesFile::discover().context("Failed to read strategies file")? else {
        tracing::debug!("No strategies file found, using built-in strategies");
        return Ok(StrategyRegistry::new());
    };

    let registry = match &file.path {
        Some(path) => {
            tracing::debug!("Using strategies file {}", path.display());
            StrategyRegistry::new().with_config_path(path)
        }
        None => StrategyRegistry::new(),
    };
    registry.load_strategies(&file).context("Failed to load strategies")?;
    Ok(registry)
}

fn list(registry: &StrategyRegistry) -> Result<()> {
    registry.populate().context("Failed to load strategies")?;

    for name in registry.list() {
        let strategy = registry.get_strategy(&name)?;
        let config = registry.strategy_config(&name);

        match config.filter(|c| !c.is_empty()) {
            Some(config) => println!(
                "{:<16} {} {}",
                name,
                strategy.description(),
                serde_json::to_string(config.as_map())?
            ),
            None => println!("{:<16} {}", name, strategy.description()),
        }
    }

    Ok(())
}

async fn extract(
    registry: Arc<StrategyRegistry>,
    paths: Vec<PathBuf>,
    strategy: String,
    language: String,
    overrides: Vec<String>,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let file: Arc<dyn FileFormat> = if paths.len() == 1 {
        load_file(&paths[0]).with_context(|| format!("Failed to load {}", paths[0].display()))?
    } else {
        Arc::new(load_pages(paths.as_slice()).context("Failed to load pages")?)
    };

    let mut options = ExtractOptions::new().with_language(language);

    if !overrides.is_empty() {
        let mut config = registry
            .get_strategy(&strategy)
            .map(|s| s.strategy_config())
            .unwrap_or_default();
        for raw in &overrides {
            let (key, value) = parse_override(raw)?;
            config.insert(key, value);
        }
        options = options.with_config(config);
    }

    let (callback, mut updates) = progress::channel();
    options = options.with_callback(callback);

    let reporter = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if quiet || update.state != PROGRESS {
                continue;
            }
            if let Some(status) = update.meta.get("status").and_then(Value::as_str) {
                eprintln!("[{}] {}", update.state, status);
            }
        }
    });

    let outcome = extract_with_strategy_async(Arc::clone(&registry), strategy.clone(), file, options).await;

    // Dropping the installed callback closes the channel and ends the reporter.
    if let Ok(strategy) = registry.get_strategy(&strategy) {
        strategy.set_update_state_callback(None);
        strategy.cleanup().ok();
    }
    reporter.await.ok();

    let result = outcome?;

    match format {
        OutputFormat::Text => println!("{}", result.text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    Ok(())
}

/// Parse `key=value`, reading the value as JSON when it parses and as a string otherwise.
fn parse_override(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid override '{}': expected KEY=VALUE", raw);
    };

    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid override '{}': empty key", raw);
    }

    let value = serde_json::from_str(value.trim()).unwrap_or_else(|_| Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}
