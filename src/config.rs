use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Chunking strategy: `fixed` (character windows) or `sentence`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_chunk_size")]
    pub target_chunk_size: usize,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            target_chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

fn default_strategy() -> String {
    "fixed".to_string()
}
fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}
fn default_max_chunk_size() -> usize {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Extensions eligible for indexing (lowercase, with leading dot).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Glob patterns (relative to the repository root) excluded from indexing.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude: Vec::new(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [".txt", ".md", ".docx", ".pdf", ".png", ".jpg", ".jpeg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config at `path` if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    let c = &config.chunking;
    match c.strategy.as_str() {
        "fixed" | "sentence" => {}
        other => anyhow::bail!(
            "Unknown chunking strategy: '{}'. Use fixed or sentence.",
            other
        ),
    }
    if c.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if c.overlap >= c.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }
    if c.target_chunk_size == 0 {
        anyhow::bail!("chunking.target_chunk_size must be > 0");
    }
    if c.max_chunk_size < c.target_chunk_size {
        anyhow::bail!("chunking.max_chunk_size must be >= chunking.target_chunk_size");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    for ext in &config.indexing.extensions {
        if !ext.starts_with('.') {
            anyhow::bail!(
                "indexing.extensions entries must start with a dot, got '{}'",
                ext
            );
        }
    }

    for pattern in &config.indexing.exclude {
        globset::Glob::new(pattern)
            .with_context(|| format!("invalid indexing.exclude pattern '{}'", pattern))?;
    }

    Ok(())
}
