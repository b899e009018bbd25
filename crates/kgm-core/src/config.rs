//! kgmerge Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with defaults matching the resolver's tuned thresholds.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Entity resolver thresholds and feature flags
    pub resolver: ResolverConfig,

    /// Parallel reduction settings
    pub merge: MergeConfig,

    /// LLM provider configuration (arbitration layer)
    pub llm: LlmConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply every variable `lookup` reports as set, whatever its value
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Resolver
        if let Some(value) = lookup("KGM_JACCARD_THRESHOLD") {
            self.resolver.jaccard_threshold = parse_env("KGM_JACCARD_THRESHOLD", value)?;
        }
        if let Some(value) = lookup("KGM_ENABLE_ARBITRATION") {
            self.resolver.enable_arbitration = parse_env("KGM_ENABLE_ARBITRATION", value)?;
        }

        // Merge
        if let Some(value) = lookup("KGM_MAX_WORKERS") {
            self.merge.max_workers = parse_env("KGM_MAX_WORKERS", value)?;
        }

        // LLM
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(value) = lookup("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("LLM_TIMEOUT_SECS", value)?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(value) = lookup("LOG_JSON") {
            self.logging.json_format = parse_env("LOG_JSON", value)?;
        }

        Ok(self)
    }

    /// Reject values the resolver cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.resolver;
        if !(0.0..=1.0).contains(&r.jaccard_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "resolver.jaccard_threshold".to_string(),
                value: r.jaccard_threshold.to_string(),
            });
        }
        if r.entropy_threshold < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "resolver.entropy_threshold".to_string(),
                value: r.entropy_threshold.to_string(),
            });
        }
        if r.shingle_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "resolver.shingle_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.merge.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "merge.max_workers".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Entity resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum 3-gram Jaccard similarity for a fuzzy (Layer 2) merge
    pub jaccard_threshold: f64,

    /// Minimum label entropy, in bits, to enter fuzzy matching
    pub entropy_threshold: f64,

    /// Labels shorter than this...
    pub min_label_length: usize,

    /// ...and with fewer tokens than this skip fuzzy matching
    pub min_token_count: usize,

    /// Character n-gram size
    pub shingle_size: usize,

    /// Run the batched LLM arbitration layer
    pub enable_arbitration: bool,

    /// Cap on merged definitions (characters)
    pub definition_max_chars: usize,

    /// Joins distinct definitions of a group
    pub definition_separator: String,

    /// Definition prefix sent to the arbitrator (characters)
    pub arbitration_snippet_chars: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            jaccard_threshold: 0.9,
            entropy_threshold: 1.5,
            min_label_length: 6,
            min_token_count: 2,
            shingle_size: 3,
            enable_arbitration: true,
            definition_max_chars: 500,
            definition_separator: " | ".to_string(),
            arbitration_snippet_chars: 120,
        }
    }
}

/// Parallel reduction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Upper bound on concurrent pairwise merges per round
    pub max_workers: usize,

    /// Tag used to make chunk-local ids global (`{prefix}{i}_`)
    pub chunk_prefix: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            chunk_prefix: "c".to_string(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
