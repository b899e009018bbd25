//! kgmerge Core - Graph model, error types, and shared traits
//!
//! This crate defines the abstractions shared by the merge pipeline:
//! - Chunk-graph model (entities, relationships, token usage)
//! - Common error types
//! - The LLM client trait used by the arbitration layer
//! - Configuration management

pub mod config;
pub mod graph;

pub use config::{
    AppConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig, MergeConfig, ResolverConfig,
};
pub use graph::{
    validate_entity_ids, ChunkResult, Entity, Importance, KnowledgeGraph, MergedResult,
    Relationship, TokenUsage,
};

use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for merge operations
#[derive(Error, Debug)]
pub enum KgmError {
    #[error("Duplicate entity id {id} ({context})")]
    DuplicateEntityId { id: String, context: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Arbitration error: {0}")]
    Arbitration(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for KgmError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KgmError>;

// ============================================================================
// LLM Client
// ============================================================================

/// Trait for LLM completion backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response for a single user prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier, used in log fields
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
