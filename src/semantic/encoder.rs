//! Embedding model wrapper for fastembed.
//!
//! Provides a high-level interface for generating embeddings:
//! - Model download to a local cache directory on first use
//! - Batch embedding generation
//! - A narrow trait boundary so tests can substitute a deterministic
//!   encoder

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("compute backend unavailable: {0}")]
    BackendInit(String),

    #[error("model initialization failed: {0}")]
    InitFailed(String),

    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("invalid model name: {0}")]
    InvalidModel(String),
}

/// Text to fixed-length vector.
///
/// All vectors produced by one encoder instance share the same length,
/// reported by `dimensions()`.
pub trait TextEncoder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts, one vector per input,
    /// order-preserving. Empty input returns empty output.
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError>;

    /// Generate an embedding for a single text.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let embeddings = self.encode_batch(&[text.to_string()])?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EncoderError::EmbeddingFailed("no embedding returned".to_string()))
    }
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct FastembedEncoder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl FastembedEncoder {
    /// Create a new encoder with the given model name.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Model files are cached in the `models/` subdirectory of `cache_dir`.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EncoderError> {
        let model_enum = Self::parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EncoderError::BackendInit(format!("failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EncoderError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Get the model name
    pub fn name(&self) -> &str {
        &self.model_name
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EncoderError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
            }
            "all-minilm-l6-v2-q" | "allminiml6v2q" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q)
            }
            "bge-small-en-v1.5" | "bgesmallenv15" => {
                Ok(fastembed::EmbeddingModel::BGESmallENV15)
            }
            "bge-small-en-v1.5-q" | "bgesmallenv15q" => {
                Ok(fastembed::EmbeddingModel::BGESmallENV15Q)
            }
            "bge-base-en-v1.5" | "bgebaseenv15" => {
                Ok(fastembed::EmbeddingModel::BGEBaseENV15)
            }
            "bge-base-en-v1.5-q" | "bgebaseenv15q" => {
                Ok(fastembed::EmbeddingModel::BGEBaseENV15Q)
            }
            "bge-large-en-v1.5" | "bgelargeenv15" => {
                Ok(fastembed::EmbeddingModel::BGELargeENV15)
            }
            "bge-large-en-v1.5-q" | "bgelargeenv15q" => {
                Ok(fastembed::EmbeddingModel::BGELargeENV15Q)
            }
            _ => Err(EncoderError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5 (add -q suffix for quantized)",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EncoderError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EncoderError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EncoderError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl TextEncoder for FastembedEncoder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EncoderError::EmbeddingFailed(format!("failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EncoderError::EmbeddingFailed(e.to_string()))
    }
}
