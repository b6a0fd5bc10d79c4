//! Text encoders.
//!
//! - `Encoder`: the seam everything else talks to
//! - `EmbeddingModel`: fastembed sentence encoder, loaded eagerly
//! - `LazyEmbeddingModel`: same model, loaded on first `encode`
//!
//! The hashing fallback lives in `hashing.rs`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fastembed::{InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};

use crate::semantic::hashing::{HashEncoder, HASHING_MODEL};

/// Turns text into a fixed-length vector.
pub trait Encoder: Send + Sync {
    /// Model name as configured.
    fn name(&self) -> &str;

    /// Length of every vector `encode` returns.
    fn dimensions(&self) -> usize;

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Identifier of the vector space, stored with persisted vectors.
    fn model_id(&self) -> [u8; 32] {
        model_id_hash(self.name())
    }
}

/// Identifies which encoder produced a set of vectors. Vectors from
/// different spaces are never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingSpace {
    pub model_id: [u8; 32],
    pub dimensions: usize,
}

impl EmbeddingSpace {
    pub fn of(encoder: &dyn Encoder) -> Self {
        Self {
            model_id: encoder.model_id(),
            dimensions: encoder.dimensions(),
        }
    }
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Stored vectors were built by a different model; rebuild the index")]
    SpaceMismatch,
}

/// SHA256 of the model name.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Build the encoder named in config. `"hashing"` selects the offline
/// feature-hashing encoder; anything else must be a known fastembed model,
/// downloaded to `<cache_dir>/models` the first time it is used.
pub fn encoder_for(
    model_name: &str,
    hash_dimensions: usize,
    cache_dir: PathBuf,
) -> Result<Arc<dyn Encoder>, EmbeddingError> {
    if model_name.eq_ignore_ascii_case(HASHING_MODEL) {
        return Ok(Arc::new(HashEncoder::new(hash_dimensions)?));
    }
    Ok(Arc::new(LazyEmbeddingModel::new(model_name, cache_dir)?))
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Load the model, downloading it into `cache_dir/models` if not cached.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let known = parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(known.model)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        log::info!("loaded embedding model {}", known.name);

        Ok(Self {
            model: Mutex::new(model),
            model_name: known.name.to_string(),
            dimensions: known.dimensions,
        })
    }
}

impl Encoder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))?;

        if embedding.len() != self.dimensions {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "expected {} dimensions, model returned {}",
                self.dimensions,
                embedding.len()
            )));
        }
        Ok(embedding)
    }
}

/// fastembed model that is only loaded when the first text is encoded.
///
/// Name and dimensions are known up front, so the vector space can be
/// compared against stored vectors without touching the model files.
pub struct LazyEmbeddingModel {
    model_name: String,
    dimensions: usize,
    cache_dir: PathBuf,
    /// Uses Mutex<Option<_>> instead of OnceLock because get_or_try_init is unstable.
    model: Mutex<Option<EmbeddingModel>>,
}

impl LazyEmbeddingModel {
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let known = parse_model_name(model_name)?;
        Ok(Self {
            model_name: known.name.to_string(),
            dimensions: known.dimensions,
            cache_dir,
            model: Mutex::new(None),
        })
    }
}

impl Encoder for LazyEmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut guard = self.model.lock().map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        if guard.is_none() {
            log::info!("initializing embedding model {}", self.model_name);
            *guard = Some(EmbeddingModel::new(&self.model_name, self.cache_dir.clone())?);
        }

        match guard.as_ref() {
            Some(model) => model.encode(text),
            None => Err(EmbeddingError::InitFailed("model not loaded".to_string())),
        }
    }
}

/// A fastembed model as resolved from its configured name.
struct KnownModel {
    /// Canonical spelling; the vector space is keyed on it, so aliases and
    /// case variants share stored vectors.
    name: &'static str,
    model: fastembed::EmbeddingModel,
    dimensions: usize,
}

/// Resolve a configured model name, ignoring case and punctuation aliases.
fn parse_model_name(name: &str) -> Result<KnownModel, EmbeddingError> {
    use fastembed::EmbeddingModel as M;

    let (canonical, model, dimensions) = match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => ("all-MiniLM-L6-v2", M::AllMiniLML6V2, 384),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => ("all-MiniLM-L6-v2-q", M::AllMiniLML6V2Q, 384),
        "bge-small-en-v1.5" | "bgesmallenv15" => ("bge-small-en-v1.5", M::BGESmallENV15, 384),
        "bge-small-en-v1.5-q" | "bgesmallenv15q" => ("bge-small-en-v1.5-q", M::BGESmallENV15Q, 384),
        "bge-base-en-v1.5" | "bgebaseenv15" => ("bge-base-en-v1.5", M::BGEBaseENV15, 768),
        "bge-base-en-v1.5-q" | "bgebaseenv15q" => ("bge-base-en-v1.5-q", M::BGEBaseENV15Q, 768),
        "bge-large-en-v1.5" | "bgelargeenv15" => ("bge-large-en-v1.5", M::BGELargeENV15, 1024),
        "bge-large-en-v1.5-q" | "bgelargeenv15q" => ("bge-large-en-v1.5-q", M::BGELargeENV15Q, 1024),
        _ => {
            return Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5 (add -q suffix for quantized), hashing",
                name
            )))
        }
    };

    Ok(KnownModel {
        name: canonical,
        model,
        dimensions,
    })
}
