//! Embedding providers.
//!
//! An [`Embedder`] maps texts to fixed-dimension vectors. The backend is
//! chosen once at startup through [`EmbedderKind`] and the resulting provider
//! is handed to whoever needs it; nothing here caches models globally.

use std::{fmt, str::FromStr};

use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    model_manager::ModelManager,
};

/// Default dimension of the hashing embedder.
pub const DEFAULT_HASHING_DIMENSION: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Maps text to fixed-dimension vectors.
///
/// `encode` returns one vector per input, in input order, and must be
/// deterministic for a fixed model.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    /// Output dimension. Zero when the provider is unavailable.
    fn dimension(&self) -> usize;

    fn is_available(&self) -> bool {
        true
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Encode a single text.
    fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[text.to_string()])?.pop().ok_or_else(|| {
            Error::embedding_unavailable("provider returned no vector")
        })
    }
}

/// Available embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbedderKind {
    /// ColBERT model, mean-pooled to one vector per text.
    Colbert,
    /// Deterministic feature hashing; needs no model download.
    Hashing,
}

impl fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EmbedderKind::Colbert => "colbert",
            EmbedderKind::Hashing => "hashing",
        })
    }
}

impl FromStr for EmbedderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "colbert" => Ok(EmbedderKind::Colbert),
            "hashing" | "hash" => Ok(EmbedderKind::Hashing),
            other => Err(Error::Config(format!(
                "unknown embedder '{other}' (expected 'colbert' or 'hashing')"
            ))),
        }
    }
}

/// Construct the provider for `kind`.
///
/// Loading never fails outright: a model that cannot be loaded yields a
/// provider whose [`Embedder::is_available`] is false.
pub fn load_embedder(kind: EmbedderKind, model_id: &str) -> Box<dyn Embedder> {
    match kind {
        EmbedderKind::Colbert => {
            Box::new(ModelManager::load(model_id.to_string()))
        }
        EmbedderKind::Hashing => {
            Box::new(HashingEmbedder::new(DEFAULT_HASHING_DIMENSION))
        }
    }
}

/// Signed feature hashing over lowercased alphanumeric tokens.
///
/// Each token is hashed with 64-bit FNV-1a; the hash picks a bucket and its
/// top bit picks the sign. Vectors are L2-normalized, so squared L2 distance
/// between two texts is `2 - 2 * cosine`.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hashing-{dimension}"),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.par_iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Scale `vector` to unit length. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
