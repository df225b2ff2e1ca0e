use std::sync::Mutex;

use candle_core::{Device, Tensor};
use pylate_rs::ColBERT;

use crate::{
    embedding::{Embedder, l2_normalize},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "DOCVEC_MODEL";

/// Text encoded once at load time to learn the output dimension.
const DIMENSION_PROBE: &str = "dimension probe";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

enum ModelState {
    Ready {
        model: Mutex<ColBERT>,
        dimension: usize,
    },
    Failed(String),
}

/// ColBERT-backed embedding provider.
///
/// The model is loaded eagerly by [`ModelManager::load`]; its per-token
/// embeddings are mean-pooled into one L2-normalized vector per text. If the
/// model cannot be loaded the manager stays usable but reports itself as
/// unavailable and every `encode` call fails with [`Error::Unavailable`].
pub struct ModelManager {
    model_id: String,
    state: ModelState,
}

impl ModelManager {
    /// Load `model_id` (HuggingFace ID or local path), downloading it if
    /// needed.
    pub fn load(model_id: String) -> Self {
        let mut manager = Self::unavailable(model_id, "not loaded");
        manager.state = match manager.try_load() {
            Ok((model, dimension)) => {
                tracing::info!(
                    model = %manager.model_id,
                    dimension,
                    "embedding model loaded"
                );
                ModelState::Ready {
                    model: Mutex::new(model),
                    dimension,
                }
            }
            Err(e) => {
                tracing::warn!(
                    model = %manager.model_id,
                    "embedding model unavailable: {e}"
                );
                ModelState::Failed(e.to_string())
            }
        };
        manager
    }

    /// A manager that never loaded a model.
    pub fn unavailable(model_id: String, reason: impl Into<String>) -> Self {
        Self {
            model_id,
            state: ModelState::Failed(reason.into()),
        }
    }

    /// Why the model is unavailable, if it is.
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            ModelState::Ready { .. } => None,
            ModelState::Failed(reason) => Some(reason),
        }
    }

    fn try_load(&self) -> Result<(ColBERT, usize)> {
        let mut colbert: ColBERT = ColBERT::from(&self.model_id)
            .with_device(default_device())
            .try_into()
            .map_err(|e| Error::embedding_unavailable(format!("{e}")))?;

        let probe = colbert
            .encode(&[DIMENSION_PROBE.to_string()], false)
            .map_err(|e| Error::embedding_unavailable(format!("{e}")))?;
        let (_, _, dimension) = probe.dims3().map_err(|e| {
            Error::embedding_unavailable(format!(
                "unexpected embedding tensor shape: {e}"
            ))
        })?;

        Ok((colbert, dimension))
    }
}

impl Embedder for ModelManager {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        match &self.state {
            ModelState::Ready { dimension, .. } => *dimension,
            ModelState::Failed(_) => 0,
        }
    }

    fn is_available(&self) -> bool {
        matches!(self.state, ModelState::Ready { .. })
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = match &self.state {
            ModelState::Ready { model, .. } => model,
            ModelState::Failed(reason) => {
                return Err(Error::embedding_unavailable(reason.clone()));
            }
        };
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = {
            let mut model = model.lock().map_err(|_| {
                Error::embedding_unavailable("model lock poisoned")
            })?;
            model
                .encode(texts, false)
                .map_err(|e| Error::embedding_unavailable(format!("{e}")))?
        };

        mean_pool(&embeddings)
    }
}

/// Pool a `[batch, tokens, dimension]` tensor into `batch` unit vectors.
fn mean_pool(embeddings: &Tensor) -> Result<Vec<Vec<f32>>> {
    let mut pooled = embeddings
        .mean(1)
        .and_then(|t| t.to_vec2::<f32>())
        .map_err(|e| {
            Error::embedding_unavailable(format!(
                "failed to pool token embeddings: {e}"
            ))
        })?;
    for vector in &mut pooled {
        l2_normalize(vector);
    }
    Ok(pooled)
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_id", &self.model_id)
            .field("available", &self.is_available())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_manager_reports_reason() {
        let manager =
            ModelManager::unavailable("custom/model".to_string(), "offline");
        assert_eq!(manager.model_id(), "custom/model");
        assert!(!manager.is_available());
        assert_eq!(manager.dimension(), 0);
        assert_eq!(manager.failure(), Some("offline"));
    }

    #[test]
    fn unavailable_manager_refuses_to_encode() {
        let manager =
            ModelManager::unavailable(DEFAULT_MODEL_ID.to_string(), "offline");
        let err = manager.encode(&["text".to_string()]).unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn mean_pool_averages_tokens() {
        // batch of 1, 2 tokens, 2 dims: mean is (2, 0) -> unit (1, 0)
        let tensor = Tensor::from_vec(
            vec![1.0f32, 0.0, 3.0, 0.0],
            (1, 2, 2),
            &Device::Cpu,
        )
        .unwrap();
        let pooled = mean_pool(&tensor).unwrap();
        assert_eq!(pooled, vec![vec![1.0, 0.0]]);
    }
}
