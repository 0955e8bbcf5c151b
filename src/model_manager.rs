use candle_core::{Device, Tensor};
use pylate_rs::ColBERT;

use crate::error::{Error, Result};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "DOCWELL_MODEL";

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

/// Owns the ColBERT model used for every embedding call.
///
/// Construction is cheap; weights are fetched and loaded the first time
/// texts are encoded, so commands that never embed (`status`, loading an
/// existing index for inspection) never touch the network.
pub struct ModelManager {
    model: Option<ColBERT>,
    model_id: String,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelManager {
    /// Model from `DOCWELL_MODEL`, or [`DEFAULT_MODEL_ID`].
    pub fn new() -> Self {
        Self::resolve(None)
    }

    /// Model from `explicit` (the `--model` flag), then `DOCWELL_MODEL`,
    /// then [`DEFAULT_MODEL_ID`].
    pub fn resolve(explicit: Option<String>) -> Self {
        let env = std::env::var(MODEL_ENV_VAR).ok();
        Self::with_model_id(pick_model_id(explicit, env))
    }

    /// Use `model_id` (a hub ID or a local directory) regardless of the
    /// environment.
    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: None,
            model_id,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        if self.model.is_none() {
            tracing::info!(model = %self.model_id, "loading embedding model");
            let builder =
                ColBERT::from(&self.model_id).with_device(default_device());
            let colbert = ColBERT::try_from(builder).map_err(|e| {
                Error::Embedding(format!(
                    "failed to load model {}: {e}",
                    self.model_id
                ))
            })?;
            self.model = Some(colbert);
        }

        self.model
            .as_mut()
            .ok_or_else(|| Error::Embedding("model not loaded".to_string()))
    }

    /// Token-level embeddings for `texts`, shaped `[batch, tokens, dim]`.
    ///
    /// Queries go through this path too, so both sides of a search share
    /// one encoding.
    pub fn encode_documents(&mut self, texts: &[String]) -> Result<Tensor> {
        let model = self.ensure_loaded()?;
        model
            .encode(texts, false)
            .map_err(|e| Error::Embedding(format!("encoding failed: {e}")))
    }
}

fn pick_model_id(explicit: Option<String>, env: Option<String>) -> String {
    explicit
        .into_iter()
        .chain(env)
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string())
}
