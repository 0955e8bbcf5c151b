use std::sync::Mutex;

use candle_core::Tensor;
use kdam::{BarExt, tqdm};

use crate::{
    error::{Error, Result},
    model_manager::ModelManager,
    tokens::TokenCounter,
};

/// Maps text to fixed-dimension dense vectors.
///
/// Implementations must return one vector per input text, with the same
/// dimensionality for every call made during a process lifetime.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Token counter matching the model's tokenizer, used to size chunks.
    fn token_counter(&self) -> TokenCounter {
        TokenCounter::Approximate
    }
}

/// Dense embedder backed by a ColBERT model.
///
/// Per-token embeddings are mean-pooled into a single L2-normalised vector
/// per text. Queries and documents are encoded the same way so they share
/// one vector space.
pub struct ColbertEmbedder {
    model: Mutex<ModelManager>,
    model_id: String,
}

impl ColbertEmbedder {
    pub fn new(model: ModelManager) -> Self {
        let model_id = model.model_id().to_string();
        Self {
            model: Mutex::new(model),
            model_id,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl Embedder for ColbertEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::Embedding("model lock poisoned".to_string()))?;
        let embeddings = model.encode_documents(texts)?;
        pool_token_embeddings(&embeddings)
    }

    fn token_counter(&self) -> TokenCounter {
        TokenCounter::for_model(&self.model_id)
    }
}

impl std::fmt::Debug for ColbertEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColbertEmbedder")
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

/// Convert a `[batch, tokens, dimension]` tensor into one pooled vector per
/// batch row.
fn pool_token_embeddings(embeddings: &Tensor) -> Result<Vec<Vec<f32>>> {
    let rows = embeddings.to_vec3::<f32>().map_err(|e| {
        Error::Embedding(format!("unexpected embedding tensor shape: {e}"))
    })?;
    Ok(rows.iter().map(|tokens| mean_pool(tokens)).collect())
}

/// Average the non-padding token vectors and L2-normalise the result.
///
/// Rows that are entirely zero are treated as padding. If every row is
/// padding the zero vector is returned.
///
/// # Examples
///
/// ```
/// use docwell::embedding::mean_pool;
///
/// let pooled = mean_pool(&[vec![3.0, 0.0], vec![0.0, 0.0], vec![3.0, 8.0]]);
/// assert_eq!(pooled, vec![0.6, 0.8]);
/// ```
pub fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let dimension = tokens.first().map_or(0, Vec::len);
    let mut sum = vec![0.0f32; dimension];
    let mut counted = 0usize;

    for token in tokens {
        if token.iter().all(|v| *v == 0.0) {
            continue;
        }
        for (acc, v) in sum.iter_mut().zip(token) {
            *acc += v;
        }
        counted += 1;
    }

    if counted == 0 {
        return sum;
    }
    for v in &mut sum {
        *v /= counted as f32;
    }

    let norm = sum.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut sum {
            *v /= norm;
        }
    }
    sum
}

/// Embed `texts` in batches of `batch_size`, with a progress bar on stderr.
///
/// Verifies that the embedder returned one vector per text and that every
/// vector has the same dimensionality.
pub fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut progress = tqdm!(total = texts.len(), desc = "Embedding");
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = embedder.embed(batch)?;
        if embedded.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                embedded.len(),
                batch.len()
            )));
        }
        vectors.extend(embedded);
        progress.update(batch.len())?;
    }
    eprintln!();

    if let Some(first) = vectors.first() {
        let dimension = first.len();
        if dimension == 0 {
            return Err(Error::Embedding(
                "embedder returned zero-length vectors".to_string(),
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
    }

    Ok(vectors)
}
