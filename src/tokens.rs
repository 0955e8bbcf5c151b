//! Token counting for chunk budgets.
//!
//! The embedding model's own tokenizer is preferred. When it cannot be
//! loaded (offline, unknown model, no `tokenizer.json`) counting falls
//! back to a generic approximation of four characters per token.

use std::path::Path;

use tokenizers::Tokenizer;

/// Approximate characters per token for English text.
const CHARS_PER_TOKEN: usize = 4;

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Counts tokens in a piece of text.
pub enum TokenCounter {
    /// A model-specific tokenizer.
    Model(Box<Tokenizer>),
    /// Character-based estimate.
    Approximate,
}

impl TokenCounter {
    /// Load the tokenizer for `model_id`, falling back to
    /// [`TokenCounter::Approximate`] on any failure.
    ///
    /// Local model directories are read directly; anything else is treated
    /// as a HuggingFace Hub model ID and fetched through the hub cache.
    pub fn for_model(model_id: &str) -> Self {
        match load_tokenizer(model_id) {
            Ok(tokenizer) => {
                tracing::debug!(model = model_id, "using model tokenizer");
                Self::Model(Box::new(tokenizer))
            }
            Err(reason) => {
                tracing::warn!(
                    model = model_id,
                    %reason,
                    "tokenizer unavailable, approximating token counts"
                );
                Self::Approximate
            }
        }
    }

    /// Number of tokens in `text`.
    ///
    /// # Examples
    ///
    /// ```
    /// use docwell::tokens::TokenCounter;
    ///
    /// let counter = TokenCounter::Approximate;
    /// assert_eq!(counter.count(""), 0);
    /// assert_eq!(counter.count("abcd"), 1);
    /// assert_eq!(counter.count("abcde"), 2);
    /// ```
    pub fn count(&self, text: &str) -> usize {
        match self {
            Self::Model(tokenizer) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.get_ids().len(),
                Err(_) => approximate(text),
            },
            Self::Approximate => approximate(text),
        }
    }

    pub fn is_model_specific(&self) -> bool {
        matches!(self, Self::Model(_))
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model(_) => f.write_str("TokenCounter::Model"),
            Self::Approximate => f.write_str("TokenCounter::Approximate"),
        }
    }
}

fn approximate(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn load_tokenizer(model_id: &str) -> Result<Tokenizer, String> {
    let local = Path::new(model_id);
    let path = if local.is_dir() {
        local.join(TOKENIZER_FILE)
    } else {
        let api =
            hf_hub::api::sync::Api::new().map_err(|e| e.to_string())?;
        api.model(model_id.to_string())
            .get(TOKENIZER_FILE)
            .map_err(|e| e.to_string())?
    };

    Tokenizer::from_file(&path).map_err(|e| e.to_string())
}
