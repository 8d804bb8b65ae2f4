//! Token estimates for prompt budgeting.

use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use crate::error::ContextorError;

/// Counts tokens the way the completion model would (approximately).
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// BPE counter backed by `tiktoken-rs`.
///
/// Estimates can run a few tokens below what the provider bills; the
/// default input budget leaves room for that.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Encoder for `model`, or `cl100k_base` if the model is unknown.
    ///
    /// # Errors
    /// Returns [`ContextorError::Tokenizer`] if no encoder can be loaded.
    pub fn for_model(model: &str) -> Result<Self, ContextorError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => {
                debug!(%model, "tokenizer resolved from model");
                bpe
            }
            Err(e) => {
                warn!(%model, error = %e, "unknown model for tokenizer, using cl100k_base");
                tiktoken_rs::cl100k_base().map_err(|e| ContextorError::Tokenizer(e.to_string()))?
            }
        };
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}
