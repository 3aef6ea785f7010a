//! Token counting utilities
//!
//! Prompt budgets are measured with tiktoken-rs. Model names the tokenizer
//! table does not know fall back to `o200k_base`.

use delve_core::{DelveError, DelveResult, ErrorContext};
use std::sync::{Arc, OnceLock};
use tiktoken_rs::{get_bpe_from_model, o200k_base, CoreBPE};
use tracing::{debug, warn};

/// Encoding used when no model-specific table is available
pub const DEFAULT_ENCODING: &str = "o200k_base";

/// Token counter for one encoding
pub struct TokenCounter {
    encoder: CoreBPE,
    encoding_name: String,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding_name", &self.encoding_name)
            .finish_non_exhaustive()
    }
}

impl TokenCounter {
    /// Counter using the default `o200k_base` encoding
    pub fn new() -> DelveResult<Self> {
        let encoder = o200k_base().map_err(|e| encoder_error(DEFAULT_ENCODING, &e.to_string()))?;
        Ok(Self {
            encoder,
            encoding_name: DEFAULT_ENCODING.to_string(),
        })
    }

    /// Counter for a specific model, falling back to the default encoding
    pub fn for_model(model_name: &str) -> DelveResult<Self> {
        match get_bpe_from_model(model_name) {
            Ok(encoder) => Ok(Self {
                encoder,
                encoding_name: model_name.to_string(),
            }),
            Err(e) => {
                warn!(
                    model = model_name,
                    error = %e,
                    "No tokenizer table for model, falling back to {}",
                    DEFAULT_ENCODING
                );
                Self::new()
            }
        }
    }

    /// Process-wide counter for the default encoding.
    ///
    /// Building the BPE tables is expensive, so this is built once and
    /// shared.
    pub fn shared() -> DelveResult<Arc<Self>> {
        static SHARED: OnceLock<Arc<TokenCounter>> = OnceLock::new();

        if let Some(counter) = SHARED.get() {
            return Ok(Arc::clone(counter));
        }

        debug!("Building shared {} token counter", DEFAULT_ENCODING);
        let counter = Arc::new(Self::new()?);
        Ok(Arc::clone(SHARED.get_or_init(|| counter)))
    }

    /// Count tokens in a text string
    pub fn count_tokens(&self, text: &str) -> usize {
        self.encoder.encode_with_special_tokens(text).len()
    }

    /// Count tokens in multiple text strings
    pub fn count_tokens_batch(&self, texts: &[String]) -> Vec<usize> {
        texts.iter().map(|text| self.count_tokens(text)).collect()
    }

    pub fn fits(&self, text: &str, max_tokens: usize) -> bool {
        self.count_tokens(text) <= max_tokens
    }

    pub fn encoding_name(&self) -> &str {
        &self.encoding_name
    }
}

fn encoder_error(name: &str, message: &str) -> DelveError {
    DelveError::Config {
        message: format!("Failed to load tokenizer {}: {}", name, message),
        source: None,
        context: ErrorContext::new("token_counter").with_operation("load_encoder"),
    }
}
