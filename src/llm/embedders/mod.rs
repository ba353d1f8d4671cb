/// Module for Ollama embedder implementation
pub mod ollama_embedder;
/// Module for OpenAI embedder implementation
pub mod openai_embedder;

use crate::config::{resolve_openai_api_key, ConfigManager};
use crate::constants::DEFAULT_OLLAMA_BASE_URL;
use crate::errors::Error;
use crate::llm::ProviderKind;
use async_trait::async_trait;
use std::fmt::Debug;

pub use ollama_embedder::*;
pub use openai_embedder::*;

/// Trait defining interface for text embedding functionality
#[async_trait]
pub trait Embedder: Debug + Send + Sync {
    /// Embeds every text, returning one vector per input in the same order.
    ///
    /// # Arguments
    ///
    /// * `texts` - The texts to embed
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error>;
}

/// Builds an embedder for `provider` using the connection settings of the default LLM.
pub fn embedder_for(
    provider: ProviderKind,
    model: &str,
    conf: &ConfigManager,
) -> Result<Box<dyn Embedder>, Error> {
    match provider {
        ProviderKind::Ollama => {
            let base_url = conf
                .get_str("ollama.base_url")
                .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string());
            Ok(Box::new(OllamaEmbedder::new(&base_url, model)))
        }
        ProviderKind::OpenAi => {
            let api_key = resolve_openai_api_key(conf)?;
            Ok(Box::new(OpenAIEmbedder::new(&api_key, model)))
        }
    }
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, Error> {
    let arr = value
        .as_array()
        .ok_or_else(|| Error::Llm("No embedding".to_string()))?;
    Ok(arr
        .iter()
        .filter_map(|x| x.as_f64())
        .map(|x| x as f32)
        .collect())
}
