use super::{parse_vector, Embedder};
use crate::errors::Error;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// Embedder backed by Ollama's `/api/embed` endpoint
#[derive(Debug)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    /// Embedding model, e.g. "nomic-embed-text"
    pub model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Self {
        OllamaEmbedder {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let res = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let txt = res.text().await?;
            return Err(Error::Llm(format!("Error from Ollama: {}", txt)));
        }

        let json_resp: serde_json::Value = res.json().await?;
        let vectors = json_resp["embeddings"]
            .as_array()
            .ok_or_else(|| Error::Llm("No embeddings in Ollama response".to_string()))?
            .iter()
            .map(parse_vector)
            .collect::<Result<Vec<_>, _>>()?;

        if vectors.len() != texts.len() {
            return Err(Error::Llm(format!(
                "Expected {} embeddings, received {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}
