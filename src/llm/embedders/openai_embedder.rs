use super::{parse_vector, Embedder};
use crate::constants::OPENAI_BASE_URL;
use crate::errors::Error;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// OpenAI embedder implementation that uses OpenAI's API to generate text embeddings
#[derive(Debug)]
pub struct OpenAIEmbedder {
    client: Client,
    /// OpenAI API key used for authentication
    api_key: String,
    /// Name of the OpenAI model to use for embeddings
    pub model: String,
}

impl OpenAIEmbedder {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    /// Embeds the given texts in one request using OpenAI's API
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "input": texts,
            "model": self.model
        });

        let res = self
            .client
            .post(format!("{}/embeddings", OPENAI_BASE_URL))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let txt = res.text().await?;
            return Err(Error::Llm(format!("Error from OpenAI: {}", txt)));
        }

        let json_resp: serde_json::Value = res.json().await?;
        let data = json_resp["data"]
            .as_array()
            .ok_or_else(|| Error::Llm("No embedding data in OpenAI response".to_string()))?;

        let mut indexed = data
            .iter()
            .map(|item| {
                let index = item["index"].as_u64().unwrap_or(0) as usize;
                parse_vector(&item["embedding"]).map(|v| (index, v))
            })
            .collect::<Result<Vec<_>, _>>()?;
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}
