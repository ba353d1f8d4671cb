use super::{param_str, LlmProvider, LlmResponse, ProviderKind, TokenUsage};
use crate::errors::Error;
use crate::llm::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

/// Provider implementation for Ollama's chat API
#[derive(Debug)]
pub struct OllamaProvider {
    client: Client,
    /// Server root, e.g. "http://localhost:11434"
    base_url: String,
    /// Model identifier to use (e.g. "llama3.1", "qwen2.5")
    model: String,
    /// Sampling and context options forwarded verbatim (num_ctx, temperature, ...)
    options: Map<String, Value>,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str) -> Self {
        OllamaProvider {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Builds a provider from an `llm` block.
    ///
    /// `base_url` and `model` are required; every other key becomes a model option.
    ///
    /// # Errors
    /// Returns an error if `base_url` or `model` is missing.
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, Error> {
        let base_url = param_str(params, "base_url")
            .ok_or_else(|| Error::Llm("Ollama requires a base_url".to_string()))?;
        let model = param_str(params, "model")
            .ok_or_else(|| Error::Llm("Ollama requires a model".to_string()))?;

        let mut provider = OllamaProvider::new(&base_url, &model);
        for (key, value) in params {
            if key != "base_url" && key != "model" {
                provider.options.insert(key.clone(), value.clone());
            }
        }
        Ok(provider)
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.base_url)
    }

    /// Calls Ollama's `/api/chat` endpoint without streaming
    async fn call_llm_api(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse, Error> {
        let request_body = json!({
            "model": self.model,
            "stream": false,
            "messages": messages,
            "options": self.options,
        });

        let res = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request_body)
            .send()
            .await?;

        if !res.status().is_success() {
            let text = res.text().await?;
            return Err(Error::Llm(format!("Ollama API error: {}", text)));
        }

        let json_resp: Value = res.json().await?;
        let content = json_resp["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Llm("No content in Ollama LLM response".to_string()))?;

        Ok(LlmResponse {
            content: content.trim().to_string(),
            usage: TokenUsage::new(
                json_resp["prompt_eval_count"].as_u64().unwrap_or(0),
                json_resp["eval_count"].as_u64().unwrap_or(0),
            ),
        })
    }
}
