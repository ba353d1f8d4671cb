use super::{param_f64, param_str, param_u64, LlmProvider, LlmResponse, ProviderKind, TokenUsage};
use crate::constants::{DEFAULT_OPENAI_MODEL, OPENAI_BASE_URL};
use crate::errors::Error;
use crate::llm::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

/// Provider implementation for OpenAI's API
#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    /// Model identifier to use (e.g. "gpt-4o-mini")
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        OpenAiProvider {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Builds a provider from an `llm` block. The key is always passed separately
    /// so it never has to appear in workflow files.
    pub fn from_params(params: &Map<String, Value>, api_key: &str) -> Self {
        let model = param_str(params, "model").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        OpenAiProvider {
            temperature: param_f64(params, "temperature"),
            max_tokens: param_u64(params, "max_tokens"),
            ..OpenAiProvider::new(api_key, &model)
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    /// Calls OpenAI's chat completions API
    async fn call_llm_api(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse, Error> {
        let mut request_body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(temperature) = self.temperature {
            request_body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request_body["max_tokens"] = json!(max_tokens);
        }

        let res = self
            .client
            .post(format!("{}/chat/completions", OPENAI_BASE_URL))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !res.status().is_success() {
            let text = res.text().await?;
            return Err(Error::Llm(format!("OpenAI API error: {}", text)));
        }

        let json_resp: Value = res.json().await?;
        let content = json_resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Llm("No content in OpenAI LLM response".to_string()))?;

        let usage = &json_resp["usage"];
        Ok(LlmResponse {
            content: content.trim().to_string(),
            usage: TokenUsage {
                input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
                output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
                total_tokens: usage["total_tokens"].as_u64().unwrap_or(0),
            },
        })
    }
}
