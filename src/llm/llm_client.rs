use crate::config::{resolve_openai_api_key, ConfigManager};
use crate::constants::*;
use crate::errors::Error;
use crate::llm::providers::{
    LlmProvider, LlmResponse, OllamaProvider, OpenAiProvider, ProviderKind, TokenUsage,
};
use crate::llm::ChatMessage;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info};

/// Generic LLM client that delegates work to a concrete provider.
#[derive(Debug)]
pub struct LlmClient {
    provider: Box<dyn LlmProvider>,
}

impl LlmClient {
    pub fn new(provider: impl LlmProvider + 'static) -> Self {
        LlmClient {
            provider: Box::new(provider),
        }
    }

    /// Builds the workflow-wide default client from settings.
    ///
    /// `llm_provider` picks the provider (default "ollama"). The Ollama base URL can be
    /// overridden with `--base-url-ollama` or `NBG_BASE_URL_OLLAMA`; the OpenAI key comes
    /// from the secrets chain.
    ///
    /// # Errors
    /// Returns an error for an unknown provider or a missing OpenAI key.
    pub fn from_settings(conf: &ConfigManager) -> Result<Self, Error> {
        let provider_name = conf
            .get_str("llm_provider")
            .unwrap_or_else(|| DEFAULT_LLM_PROVIDER.to_string());

        let client = match provider_name.parse::<ProviderKind>()? {
            ProviderKind::Ollama => {
                let base_url = conf
                    .get_param("base_url_ollama", &Map::new(), None, Value::Null)
                    .value
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| conf.get_str("ollama.base_url"))
                    .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string());
                let model = conf
                    .get_str("ollama.model")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());

                LlmClient::new(
                    OllamaProvider::new(&base_url, &model)
                        .with_option("num_ctx", setting_u64(conf, "ollama.num_ctx", DEFAULT_NUM_CTX))
                        .with_option(
                            "num_predict",
                            setting_u64(conf, "ollama.num_predict", DEFAULT_NUM_PREDICT),
                        )
                        .with_option(
                            "temperature",
                            setting_f64(conf, "ollama.temperature", DEFAULT_TEMPERATURE),
                        ),
                )
            }
            ProviderKind::OpenAi => {
                let api_key = resolve_openai_api_key(conf)?;
                let model = conf
                    .get_str("openai.model")
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
                LlmClient::new(
                    OpenAiProvider::new(&api_key, &model)
                        .with_temperature(setting_f64(conf, "openai.temperature", DEFAULT_TEMPERATURE))
                        .with_max_tokens(setting_u64(conf, "openai.max_tokens", DEFAULT_MAX_TOKENS)),
                )
            }
        };

        info!("Default LLM: {}", client);
        Ok(client)
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.provider.base_url()
    }

    /// Builds the message list for a single turn.
    pub fn prepare_prompts(human: &str, system: Option<&str>) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(human));
        messages
    }

    /// Sends the messages to the provider and returns its response.
    pub async fn generate(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse, Error> {
        if messages.is_empty() {
            return Err(Error::Llm("Cannot call the LLM without messages".to_string()));
        }
        self.provider.call_llm_api(messages).await
    }

    /// Calls the LLM with format validation and automatic retries if format check fails.
    ///
    /// # Arguments
    /// * `messages` - Conversation so far; retry instructions are appended to it
    /// * `validate_response` - Function to validate response format
    /// * `format_reminder` - Format instructions to include in retry attempts
    /// * `max_attempts` - Maximum number of calls
    ///
    /// # Returns
    /// * `Result<LlmResponse, Error>` - Validated response with usage summed over attempts
    pub async fn generate_with_format_check<F>(
        &self,
        messages: &mut Vec<ChatMessage>,
        validate_response: F,
        format_reminder: &str,
        max_attempts: usize,
    ) -> Result<LlmResponse, Error>
    where
        F: Fn(&str) -> bool,
    {
        let mut attempts = 0;
        let mut usage = TokenUsage::default();

        loop {
            attempts += 1;
            let response = self.generate(messages.clone()).await?;
            usage += response.usage;
            debug!("LLM response: {}", response.content);

            if validate_response(&response.content) {
                return Ok(LlmResponse {
                    content: response.content,
                    usage,
                });
            } else if attempts >= max_attempts {
                info!(
                    "LLM did not follow the format after {} attempts response: {}",
                    max_attempts, response.content
                );
                return Err(Error::Llm(format!(
                    "LLM did not follow the format after {} attempts",
                    max_attempts
                )));
            } else {
                let retry_message = format!(
                    "Your last answer did not follow the required format.\n\
                     {} \n\
                     Please provide a new answer following exactly these formatting rules.",
                    format_reminder
                );
                messages.push(ChatMessage::new("assistant", &response.content));
                messages.push(ChatMessage::user(&retry_message));
            }
        }
    }
}

impl fmt::Display for LlmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base_url() {
            Some(url) => write!(f, "{}:{} @ {}", self.kind(), self.model(), url),
            None => write!(f, "{}:{}", self.kind(), self.model()),
        }
    }
}

fn setting_u64(conf: &ConfigManager, key: &str, default: u64) -> u64 {
    conf.get(key, Value::Null).as_u64().unwrap_or(default)
}

fn setting_f64(conf: &ConfigManager, key: &str, default: f64) -> f64 {
    conf.get(key, Value::Null).as_f64().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, StaticEnv};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct ScriptedProvider {
        replies: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Ollama
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn call_llm_api(&self, _messages: Vec<ChatMessage>) -> Result<LlmResponse, Error> {
            let reply = self.replies.lock().unwrap().remove(0);
            Ok(LlmResponse {
                content: reply.to_string(),
                usage: TokenUsage::new(10, 5),
            })
        }
    }

    fn settings(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_ollama_from_settings() {
        let conf = ConfigManager::from_settings(
            settings(json!({"ollama": {"base_url": "http://box:11434", "model": "qwen2.5"}})),
            Map::new(),
            CliArgs::new(),
        )
        .with_env(StaticEnv::default());

        let client = LlmClient::from_settings(&conf).unwrap();
        assert_eq!(client.kind(), ProviderKind::Ollama);
        assert_eq!(client.base_url(), Some("http://box:11434"));
        assert_eq!(client.model(), "qwen2.5");
    }

    #[test]
    fn test_cli_base_url_overrides_settings() {
        let mut cli = CliArgs::new();
        cli.insert("base-url-ollama", "http://cli:11434");
        let conf = ConfigManager::from_settings(
            settings(json!({"ollama": {"base_url": "http://box:11434"}})),
            Map::new(),
            cli,
        )
        .with_env(StaticEnv::default());

        let client = LlmClient::from_settings(&conf).unwrap();
        assert_eq!(client.base_url(), Some("http://cli:11434"));
    }

    #[test]
    fn test_openai_default_requires_key() {
        let conf = ConfigManager::from_settings(
            settings(json!({"llm_provider": "openai"})),
            Map::new(),
            CliArgs::new(),
        )
        .with_env(StaticEnv::default());
        assert!(matches!(
            LlmClient::from_settings(&conf),
            Err(Error::MissingSecret(_))
        ));
    }

    #[tokio::test]
    async fn test_format_check_retries_until_valid() {
        let client = LlmClient::new(ScriptedProvider {
            replies: Mutex::new(vec!["sure, here you go", "[a, b]"]),
        });
        let mut messages = LlmClient::prepare_prompts("pick", Some("system"));

        let response = client
            .generate_with_format_check(&mut messages, |r| r.starts_with('['), "use brackets", 3)
            .await
            .unwrap();

        assert_eq!(response.content, "[a, b]");
        assert_eq!(response.usage.total_tokens, 30);
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn test_format_check_gives_up() {
        let client = LlmClient::new(ScriptedProvider {
            replies: Mutex::new(vec!["no", "still no"]),
        });
        let mut messages = LlmClient::prepare_prompts("pick", None);
        let result = client
            .generate_with_format_check(&mut messages, |r| r.starts_with('['), "use brackets", 2)
            .await;
        assert!(result.is_err());
    }
}
