use crate::config::{resolve_openai_api_key, ConfigManager, TaskConfig};
use crate::errors::Error;
use crate::llm::{LlmClient, OllamaProvider, OpenAiProvider, ProviderKind};
use serde_json::Value;
use std::sync::Arc;

use tracing::{debug, warn};

/// Picks the language model client for one task.
///
/// Without an `llm` block the workflow default is shared. An Ollama block without
/// `base_url` inherits the default's URL when the default also talks to Ollama. An
/// OpenAI block always takes its key from the secrets chain. Unknown provider types
/// fall back to the default with a warning.
///
/// # Errors
/// Fails when a provider cannot be built, e.g. missing model or OpenAI key.
pub fn bind_task_llm(
    config: &TaskConfig,
    default_llm: Option<&Arc<LlmClient>>,
    conf: &ConfigManager,
) -> Result<Option<Arc<LlmClient>>, Error> {
    let Some(llm_config) = &config.llm_config else {
        return Ok(default_llm.cloned());
    };

    let kind = match llm_config.provider_type.parse::<ProviderKind>() {
        Ok(kind) => kind,
        Err(_) => {
            warn!(
                "Unknown LLM type {} for task {}, using default LLM",
                llm_config.provider_type, config.name
            );
            return Ok(default_llm.cloned());
        }
    };

    let mut params = llm_config.params.clone();
    let client = match kind {
        ProviderKind::Ollama => {
            if !params.contains_key("base_url") {
                if let Some(url) = default_llm
                    .filter(|llm| llm.kind() == ProviderKind::Ollama)
                    .and_then(|llm| llm.base_url())
                {
                    params.insert("base_url".to_string(), Value::String(url.to_string()));
                }
            }
            LlmClient::new(OllamaProvider::from_params(&params)?)
        }
        ProviderKind::OpenAi => {
            params.remove("api_key");
            let api_key = resolve_openai_api_key(conf)?;
            LlmClient::new(OpenAiProvider::from_params(&params, &api_key))
        }
    };

    debug!("Task {} bound to {}", config.name, client);
    Ok(Some(Arc::new(client)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, StaticEnv};
    use serde_json::{json, Map};

    fn conf(env: StaticEnv) -> ConfigManager {
        ConfigManager::from_settings(Map::new(), Map::new(), CliArgs::new()).with_env(env)
    }

    fn llm_block(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_without_block_shares_default_instance() {
        let default = Arc::new(LlmClient::new(OllamaProvider::new(
            "http://gpu:11434",
            "llama3.1",
        )));
        let config = TaskConfig::new("t", "topic_selection");
        let bound = bind_task_llm(&config, Some(&default), &conf(StaticEnv::default()))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&bound, &default));
    }

    #[test]
    fn test_ollama_block_inherits_base_url() {
        let default = Arc::new(LlmClient::new(OllamaProvider::new(
            "http://gpu:11434",
            "llama3.1",
        )));
        let config = TaskConfig::new("t", "topic_selection")
            .with_llm("ollama", llm_block(json!({"model": "qwen2.5"})));
        let bound = bind_task_llm(&config, Some(&default), &conf(StaticEnv::default()))
            .unwrap()
            .unwrap();
        assert!(!Arc::ptr_eq(&bound, &default));
        assert_eq!(bound.model(), "qwen2.5");
        assert_eq!(bound.base_url(), Some("http://gpu:11434"));
    }

    #[test]
    fn test_unknown_type_falls_back_to_default() {
        let default = Arc::new(LlmClient::new(OllamaProvider::new("http://x", "m")));
        let config = TaskConfig::new("t", "topic_selection")
            .with_llm("mystery", llm_block(json!({"model": "z"})));
        let bound = bind_task_llm(&config, Some(&default), &conf(StaticEnv::default()))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&bound, &default));
    }

    #[test]
    fn test_openai_key_comes_from_secrets() {
        let config = TaskConfig::new("t", "topic_selection").with_llm(
            "openai",
            llm_block(json!({"model": "gpt-4o-mini", "api_key": "literal"})),
        );
        let missing = bind_task_llm(&config, None, &conf(StaticEnv::default()));
        assert!(matches!(missing, Err(Error::MissingSecret(_))));

        let env = StaticEnv::new([("NBG_OPENAI_API_KEY", "sk-test")]);
        let bound = bind_task_llm(&config, None, &conf(env)).unwrap().unwrap();
        assert_eq!(bound.kind(), ProviderKind::OpenAi);
        assert_eq!(bound.model(), "gpt-4o-mini");
    }
}
