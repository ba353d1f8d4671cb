use super::ConfigManager;
use crate::constants::{OPENAI_API_KEY_ENV, OPENAI_API_KEY_SETTING};
use crate::errors::Error;

/// Resolves the OpenAI API key from `NBG_OPENAI_API_KEY`, then the `openai.api_key` setting.
pub fn resolve_openai_api_key(conf: &ConfigManager) -> Result<String, Error> {
    resolve_secret(conf, OPENAI_API_KEY_ENV, OPENAI_API_KEY_SETTING).ok_or_else(|| {
        Error::MissingSecret(
            "OpenAI API key not found in environment or configuration".to_string(),
        )
    })
}

fn resolve_secret(conf: &ConfigManager, env_name: &str, setting: &str) -> Option<String> {
    conf.env_var(env_name)
        .filter(|v| !v.is_empty())
        .or_else(|| conf.get_str(setting).filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, StaticEnv};
    use serde_json::json;

    #[test]
    fn test_environment_wins_over_settings() {
        let settings = json!({"openai": {"api_key": "from-settings"}})
            .as_object()
            .cloned()
            .unwrap();
        let conf = ConfigManager::from_settings(settings, Default::default(), CliArgs::new())
            .with_env(StaticEnv::new([("NBG_OPENAI_API_KEY", "from-env")]));
        assert_eq!(resolve_openai_api_key(&conf).unwrap(), "from-env");

        let conf = conf.with_env(StaticEnv::default());
        assert_eq!(resolve_openai_api_key(&conf).unwrap(), "from-settings");
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let conf = ConfigManager::from_settings(Default::default(), Default::default(), CliArgs::new())
            .with_env(StaticEnv::default());
        let err = resolve_openai_api_key(&conf).unwrap_err();
        assert_eq!(
            err.to_string(),
            "OpenAI API key not found in environment or configuration"
        );
    }
}
