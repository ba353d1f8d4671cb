use super::{
    deep_merge, load_settings_file, lookup_path, resolve, CliArgs, EnvSource, Parameter,
    ParameterSources, ProcessEnv,
};
use crate::constants::{DEFAULT_ENVIRONMENT, ENVIRONMENT_ENV};
use crate::errors::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A configured news feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

/// Layered settings: `settings.yaml` overlaid by `settings.{environment}.yaml`,
/// with the parameter resolution chain on top.
#[derive(Debug)]
pub struct ConfigManager {
    config_dir: PathBuf,
    environment: String,
    base_settings: Map<String, Value>,
    env_settings: Map<String, Value>,
    merged_settings: Map<String, Value>,
    url_to_feedname: HashMap<String, String>,
    cli_args: CliArgs,
    env: Box<dyn EnvSource>,
}

impl ConfigManager {
    /// Loads settings from `config_dir`.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing `settings.yaml`
    /// * `environment` - Environment name; falls back to `NBG_ENVIRONMENT`, then `development`
    /// * `cli_args` - Arguments given on the command line
    ///
    /// # Errors
    /// Fails if `settings.yaml` is missing or either settings file is malformed.
    pub fn load(
        config_dir: &Path,
        environment: Option<&str>,
        cli_args: CliArgs,
    ) -> Result<Self, Error> {
        let environment = environment
            .map(str::to_string)
            .or_else(|| std::env::var(ENVIRONMENT_ENV).ok())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        let base_settings = load_settings_file(&config_dir.join("settings.yaml"), true)?;
        let env_settings = load_settings_file(
            &config_dir.join(format!("settings.{}.yaml", environment)),
            false,
        )?;

        let mut manager = Self::from_settings(base_settings, env_settings, cli_args);
        manager.config_dir = config_dir.to_path_buf();
        manager.environment = environment;
        Ok(manager)
    }

    /// Builds a manager from already parsed settings.
    pub fn from_settings(
        base_settings: Map<String, Value>,
        env_settings: Map<String, Value>,
        cli_args: CliArgs,
    ) -> Self {
        let mut merged_settings = base_settings.clone();
        deep_merge(&mut merged_settings, &env_settings);

        let mut manager = ConfigManager {
            config_dir: PathBuf::from("."),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            base_settings,
            env_settings,
            merged_settings,
            url_to_feedname: HashMap::new(),
            cli_args,
            env: Box::new(ProcessEnv),
        };
        manager.rebuild_feed_names();
        manager
    }

    /// Replaces the environment variable source.
    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn cli_args(&self) -> &CliArgs {
        &self.cli_args
    }

    /// Reads an environment variable through the configured source.
    pub fn env_var(&self, name: &str) -> Option<String> {
        self.env.var(name)
    }

    /// Reads a merged setting, bypassing the precedence chain.
    pub fn get(&self, key: &str, default: Value) -> Value {
        lookup_path(&self.merged_settings, key)
            .cloned()
            .unwrap_or(default)
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        lookup_path(&self.merged_settings, key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Overrides a merged setting, creating intermediate mappings as needed.
    pub fn set(&mut self, key: &str, value: Value) {
        let mut segments: Vec<&str> = key.split('.').collect();
        let Some(last) = segments.pop() else {
            return;
        };
        let mut current = &mut self.merged_settings;
        for segment in segments {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.to_string(), value);
    }

    /// Resolves a parameter through the full precedence chain.
    ///
    /// # Arguments
    /// * `key` - Parameter name
    /// * `workflow_params` - The task's workflow level parameters
    /// * `task_scope` - Task name used for `{task}.{key}` lookups
    /// * `default` - Value used when no tier has one
    pub fn get_param(
        &self,
        key: &str,
        workflow_params: &Map<String, Value>,
        task_scope: Option<&str>,
        default: Value,
    ) -> Parameter {
        let sources = ParameterSources {
            cli: &self.cli_args,
            env: self.env.as_ref(),
            env_settings: &self.env_settings,
            base_settings: &self.base_settings,
        };
        let param = resolve(&sources, key, workflow_params, task_scope, default);
        debug!(key, source = %param.source, "resolved parameter");
        param
    }

    /// Feeds listed under the `feeds` setting; malformed entries are skipped.
    pub fn feeds(&self) -> Vec<FeedSource> {
        let Some(Value::Array(entries)) = lookup_path(&self.merged_settings, "feeds") else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| match serde_json::from_value(entry.clone()) {
                Ok(feed) => Some(feed),
                Err(e) => {
                    warn!("Ignoring malformed feed entry {}: {}", entry, e);
                    None
                }
            })
            .collect()
    }

    /// Replaces the configured feeds, e.g. with the contents of an OPML file.
    pub fn override_feeds(&mut self, feeds: Vec<FeedSource>) {
        let value = serde_json::to_value(&feeds).unwrap_or(Value::Array(Vec::new()));
        self.base_settings.insert("feeds".to_string(), value.clone());
        self.merged_settings.insert("feeds".to_string(), value);
        self.rebuild_feed_names();
    }

    /// Maps a feed URL to its configured name, falling back to the URL's host.
    pub fn url_to_feedname(&self, url: &str) -> String {
        if let Some(name) = self.url_to_feedname.get(url) {
            return name.clone();
        }
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string())
    }

    fn rebuild_feed_names(&mut self) {
        self.url_to_feedname = self
            .feeds()
            .into_iter()
            .map(|feed| (feed.url, feed.name))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, StaticEnv};
    use serde_json::json;
    use std::fs;

    fn write_configs(base: &str, env: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.yaml"), base).unwrap();
        if let Some(env) = env {
            fs::write(dir.path().join("settings.development.yaml"), env).unwrap();
        }
        dir
    }

    #[test]
    fn test_environment_file_overrides_base_for_get() {
        let dir = write_configs(
            "database:\n  path: base.db\nlogging:\n  level: info\n",
            Some("database:\n  path: dev.db\n"),
        );
        let conf = ConfigManager::load(dir.path(), Some("development"), CliArgs::new()).unwrap();

        assert_eq!(conf.get("database.path", Value::Null), json!("dev.db"));
        assert_eq!(conf.get("logging.level", Value::Null), json!("info"));
        assert_eq!(conf.get("missing.key", json!(7)), json!(7));
    }

    #[test]
    fn test_get_param_reports_settings_tier() {
        let dir = write_configs(
            "timeout: 10\nfeed_collection:\n  timeout: 20\n",
            Some("timeout: 30\n"),
        );
        let conf = ConfigManager::load(dir.path(), Some("development"), CliArgs::new())
            .unwrap()
            .with_env(StaticEnv::default());

        let param = conf.get_param("timeout", &Map::new(), Some("feed_collection"), json!(1));
        assert_eq!(param.value, json!(30));
        assert_eq!(param.source, ConfigSource::EnvironmentSettings);

        let conf = conf.with_env(StaticEnv::new([("NBG_TIMEOUT", "45")]));
        let param = conf.get_param("timeout", &Map::new(), Some("feed_collection"), json!(1));
        assert_eq!(param.value, json!("45"));
        assert_eq!(param.source, ConfigSource::EnvironmentVariable);
    }

    #[test]
    fn test_override_feeds_updates_name_lookup() {
        let dir = write_configs(
            "feeds:\n  - name: Example\n    url: https://example.com/rss\n",
            None,
        );
        let mut conf =
            ConfigManager::load(dir.path(), Some("development"), CliArgs::new()).unwrap();
        assert_eq!(conf.url_to_feedname("https://example.com/rss"), "Example");

        conf.override_feeds(vec![FeedSource {
            name: "Other".to_string(),
            url: "https://other.org/feed".to_string(),
        }]);
        assert_eq!(conf.feeds().len(), 1);
        assert_eq!(conf.url_to_feedname("https://other.org/feed"), "Other");
        assert_eq!(conf.url_to_feedname("https://example.com/rss"), "example.com");
    }

    #[test]
    fn test_set_creates_nested_keys() {
        let mut conf = ConfigManager::from_settings(Map::new(), Map::new(), CliArgs::new());
        conf.set("ollama.base_url", json!("http://gpu:11434"));
        assert_eq!(conf.get_str("ollama.base_url").as_deref(), Some("http://gpu:11434"));
    }
}
