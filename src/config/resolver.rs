use super::{ConfigSource, Parameter};
use crate::constants::ENV_PREFIX;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Read access to environment variables.
pub trait EnvSource: Debug + Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// Environment of the running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of variables, mostly useful in tests.
#[derive(Debug, Default, Clone)]
pub struct StaticEnv {
    vars: BTreeMap<String, String>,
}

impl StaticEnv {
    pub fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        StaticEnv {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for StaticEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Arguments given explicitly on the command line, keyed by their long (hyphenated) name.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    values: BTreeMap<String, Value>,
}

impl CliArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.replace('_', "-"), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Looks a parameter key up the way CLI flags are named: `foo_bar` as `foo-bar`,
    /// then the single-character short form `f`.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        let long = key.replace('_', "-");
        if let Some(value) = self.values.get(&long).filter(|v| !v.is_null()) {
            return Some(value);
        }
        let short = key.chars().next()?.to_string();
        self.values.get(&short).filter(|v| !v.is_null())
    }
}

/// Name of the environment variable that can override `key`.
pub fn env_var_name(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.to_uppercase().replace(['.', '-'], "_"))
}

/// Walks a dot separated path through nested mappings.
///
/// A literal key containing dots wins over traversal. Missing keys, non-mapping
/// intermediates and null values all yield `None`.
pub fn lookup_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = root.get(path) {
        return (!value.is_null()).then_some(value);
    }

    let mut segments = path.split('.');
    let mut current = root.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

/// Tries `{scope}.{key}` before `key` within a single mapping.
pub fn scoped_lookup<'a>(
    root: &'a Map<String, Value>,
    key: &str,
    task_scope: Option<&str>,
) -> Option<&'a Value> {
    if let Some(scope) = task_scope {
        if let Some(value) = lookup_path(root, &format!("{}.{}", scope, key)) {
            return Some(value);
        }
    }
    lookup_path(root, key)
}

/// The lower tiers a parameter can be resolved from.
#[derive(Debug, Clone, Copy)]
pub struct ParameterSources<'a> {
    pub cli: &'a CliArgs,
    pub env: &'a dyn EnvSource,
    pub env_settings: &'a Map<String, Value>,
    pub base_settings: &'a Map<String, Value>,
}

/// Resolves `key` through CLI, workflow, environment variable, environment settings,
/// base settings and finally `default`. The first tier with a value wins.
pub fn resolve(
    sources: &ParameterSources<'_>,
    key: &str,
    workflow_params: &Map<String, Value>,
    task_scope: Option<&str>,
    default: Value,
) -> Parameter {
    if let Some(value) = sources.cli.lookup(key) {
        return Parameter::new(value.clone(), ConfigSource::CliArgument);
    }

    if let Some(value) = scoped_lookup(workflow_params, key, task_scope) {
        return Parameter::new(value.clone(), ConfigSource::Workflow);
    }

    if let Some(value) = sources.env.var(&env_var_name(key)) {
        return Parameter::new(Value::String(value), ConfigSource::EnvironmentVariable);
    }

    if let Some(value) = scoped_lookup(sources.env_settings, key, task_scope) {
        return Parameter::new(value.clone(), ConfigSource::EnvironmentSettings);
    }

    if let Some(value) = scoped_lookup(sources.base_settings, key, task_scope) {
        return Parameter::new(value.clone(), ConfigSource::BaseSettings);
    }

    Parameter::new(default, ConfigSource::Default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_precedence_each_tier_wins_over_lower() {
        let base = object(json!({"timeout": 1}));
        let env_settings = object(json!({"timeout": 2}));
        let workflow = object(json!({"timeout": 4}));
        let env = StaticEnv::new([("NBG_TIMEOUT", "3")]);
        let cli = CliArgs::new();

        let sources = ParameterSources {
            cli: &cli,
            env: &env,
            env_settings: &env_settings,
            base_settings: &base,
        };
        let param = resolve(&sources, "timeout", &workflow, None, json!(0));
        assert_eq!(param, Parameter::new(json!(4), ConfigSource::Workflow));

        let param = resolve(&sources, "timeout", &Map::new(), None, json!(0));
        assert_eq!(
            param,
            Parameter::new(json!("3"), ConfigSource::EnvironmentVariable)
        );

        let empty_env = StaticEnv::default();
        let sources = ParameterSources {
            env: &empty_env,
            ..sources
        };
        let param = resolve(&sources, "timeout", &Map::new(), None, json!(0));
        assert_eq!(
            param,
            Parameter::new(json!(2), ConfigSource::EnvironmentSettings)
        );

        let empty = Map::new();
        let sources = ParameterSources {
            env_settings: &empty,
            ..sources
        };
        let param = resolve(&sources, "timeout", &Map::new(), None, json!(0));
        assert_eq!(param, Parameter::new(json!(1), ConfigSource::BaseSettings));

        let sources = ParameterSources {
            base_settings: &empty,
            ..sources
        };
        let param = resolve(&sources, "timeout", &Map::new(), None, json!(0));
        assert_eq!(param, Parameter::new(json!(0), ConfigSource::Default));

        let mut cli = CliArgs::new();
        cli.insert("timeout", "9");
        let sources = ParameterSources {
            cli: &cli,
            env: &env,
            env_settings: &env_settings,
            base_settings: &base,
        };
        let param = resolve(&sources, "timeout", &workflow, None, json!(0));
        assert_eq!(param, Parameter::new(json!("9"), ConfigSource::CliArgument));
    }

    #[test]
    fn test_scoped_key_tried_before_plain_key_in_same_tier() {
        let base = object(json!({
            "max_concurrent": 3,
            "content_fetching": {"max_concurrent": 8}
        }));
        let empty = Map::new();
        let cli = CliArgs::new();
        let env = StaticEnv::default();
        let sources = ParameterSources {
            cli: &cli,
            env: &env,
            env_settings: &empty,
            base_settings: &base,
        };

        let scoped = resolve(&sources, "max_concurrent", &empty, Some("content_fetching"), json!(1));
        assert_eq!(scoped.value, json!(8));

        let other = resolve(&sources, "max_concurrent", &empty, Some("feed_collection"), json!(1));
        assert_eq!(other.value, json!(3));
        assert_eq!(other.source, ConfigSource::BaseSettings);
    }

    #[test]
    fn test_scoped_lookup_does_not_cross_tiers() {
        let env_settings = object(json!({"nr_topics": 5}));
        let base = object(json!({"topic_selection": {"nr_topics": 9}}));
        let cli = CliArgs::new();
        let env = StaticEnv::default();
        let sources = ParameterSources {
            cli: &cli,
            env: &env,
            env_settings: &env_settings,
            base_settings: &base,
        };

        let param = resolve(&sources, "nr_topics", &Map::new(), Some("topic_selection"), json!(1));
        assert_eq!(
            param,
            Parameter::new(json!(5), ConfigSource::EnvironmentSettings)
        );
    }

    #[test]
    fn test_dot_traversal_never_fails_on_bad_paths() {
        let root = object(json!({
            "a": {"b": {"c": 1}},
            "scalar": 3,
            "list": [1, 2],
            "nothing": null
        }));

        assert_eq!(lookup_path(&root, "a.b.c"), Some(&json!(1)));
        assert_eq!(lookup_path(&root, "a.b.missing"), None);
        assert_eq!(lookup_path(&root, "scalar.deeper"), None);
        assert_eq!(lookup_path(&root, "list.0"), None);
        assert_eq!(lookup_path(&root, "nothing"), None);
        assert_eq!(lookup_path(&root, ""), None);
        assert_eq!(lookup_path(&root, "a..b"), None);
    }

    #[test]
    fn test_env_var_presence_matches_even_when_empty() {
        let env = StaticEnv::new([("NBG_USER_AGENT", "")]);
        let empty = Map::new();
        let cli = CliArgs::new();
        let sources = ParameterSources {
            cli: &cli,
            env: &env,
            env_settings: &empty,
            base_settings: &empty,
        };
        let param = resolve(&sources, "user_agent", &empty, None, json!("agent"));
        assert_eq!(
            param,
            Parameter::new(json!(""), ConfigSource::EnvironmentVariable)
        );
    }

    #[test]
    fn test_cli_lookup_uses_hyphens_then_short_flag() {
        let mut cli = CliArgs::new();
        cli.insert("base-url-ollama", "http://gpu:11434");
        cli.insert("n", "4");

        assert_eq!(cli.lookup("base_url_ollama"), Some(&json!("http://gpu:11434")));
        assert_eq!(cli.lookup("nr_topics"), Some(&json!("4")));
        assert_eq!(cli.lookup("timeout"), None);
    }

    #[test]
    fn test_env_var_name_normalizes_key() {
        assert_eq!(env_var_name("foo_bar"), "NBG_FOO_BAR");
        assert_eq!(env_var_name("ollama.base_url"), "NBG_OLLAMA_BASE_URL");
        assert_eq!(env_var_name("base-url-ollama"), "NBG_BASE_URL_OLLAMA");
    }
}
