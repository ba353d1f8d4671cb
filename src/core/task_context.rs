use super::WorkflowData;
use crate::config::{ConfigManager, Parameter};
use crate::db::{BriefingRepository, Database};
use crate::errors::Error;
use crate::llm::LlmClient;
use crate::utils::LoggerManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a task may touch while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub db: Database,
    pub conf: Arc<ConfigManager>,
    pub logger_manager: Arc<LoggerManager>,
    /// Workflow level parameters; review edits are written back here
    pub params: Map<String, Value>,
    /// Every parameter resolved so far, with the tier it came from
    pub param_sources: BTreeMap<String, Parameter>,
    /// Outputs of the tasks that already succeeded in this run
    pub workflow_data: WorkflowData,
    pub llm: Option<Arc<LlmClient>>,
}

impl TaskContext {
    pub fn new(
        db: Database,
        conf: Arc<ConfigManager>,
        logger_manager: Arc<LoggerManager>,
        params: Map<String, Value>,
        llm: Option<Arc<LlmClient>>,
    ) -> Self {
        TaskContext {
            db,
            conf,
            logger_manager,
            params,
            param_sources: BTreeMap::new(),
            workflow_data: WorkflowData::new(),
            llm,
        }
    }

    pub fn with_workflow_data(mut self, workflow_data: WorkflowData) -> Self {
        self.workflow_data = workflow_data;
        self
    }

    /// Resolves `name` through the precedence chain and records where it came from.
    pub fn get_parameter(&mut self, scope: &str, name: &str, default: Value) -> Value {
        let param = self
            .conf
            .get_param(name, &self.params, Some(scope), default);
        let value = param.value.clone();
        self.param_sources.insert(name.to_string(), param);
        value
    }

    /// Typed variant of [`TaskContext::get_parameter`].
    ///
    /// String values that do not fit `T` directly (environment variables, review edits)
    /// are reparsed as YAML scalars, so `"30"` satisfies an integer parameter.
    pub fn parameter<T>(&mut self, scope: &str, name: &str, default: T) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned,
    {
        let value = self.get_parameter(scope, name, serde_json::to_value(&default)?);
        convert_parameter(name, value)
    }

    /// Runs `f` against the repository on a pooled connection released before returning.
    pub fn with_repository<R>(
        &self,
        f: impl FnOnce(&mut BriefingRepository<'_>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut conn = self.db.get_conn()?;
        let mut repo = BriefingRepository::new(&mut conn);
        f(&mut repo)
    }

    /// The bound language model client.
    pub fn llm(&self) -> Result<&Arc<LlmClient>, Error> {
        self.llm
            .as_ref()
            .ok_or_else(|| Error::Validation("No LLM is bound to this task".to_string()))
    }

    /// Briefing to work on: the `briefing_id` parameter, else the newest one an upstream
    /// task published.
    pub fn briefing_id(&mut self, scope: &str) -> Result<Option<String>, Error> {
        let explicit: Option<String> = self.parameter(scope, "briefing_id", None)?;
        Ok(explicit
            .filter(|id| !id.is_empty())
            .or_else(|| self.workflow_data.latest_briefing_id().map(str::to_string)))
    }
}

fn convert_parameter<T: DeserializeOwned>(name: &str, value: Value) -> Result<T, Error> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(converted) => Ok(converted),
        Err(first_err) => {
            let reparsed = match &value {
                Value::String(raw) => serde_yaml::from_str::<Value>(raw).ok(),
                _ => None,
            };
            reparsed
                .and_then(|v| serde_json::from_value::<T>(v).ok())
                .ok_or_else(|| Error::ParameterConversion {
                    key: name.to_string(),
                    message: first_err.to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, ConfigSource, StaticEnv};
    use serde_json::json;

    fn context(env: StaticEnv, params: Map<String, Value>) -> TaskContext {
        let base = json!({"max_articles": 10, "summaries": {"max_articles": 12}});
        let conf = ConfigManager::from_settings(
            base.as_object().cloned().unwrap_or_default(),
            Map::new(),
            CliArgs::new(),
        )
        .with_env(env);
        TaskContext::new(
            Database::new(":memory:").unwrap(),
            Arc::new(conf),
            Arc::new(LoggerManager::detached()),
            params,
            None,
        )
    }

    #[test]
    fn test_parameter_records_source() {
        let mut ctx = context(StaticEnv::default(), Map::new());
        let value: u64 = ctx.parameter("summaries", "max_articles", 5).unwrap();
        assert_eq!(value, 12);
        assert_eq!(
            ctx.param_sources["max_articles"].source,
            ConfigSource::BaseSettings
        );

        let missing: u64 = ctx.parameter("summaries", "nr_topics", 7).unwrap();
        assert_eq!(missing, 7);
        assert_eq!(ctx.param_sources["nr_topics"].source, ConfigSource::Default);
    }

    #[test]
    fn test_string_values_are_reparsed() {
        let env = StaticEnv::new([("NBG_MAX_ARTICLES", "42")]);
        let mut ctx = context(env, Map::new());
        let value: u64 = ctx.parameter("other", "max_articles", 1).unwrap();
        assert_eq!(value, 42);

        let mut params = Map::new();
        params.insert("threshold".into(), json!("not a number"));
        let mut ctx = context(StaticEnv::default(), params);
        let err = ctx.parameter::<f64>("other", "threshold", 0.5).unwrap_err();
        assert!(matches!(err, Error::ParameterConversion { .. }));
    }

    #[test]
    fn test_briefing_id_falls_back_to_upstream_output() {
        let mut ctx = context(StaticEnv::default(), Map::new());
        assert_eq!(ctx.briefing_id("render").unwrap(), None);

        ctx.workflow_data.insert(
            "fetch",
            super::super::TaskData::ContentFetching {
                briefing_id: "b-1".into(),
                feeds_scraped: vec![],
            },
        );
        assert_eq!(ctx.briefing_id("render").unwrap().as_deref(), Some("b-1"));

        ctx.params.insert("briefing_id".into(), json!("b-0"));
        assert_eq!(ctx.briefing_id("render").unwrap().as_deref(), Some("b-0"));
    }
}
