use crate::constants::DEFAULT_MAX_REVIEW_RERUNS;
use crate::errors::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::info;

/// Non-default language model binding of a task (`llm:` block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider family, e.g. "ollama" or "openai"
    #[serde(rename = "type")]
    pub provider_type: String,
    /// Remaining keys, passed to the provider constructor
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Unique within its workflow
    pub name: String,
    /// Key into the task registry
    pub task_type: String,
    /// Tasks that must have succeeded earlier in the list
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Workflow level parameter overrides
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, rename = "llm")]
    pub llm_config: Option<LlmConfig>,
    #[serde(default)]
    pub human_review: bool,
    /// Upper bound on review re-runs; zero selects the default bound
    #[serde(default)]
    pub max_retries: usize,
}

impl TaskConfig {
    pub fn new(name: &str, task_type: &str) -> Self {
        TaskConfig {
            name: name.to_string(),
            task_type: task_type.to_string(),
            depends_on: Vec::new(),
            params: Map::new(),
            llm_config: None,
            human_review: false,
            max_retries: 0,
        }
    }

    pub fn depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_llm(mut self, provider_type: &str, params: Map<String, Value>) -> Self {
        self.llm_config = Some(LlmConfig {
            provider_type: provider_type.to_string(),
            params,
        });
        self
    }

    pub fn with_human_review(mut self, max_retries: usize) -> Self {
        self.human_review = true;
        self.max_retries = max_retries;
        self
    }

    /// How many times a reviewer may ask for a re-run.
    pub fn rerun_bound(&self) -> usize {
        if self.max_retries == 0 {
            DEFAULT_MAX_REVIEW_RERUNS
        } else {
            self.max_retries
        }
    }
}

/// A named, ordered list of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub tasks: Vec<TaskConfig>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkflowEntry {
    Tasks(Vec<TaskConfig>),
    Definition(WorkflowDefinition),
}

/// Loads every workflow from a YAML document with a top level `workflows` mapping.
///
/// # Errors
///
/// Returns `InvalidWorkflowDocument` if the file lacks the `workflows` key or any
/// workflow cannot be parsed.
pub fn load_workflows(path: &Path) -> Result<BTreeMap<String, WorkflowDefinition>, Error> {
    if !path.exists() {
        return Err(Error::ConfigFileNotFound(path.display().to_string()));
    }
    let yaml_str = fs::read_to_string(path)?;
    let workflows = parse_workflows(&yaml_str, &path.display().to_string())?;
    info!(
        "Loaded {} workflow(s) from {}",
        workflows.len(),
        path.display()
    );
    Ok(workflows)
}

/// Parses workflow definitions from YAML text; `origin` names the source in errors.
pub fn parse_workflows(
    yaml_str: &str,
    origin: &str,
) -> Result<BTreeMap<String, WorkflowDefinition>, Error> {
    let invalid = |message: String| Error::InvalidWorkflowDocument {
        path: origin.to_string(),
        message,
    };

    let document: serde_yaml::Value =
        serde_yaml::from_str(yaml_str).map_err(|e| invalid(e.to_string()))?;
    let workflows = document
        .get("workflows")
        .cloned()
        .ok_or_else(|| invalid("missing top-level 'workflows' key".to_string()))?;

    let entries: BTreeMap<String, WorkflowEntry> =
        serde_yaml::from_value(workflows).map_err(|e| invalid(e.to_string()))?;

    Ok(entries
        .into_iter()
        .map(|(name, entry)| {
            let definition = match entry {
                WorkflowEntry::Tasks(tasks) => WorkflowDefinition { tasks },
                WorkflowEntry::Definition(definition) => definition,
            };
            (name, definition)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
workflows:
  daily:
    tasks:
      - name: collect
        task_type: feed_collection
        params:
          timeout: 20
      - name: select
        task_type: topic_selection
        depends_on: [collect]
        human_review: true
        max_retries: 2
        llm:
          type: ollama
          model: qwen2.5
          temperature: 0.1
  short:
    - name: render
      task_type: briefing_html_generation
"#;

    #[test]
    fn test_parse_both_workflow_shapes() {
        let workflows = parse_workflows(DOCUMENT, "inline").unwrap();
        assert_eq!(workflows.len(), 2);

        let daily = &workflows["daily"];
        assert_eq!(daily.tasks.len(), 2);
        assert_eq!(daily.tasks[0].params["timeout"], Value::from(20));
        let select = &daily.tasks[1];
        assert_eq!(select.depends_on, vec!["collect".to_string()]);
        assert!(select.human_review);
        assert_eq!(select.rerun_bound(), 2);
        let llm = select.llm_config.as_ref().unwrap();
        assert_eq!(llm.provider_type, "ollama");
        assert_eq!(llm.params["model"], Value::from("qwen2.5"));
        assert!(!llm.params.contains_key("type"));

        assert_eq!(workflows["short"].tasks[0].rerun_bound(), DEFAULT_MAX_REVIEW_RERUNS);
    }

    #[test]
    fn test_missing_top_level_key_is_rejected() {
        let err = parse_workflows("pipelines:\n  a: []\n", "inline").unwrap_err();
        assert!(matches!(err, Error::InvalidWorkflowDocument { .. }));
        assert!(err.to_string().contains("workflows"));
    }

    #[test]
    fn test_llm_block_requires_type() {
        let doc = "workflows:\n  a:\n    - name: x\n      task_type: topic_selection\n      llm:\n        model: m\n";
        assert!(parse_workflows(doc, "inline").is_err());
    }
}
