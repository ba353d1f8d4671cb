use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Typed payload a task hands to the rest of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskData {
    /// The task produced nothing for downstream consumers
    Empty,
    FeedCollection {
        feeds_polled: usize,
        entries_stored: usize,
    },
    Clustering {
        topic_ids: Vec<String>,
    },
    ContentFetching {
        briefing_id: String,
        feeds_scraped: Vec<i32>,
    },
    ArticleSummaries {
        briefing_id: String,
        summarized_feeds: Vec<i32>,
    },
    TopicSummaries {
        briefing_id: String,
        topic_summaries: BTreeMap<String, String>,
        incoherent_topics: Vec<String>,
    },
    TopicTitles {
        titles: BTreeMap<String, String>,
    },
    TopicSelection {
        briefing_id: Option<String>,
        selected_topics: Vec<String>,
        selection_overview: String,
    },
    BriefingRendering {
        briefing_id: String,
        output_path: String,
        topics_count: usize,
    },
    /// Attached to the result of a task whose dependencies were not satisfied
    DependencyFailure {
        failed_dependencies: Vec<String>,
    },
    /// Free-form payload for tasks outside the built-in set
    Values(Map<String, Value>),
}

impl TaskData {
    /// Briefing this payload refers to, if any.
    pub fn briefing_id(&self) -> Option<&str> {
        match self {
            TaskData::ContentFetching { briefing_id, .. }
            | TaskData::ArticleSummaries { briefing_id, .. }
            | TaskData::TopicSummaries { briefing_id, .. }
            | TaskData::BriefingRendering { briefing_id, .. } => Some(briefing_id),
            TaskData::TopicSelection { briefing_id, .. } => briefing_id.as_deref(),
            TaskData::Values(map) => map.get("briefing_id").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Outputs of the successful tasks of a run, keyed by task name in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowData {
    entries: Vec<(String, TaskData)>,
}

impl WorkflowData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a task's output, replacing an earlier entry with the same name.
    pub fn insert(&mut self, task_name: &str, data: TaskData) {
        self.entries.retain(|(name, _)| name != task_name);
        self.entries.push((task_name.to_string(), data));
    }

    pub fn get(&self, task_name: &str) -> Option<&TaskData> {
        self.entries
            .iter()
            .find(|(name, _)| name == task_name)
            .map(|(_, data)| data)
    }

    pub fn contains(&self, task_name: &str) -> bool {
        self.get(task_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskData)> {
        self.entries.iter().map(|(name, data)| (name.as_str(), data))
    }

    /// Briefing id published by the most recent task that produced one.
    pub fn latest_briefing_id(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find_map(|(_, data)| data.briefing_id())
    }
}
