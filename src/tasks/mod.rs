//! Built-in briefing tasks and the registry that creates them.

macro_rules! task_accessors {
    ($kind:ident) => {
        fn name(&self) -> &str {
            &self.name
        }

        fn task_type(&self) -> &'static str {
            $crate::tasks::TaskKind::$kind.as_str()
        }

        fn requires_human_review(&self) -> bool {
            self.human_review
        }

        fn context(&self) -> &TaskContext {
            &self.context
        }

        fn context_mut(&mut self) -> &mut TaskContext {
            &mut self.context
        }
    };
}

mod article_summarization;
mod briefing_html_generation;
mod content_fetching;
mod feed_collection;
mod feed_hdbscan_clustering;
mod topic_selection;
mod topic_summarization;
mod topic_title_generation;

pub use article_summarization::*;
pub use briefing_html_generation::*;
pub use content_fetching::*;
pub use feed_collection::*;
pub use feed_hdbscan_clustering::*;
pub use topic_selection::*;
pub use topic_summarization::*;
pub use topic_title_generation::*;

use crate::core::{Metrics, Task, TaskContext, TaskFactory};
use crate::errors::Error;
use crate::llm::TokenUsage;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The closed set of task types a workflow can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    FeedCollection,
    FeedHdbscanClustering,
    ContentFetching,
    ArticleSummarization,
    TopicSummarization,
    TopicTitleGeneration,
    TopicSelection,
    BriefingHtmlGeneration,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        TaskKind::FeedCollection,
        TaskKind::FeedHdbscanClustering,
        TaskKind::ContentFetching,
        TaskKind::ArticleSummarization,
        TaskKind::TopicSummarization,
        TaskKind::TopicTitleGeneration,
        TaskKind::TopicSelection,
        TaskKind::BriefingHtmlGeneration,
    ];

    /// Identifier used as `task_type` in workflow files.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::FeedCollection => "feed_collection",
            TaskKind::FeedHdbscanClustering => "feed_hdbscan_clustering",
            TaskKind::ContentFetching => "content_fetching",
            TaskKind::ArticleSummarization => "article_summarization",
            TaskKind::TopicSummarization => "topic_summarization",
            TaskKind::TopicTitleGeneration => "topic_title_generation",
            TaskKind::TopicSelection => "topic_selection",
            TaskKind::BriefingHtmlGeneration => "briefing_html_generation",
        }
    }

    /// Instantiates the task under its workflow name.
    pub fn create(self, name: &str, human_review: bool, context: TaskContext) -> Box<dyn Task> {
        let name = name.to_string();
        match self {
            TaskKind::FeedCollection => {
                Box::new(FeedCollectionTask::new(name, human_review, context))
            }
            TaskKind::FeedHdbscanClustering => {
                Box::new(FeedHdbscanClusteringTask::new(name, human_review, context))
            }
            TaskKind::ContentFetching => {
                Box::new(ContentFetchingTask::new(name, human_review, context))
            }
            TaskKind::ArticleSummarization => {
                Box::new(ArticleSummarizationTask::new(name, human_review, context))
            }
            TaskKind::TopicSummarization => {
                Box::new(TopicSummarizationTask::new(name, human_review, context))
            }
            TaskKind::TopicTitleGeneration => {
                Box::new(TopicTitleGenerationTask::new(name, human_review, context))
            }
            TaskKind::TopicSelection => {
                Box::new(TopicSelectionTask::new(name, human_review, context))
            }
            TaskKind::BriefingHtmlGeneration => {
                Box::new(BriefingHtmlGenerationTask::new(name, human_review, context))
            }
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownTaskType(s.to_string()))
    }
}

/// Factory for the built-in task types.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTasks;

impl TaskFactory for BuiltinTasks {
    fn supports(&self, task_type: &str) -> bool {
        task_type.parse::<TaskKind>().is_ok()
    }

    fn task_types(&self) -> Vec<String> {
        TaskKind::ALL.iter().map(|k| k.to_string()).collect()
    }

    fn create(
        &self,
        task_type: &str,
        name: &str,
        human_review: bool,
        context: TaskContext,
    ) -> Result<Box<dyn Task>, Error> {
        Ok(task_type
            .parse::<TaskKind>()?
            .create(name, human_review, context))
    }
}

/// Token counters summed over calls, plus the per call input/output lists.
pub(crate) fn usage_metrics(usages: &[TokenUsage]) -> Metrics {
    let mut total = TokenUsage::default();
    for usage in usages {
        total += *usage;
    }
    let mut metrics = Metrics::new();
    metrics.insert("sum_input_tokens".into(), total.input_tokens.into());
    metrics.insert("sum_output_tokens".into(), total.output_tokens.into());
    metrics.insert("sum_total_tokens".into(), total.total_tokens.into());
    metrics.insert(
        "input_tokens".into(),
        Value::from(usages.iter().map(|u| u.input_tokens).collect::<Vec<_>>()),
    );
    metrics.insert(
        "output_tokens".into(),
        Value::from(usages.iter().map(|u| u.output_tokens).collect::<Vec<_>>()),
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, ConfigManager, ConfigSource};
    use crate::db::Database;
    use crate::utils::LoggerManager;
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn context_with_settings(base: Value) -> TaskContext {
        let conf = ConfigManager::from_settings(
            base.as_object().cloned().unwrap_or_default(),
            Map::new(),
            CliArgs::new(),
        );
        TaskContext::new(
            Database::new(":memory:").unwrap(),
            Arc::new(conf),
            Arc::new(LoggerManager::detached()),
            Map::new(),
            None,
        )
    }

    #[test]
    fn test_task_kind_round_trips_identifiers() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
        assert!(matches!(
            "feed_scraping".parse::<TaskKind>(),
            Err(Error::UnknownTaskType(_))
        ));
        assert!(BuiltinTasks.supports("topic_selection"));
        assert_eq!(BuiltinTasks.task_types().len(), 8);
    }

    #[test]
    fn test_usage_metrics_sums_calls() {
        let metrics = usage_metrics(&[TokenUsage::new(10, 5), TokenUsage::new(3, 2)]);
        assert_eq!(metrics["sum_input_tokens"], Value::from(13));
        assert_eq!(metrics["sum_total_tokens"], Value::from(20));
        assert_eq!(metrics["output_tokens"], serde_json::json!([5, 2]));
    }

    #[test]
    fn test_parameters_are_scoped_by_task_type_not_step_name() {
        let context = context_with_settings(json!({
            "content_fetching": {"max_concurrent": 8},
            "fetch": {"max_concurrent": 2},
        }));
        let mut task = TaskKind::ContentFetching.create("fetch", false, context);

        assert_eq!(task.name(), "fetch");
        assert_eq!(task.task_type(), "content_fetching");
        assert_eq!(task.get_parameter("max_concurrent", json!(5)), json!(8));
        assert_eq!(
            task.context().param_sources["max_concurrent"].source,
            ConfigSource::BaseSettings
        );
    }
}
