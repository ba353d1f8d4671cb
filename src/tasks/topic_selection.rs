use crate::constants::{
    TOPIC_SELECTION_FORMAT_REMINDER, TOPIC_SELECTION_SYSTEM, TOPIC_SELECTION_USER,
};
use crate::core::{
    collect_parameter_updates, present_result, ReviewConsole, ReviewDecision, Task, TaskContext,
    TaskData, TaskResult, APPROVE_OPTION, REJECT_OPTION, RERUN_OPTION,
};
use crate::db::{FeedEntry, Topic};
use crate::errors::Error;
use crate::llm::LlmClient;
use crate::utils::remove_think_tags;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_NR_TOPICS: usize = 12;
const DEFAULT_NR_SAMPLE_HEADLINES: usize = 8;
const DEFAULT_TIME_WINDOW_HOURS: i64 = 24;
const MAX_FORMAT_ATTEMPTS: usize = 3;
const MANUAL_OPTION: &str = "Manually select topics";

/// Lets the LLM pick the most relevant recent topics and stores them as a new briefing.
///
/// Besides the standard review choices, a reviewer can replace the selection by hand.
pub struct TopicSelectionTask {
    name: String,
    human_review: bool,
    context: TaskContext,
}

impl TopicSelectionTask {
    pub fn new(name: String, human_review: bool, context: TaskContext) -> Self {
        TopicSelectionTask {
            name,
            human_review,
            context,
        }
    }

    async fn select_topics(&mut self) -> Result<TaskResult, Error> {
        let nr_topics: usize = self.param("nr_topics", DEFAULT_NR_TOPICS)?;
        let nr_sample_headlines: usize =
            self.param("nr_sample_headlines", DEFAULT_NR_SAMPLE_HEADLINES)?;
        let hours: i64 = self.param("time_window_hours", DEFAULT_TIME_WINDOW_HOURS)?;

        let topics = self
            .context
            .with_repository(|repo| repo.most_recent_topics(hours))?;
        if topics.is_empty() {
            return Ok(
                TaskResult::no_data(&self.name, "No recent topics found for selection")
                    .with_data(TaskData::TopicSelection {
                        briefing_id: None,
                        selected_topics: Vec::new(),
                        selection_overview: String::new(),
                    })
                    .with_metric("topics_available", 0)
                    .with_metric("topics_selected", 0),
            );
        }
        info!("Found {} topics for selection", topics.len());

        let topic_ids: Vec<String> = topics.iter().map(|t| t.id.clone()).collect();
        let feeds_by_topic = self
            .context
            .with_repository(|repo| repo.feeds_for_topics(&topic_ids))?;
        let topics_text = topics
            .iter()
            .map(|topic| {
                let feeds = feeds_by_topic.get(&topic.id).map(Vec::as_slice).unwrap_or(&[]);
                format_topic(topic, feeds, nr_sample_headlines)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let nr_topics = nr_topics.to_string();
        let system = TOPIC_SELECTION_SYSTEM.replace("{nr_topics}", &nr_topics);
        let user = TOPIC_SELECTION_USER
            .replace("{nr_topics}", &nr_topics)
            .replace("{topics_text}", &topics_text);
        let mut messages = LlmClient::prepare_prompts(&user, Some(&system));

        let llm = Arc::clone(self.context.llm()?);
        let response = llm
            .generate_with_format_check(
                &mut messages,
                |content| !parse_selection(content, &topic_ids).is_empty(),
                TOPIC_SELECTION_FORMAT_REMINDER,
                MAX_FORMAT_ATTEMPTS,
            )
            .await?;
        let selected = parse_selection(&response.content, &topic_ids);
        info!("Selected {} topics", selected.len());

        let overview = selection_overview(&topics, &selected);
        info!("Selection overview:\n{}", overview);

        let briefing_id = self
            .context
            .with_repository(|repo| repo.store_briefing_with_topics(&selected, None))?;
        info!(
            "Created new briefing {} with {} topics: {:?}",
            briefing_id,
            selected.len(),
            selected
        );

        Ok(TaskResult::success(&self.name)
            .with_metric("topics_available", topics.len())
            .with_metric("topics_selected", selected.len())
            .with_metric("input_tokens", response.usage.input_tokens)
            .with_metric("output_tokens", response.usage.output_tokens)
            .with_metric("total_tokens", response.usage.total_tokens)
            .with_data(TaskData::TopicSelection {
                briefing_id: Some(briefing_id),
                selected_topics: selected,
                selection_overview: overview,
            }))
    }

    /// Lets the reviewer pick topics by index, stores them as a new briefing and
    /// rewrites the result accordingly.
    fn apply_manual_selection(
        &mut self,
        result: &mut TaskResult,
        console: &mut dyn ReviewConsole,
    ) -> Result<(), Error> {
        let hours: i64 = self.param("time_window_hours", DEFAULT_TIME_WINDOW_HOURS)?;
        let topics = self
            .context
            .with_repository(|repo| repo.most_recent_topics(hours))?;
        if topics.is_empty() {
            return Err(Error::Validation("No recent topics to select from".to_string()));
        }

        console.show("\nAvailable topics:");
        for (i, topic) in topics.iter().enumerate() {
            console.show(&format!("{}. [{}] {}", i + 1, topic.id, topic.display_title()));
        }

        let selected = loop {
            let input = console
                .read_line("Enter topic index numbers to select (comma-separated)")?;
            if input.trim().is_empty() {
                return Err(Error::Validation("No topics selected".to_string()));
            }
            match parse_indices(&input, topics.len()) {
                Some(indices) => {
                    break indices
                        .into_iter()
                        .map(|i| topics[i].id.clone())
                        .collect::<Vec<_>>()
                }
                None => console.show("Invalid input, please try again"),
            }
        };

        let briefing_id = self
            .context
            .with_repository(|repo| repo.store_briefing_with_topics(&selected, None))?;
        info!(
            "Created new briefing {} with {} manually selected topics",
            briefing_id,
            selected.len()
        );

        let overview = selection_overview(&topics, &selected);
        let amended = std::mem::replace(result, TaskResult::success(&self.name))
            .with_metric("topics_selected", selected.len())
            .with_data(TaskData::TopicSelection {
                briefing_id: Some(briefing_id),
                selected_topics: selected,
                selection_overview: overview,
            });
        *result = amended;
        Ok(())
    }
}

#[async_trait]
impl Task for TopicSelectionTask {
    task_accessors!(TopicSelection);

    fn requires_llm(&self) -> bool {
        true
    }

    async fn execute(&mut self) -> TaskResult {
        match self.select_topics().await {
            Ok(result) => result,
            Err(e) => {
                error!("Topic selection failed: {}", e);
                TaskResult::failure(&self.name, e.to_string())
                    .with_metric("topics_available", 0)
                    .with_metric("topics_selected", 0)
            }
        }
    }

    fn review(
        &mut self,
        result: &mut TaskResult,
        console: &mut dyn ReviewConsole,
        allow_rerun: bool,
    ) -> ReviewDecision {
        present_result(&self.name, result, console);
        if let Some(TaskData::TopicSelection {
            selection_overview, ..
        }) = result.data()
        {
            console.show(selection_overview);
        }

        let mut options = vec![APPROVE_OPTION];
        if allow_rerun {
            options.push(RERUN_OPTION);
        }
        options.push(MANUAL_OPTION);
        options.push(REJECT_OPTION);

        let choice = match console.select("How do you want to proceed?", &options) {
            Ok(index) => options.get(index).copied().unwrap_or(REJECT_OPTION),
            Err(e) => {
                warn!("Review of {} failed: {}", self.name, e);
                REJECT_OPTION
            }
        };

        match choice {
            APPROVE_OPTION => ReviewDecision::Approve,
            RERUN_OPTION => {
                let scope = self.task_type();
                match collect_parameter_updates(scope, &mut self.context, console) {
                    Ok(_) => ReviewDecision::Rerun,
                    Err(e) => {
                        warn!("Parameter update for {} failed: {}", self.name, e);
                        ReviewDecision::Reject
                    }
                }
            }
            MANUAL_OPTION => match self.apply_manual_selection(result, console) {
                Ok(()) => ReviewDecision::Approve,
                Err(e) => {
                    warn!("Manual topic selection failed: {}", e);
                    ReviewDecision::Reject
                }
            },
            _ => ReviewDecision::Reject,
        }
    }
}

/// Topic block for the selection prompt: id, title, article count, sources and a
/// sample of headlines.
fn format_topic(topic: &Topic, feeds: &[FeedEntry], nr_sample_headlines: usize) -> String {
    let sources: BTreeSet<&str> = feeds.iter().map(|f| f.source.as_str()).collect();
    let headlines = feeds
        .iter()
        .take(nr_sample_headlines)
        .map(|f| format!("  {}: {}", f.source, f.title_or_link()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}: {}\n Total articles: {}\n All sources: {}\n Headline selection:\n{}",
        topic.id,
        topic.display_title(),
        feeds.len(),
        sources.into_iter().collect::<Vec<_>>().join(", "),
        headlines
    )
}

/// Extracts known topic ids from a `[id1, id2]` style answer, in order and without
/// duplicates.
fn parse_selection(content: &str, available: &[String]) -> Vec<String> {
    let cleaned = remove_think_tags(content);
    let known: HashSet<&str> = available.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    cleaned
        .split(',')
        .map(|id| id.trim_matches(|c: char| "[] \n\t\r".contains(c)))
        .filter(|id| known.contains(id) && seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// All topics, selected ones marked with a check.
fn selection_overview(topics: &[Topic], selected: &[String]) -> String {
    topics
        .iter()
        .map(|topic| {
            let mark = if selected.contains(&topic.id) { "✓" } else { " " };
            format!("{}: [{}] {}", topic.id, mark, topic.display_title())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 1-based, comma separated indices; `None` when any entry is invalid.
fn parse_indices(input: &str, len: usize) -> Option<Vec<usize>> {
    input
        .split(',')
        .map(|part| match part.trim().parse::<usize>() {
            Ok(n) if n >= 1 && n <= len => Some(n - 1),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, ConfigManager};
    use crate::core::ScriptedConsole;
    use crate::db::Database;
    use crate::utils::LoggerManager;
    use serde_json::Map;

    fn topic(id: &str, title: &str) -> Topic {
        Topic {
            id: id.into(),
            title: Some(title.into()),
            generated_at: crate::utils::utc_now_formatted(),
            summary: None,
        }
    }

    #[test]
    fn test_parse_selection_keeps_known_ids_once() {
        let available = vec!["2026-01-01-10-00-0".to_string(), "2026-01-01-10-00-1".to_string()];
        let answer = "<think>maybe 2026-01-01-10-00-9</think>[2026-01-01-10-00-1, unknown, 2026-01-01-10-00-0,\n2026-01-01-10-00-1]";
        assert_eq!(
            parse_selection(answer, &available),
            vec!["2026-01-01-10-00-1", "2026-01-01-10-00-0"]
        );
        assert!(parse_selection("I pick the first one", &available).is_empty());
    }

    #[test]
    fn test_overview_marks_selected_topics() {
        let topics = vec![topic("t-0", "Rates"), topic("t-1", "Storms")];
        assert_eq!(
            selection_overview(&topics, &["t-1".to_string()]),
            "t-0: [ ] Rates\nt-1: [✓] Storms"
        );
    }

    #[test]
    fn test_parse_indices() {
        assert_eq!(parse_indices("1, 3", 3), Some(vec![0, 2]));
        assert_eq!(parse_indices("0", 3), None);
        assert_eq!(parse_indices("2,x", 3), None);
    }

    #[test]
    fn test_manual_selection_stores_new_briefing() {
        let db = Database::new(":memory:").unwrap();
        let topics = vec![
            (topic("2026-01-01-10-00-0", "Rates"), vec![]),
            (topic("2026-01-01-10-00-1", "Storms"), vec![]),
        ];
        {
            let mut conn = db.get_conn().unwrap();
            crate::db::BriefingRepository::new(&mut conn)
                .insert_topics(&topics)
                .unwrap();
        }
        let conf = ConfigManager::from_settings(Map::new(), Map::new(), CliArgs::new());
        let ctx = TaskContext::new(
            db.clone(),
            Arc::new(conf),
            Arc::new(LoggerManager::detached()),
            Map::new(),
            None,
        );
        let mut task = TopicSelectionTask::new("topic_selection".into(), true, ctx);
        let mut result = TaskResult::success("topic_selection").with_data(TaskData::TopicSelection {
            briefing_id: Some("old".into()),
            selected_topics: vec!["2026-01-01-10-00-0".into()],
            selection_overview: String::new(),
        });
        let mut console = ScriptedConsole::new(["Manually"], ["9", "2"]);

        let decision = task.review(&mut result, &mut console, true);

        assert_eq!(decision, ReviewDecision::Approve);
        assert!(console
            .transcript
            .iter()
            .any(|line| line == "Invalid input, please try again"));
        match result.data() {
            Some(TaskData::TopicSelection {
                briefing_id,
                selected_topics,
                selection_overview,
            }) => {
                assert_ne!(briefing_id.as_deref(), Some("old"));
                assert_eq!(selected_topics, &vec!["2026-01-01-10-00-1".to_string()]);
                assert!(selection_overview.contains("[✓] Storms"));
            }
            other => panic!("unexpected data {:?}", other),
        }
        assert_eq!(result.metrics()["topics_selected"], 1);
    }

    #[test]
    fn test_empty_manual_selection_rejects() {
        let db = Database::new(":memory:").unwrap();
        {
            let mut conn = db.get_conn().unwrap();
            crate::db::BriefingRepository::new(&mut conn)
                .insert_topics(&[(topic("2026-01-01-10-00-0", "Rates"), vec![])])
                .unwrap();
        }
        let conf = ConfigManager::from_settings(Map::new(), Map::new(), CliArgs::new());
        let ctx = TaskContext::new(
            db,
            Arc::new(conf),
            Arc::new(LoggerManager::detached()),
            Map::new(),
            None,
        );
        let mut task = TopicSelectionTask::new("topic_selection".into(), true, ctx);
        let mut result = TaskResult::success("topic_selection");
        let mut console = ScriptedConsole::new(["Manually"], Vec::<String>::new());

        assert_eq!(
            task.review(&mut result, &mut console, true),
            ReviewDecision::Reject
        );
    }
}
