use super::usage_metrics;
use crate::config::ConfigManager;
use crate::constants::{TOPIC_TITLE_SYSTEM, TOPIC_TITLE_USER};
use crate::core::{Task, TaskContext, TaskData, TaskResult};
use crate::db::FeedEntry;
use crate::errors::Error;
use crate::llm::{LlmClient, TokenUsage};
use crate::utils::{clean_llm_output, run_bounded, truncate_chars};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_MAX_SUMMARY_LENGTH: usize = 500;
const DEFAULT_MAX_TITLE_WORDS: usize = 10;
const DEFAULT_MAX_CONCURRENT: usize = 5;
const DEFAULT_TIME_WINDOW_HOURS: i64 = 24;

/// Gives every topic of the newest clustering run a short headline.
pub struct TopicTitleGenerationTask {
    name: String,
    human_review: bool,
    context: TaskContext,
}

impl TopicTitleGenerationTask {
    pub fn new(name: String, human_review: bool, context: TaskContext) -> Self {
        TopicTitleGenerationTask {
            name,
            human_review,
            context,
        }
    }

    async fn generate_titles(&mut self) -> Result<TaskResult, Error> {
        let max_summary_length: Option<usize> =
            self.param("max_summary_length", Some(DEFAULT_MAX_SUMMARY_LENGTH))?;
        let max_title_words: usize = self.param("max_title_words", DEFAULT_MAX_TITLE_WORDS)?;
        let max_concurrent: usize = self.param("max_concurrent", DEFAULT_MAX_CONCURRENT)?;
        let hours: i64 = self.param("time_window_hours", DEFAULT_TIME_WINDOW_HOURS)?;
        let llm = Arc::clone(self.context.llm()?);

        let topics = self
            .context
            .with_repository(|repo| repo.most_recent_topics(hours))?;
        if topics.is_empty() {
            return Ok(
                TaskResult::no_data(&self.name, "No recent topics found for title generation")
                    .with_data(TaskData::TopicTitles {
                        titles: BTreeMap::new(),
                    })
                    .with_metric("topics_processed", 0),
            );
        }

        let topic_ids: Vec<String> = topics.iter().map(|t| t.id.clone()).collect();
        let feeds_by_topic = self
            .context
            .with_repository(|repo| repo.feeds_for_topics(&topic_ids))?;

        let mut jobs = Vec::new();
        for topic_id in topic_ids {
            let feeds = feeds_by_topic.get(&topic_id).map(Vec::as_slice).unwrap_or(&[]);
            if feeds.is_empty() {
                warn!("No headlines found for topic {}", topic_id);
                continue;
            }
            let headlines = format_headlines(&self.context.conf, feeds, max_summary_length);
            let prompt = TOPIC_TITLE_USER
                .replace("{max_words}", &max_title_words.to_string())
                .replace("{headlines}", &headlines);
            jobs.push((topic_id, prompt));
        }

        info!("Generating titles for {} topics", jobs.len());
        let progress = self
            .context
            .logger_manager
            .progress(jobs.len() as u64, "Generating titles");
        let outcomes = run_bounded(jobs, max_concurrent, &progress, |(topic_id, prompt)| {
            let llm = Arc::clone(&llm);
            async move {
                let response = llm
                    .generate(LlmClient::prepare_prompts(&prompt, Some(TOPIC_TITLE_SYSTEM)))
                    .await?;
                Ok((topic_id, clean_llm_output(&response.content), response.usage))
            }
        })
        .await;

        let mut titles = BTreeMap::new();
        let mut usages: Vec<TokenUsage> = Vec::new();
        for (topic_id, title, usage) in outcomes.into_iter().flatten() {
            titles.insert(topic_id, title);
            usages.push(usage);
        }

        let updates: Vec<(String, String)> = titles
            .iter()
            .map(|(id, title)| (id.clone(), title.clone()))
            .collect();
        self.context
            .with_repository(|repo| repo.update_topic_titles(&updates))?;
        info!("Successfully generated {} topic titles", updates.len());

        Ok(TaskResult::success(&self.name)
            .with_metrics(usage_metrics(&usages))
            .with_metric("topics_processed", topics.len())
            .with_metric("titles_generated", updates.len())
            .with_data(TaskData::TopicTitles { titles }))
    }
}

#[async_trait]
impl Task for TopicTitleGenerationTask {
    task_accessors!(TopicTitleGeneration);

    fn requires_llm(&self) -> bool {
        true
    }

    async fn execute(&mut self) -> TaskResult {
        match self.generate_titles().await {
            Ok(result) => result,
            Err(e) => {
                error!("Topic title generation failed: {}", e);
                TaskResult::failure(&self.name, e.to_string())
                    .with_metric("topics_processed", 0)
                    .with_metric("titles_generated", 0)
            }
        }
    }
}

/// Numbered headline list with sources and abstracts for the title prompt.
fn format_headlines(
    conf: &ConfigManager,
    feeds: &[FeedEntry],
    max_summary_length: Option<usize>,
) -> String {
    feeds
        .iter()
        .enumerate()
        .map(|(i, feed)| {
            let source = feed
                .feed_url
                .as_deref()
                .map(|url| conf.url_to_feedname(url))
                .unwrap_or_else(|| feed.source.clone());
            let summary = feed.summary.as_deref().unwrap_or_default();
            let summary = match max_summary_length {
                Some(max) if summary.chars().count() > max => {
                    format!("{}...", truncate_chars(summary, max))
                }
                _ => summary.to_string(),
            };
            format!(
                "Headline {}: \n{}: {}\nAbstract: {}",
                i + 1,
                source,
                feed.title_or_link(),
                summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
