use super::usage_metrics;
use crate::constants::{INCOHERENT_CONTENT_MARKER, TOPIC_SUMMARY_SYSTEM, TOPIC_SUMMARY_USER};
use crate::core::{Task, TaskContext, TaskData, TaskResult};
use crate::db::FeedEntry;
use crate::errors::Error;
use crate::llm::{LlmClient, TokenUsage};
use crate::utils::{clean_llm_output, run_bounded};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_SUMMARIES_PER_TOPIC: usize = 10;
const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Writes one summary per briefing topic from the summaries of its articles.
pub struct TopicSummarizationTask {
    name: String,
    human_review: bool,
    context: TaskContext,
}

struct TopicJob {
    topic_id: String,
    topic_title: String,
    summaries_text: String,
    used_feeds: Vec<i32>,
}

struct TopicSummary {
    job: TopicJob,
    summary: String,
    usage: TokenUsage,
}

impl TopicSummarizationTask {
    pub fn new(name: String, human_review: bool, context: TaskContext) -> Self {
        TopicSummarizationTask {
            name,
            human_review,
            context,
        }
    }

    async fn summarize(&mut self) -> Result<TaskResult, Error> {
        let scope = self.task_type();
        let requested = self.context.briefing_id(scope)?;
        let per_topic: usize = self.param("summaries_per_topic", DEFAULT_SUMMARIES_PER_TOPIC)?;
        let max_concurrent: usize = self.param("max_concurrent", DEFAULT_MAX_CONCURRENT)?;
        let llm = Arc::clone(self.context.llm()?);

        let Some((briefing_id, topics)) = self
            .context
            .with_repository(|repo| repo.topics_for_briefing(requested.as_deref()))?
        else {
            return Ok(TaskResult::no_data(&self.name, "No briefing found"));
        };
        let empty_data = TaskData::TopicSummaries {
            briefing_id: briefing_id.clone(),
            topic_summaries: BTreeMap::new(),
            incoherent_topics: Vec::new(),
        };
        if topics.is_empty() {
            return Ok(TaskResult::no_data(
                &self.name,
                &format!("No topics found for briefing {}", briefing_id),
            )
            .with_data(empty_data)
            .with_metric("topics_processed", 0)
            .with_metric("summaries_generated", 0));
        }
        info!("Processing topic summaries for briefing {}", briefing_id);

        let topic_ids: Vec<String> = topics.iter().map(|t| t.id.clone()).collect();
        let mut feeds_by_topic = self
            .context
            .with_repository(|repo| repo.feeds_for_topics(&topic_ids))?;

        let mut jobs = Vec::new();
        for topic in &topics {
            let feeds = feeds_by_topic.remove(&topic.id).unwrap_or_default();
            match build_topic_job(&topic.id, topic.display_title(), &feeds, per_topic) {
                Some(job) => jobs.push(job),
                None => warn!("No article summaries found for topic {}", topic.id),
            }
        }
        if jobs.is_empty() {
            return Ok(
                TaskResult::no_data(&self.name, "No topic summary tasks created")
                    .with_data(empty_data)
                    .with_metric("topics_processed", topics.len())
                    .with_metric("summaries_generated", 0),
            );
        }

        info!("Generating summaries for {} topics", jobs.len());
        let attempted = jobs.len();
        let progress = self
            .context
            .logger_manager
            .progress(attempted as u64, "Generating topic summaries");
        let outcomes = run_bounded(jobs, max_concurrent, &progress, |job| {
            let llm = Arc::clone(&llm);
            async move { summarize_topic(&llm, job).await }
        })
        .await;
        let generated: Vec<TopicSummary> = outcomes.into_iter().flatten().collect();
        if generated.is_empty() {
            return Ok(TaskResult::failure(
                &self.name,
                format!("All {} topic summaries failed", attempted),
            )
            .with_metric("topics_processed", topics.len()));
        }

        let mut incoherent_topics = Vec::new();
        for item in &generated {
            if item.summary.contains(INCOHERENT_CONTENT_MARKER) {
                warn!(
                    "Topic {} ({}) has an incoherent content error",
                    item.job.topic_id, item.job.topic_title
                );
                incoherent_topics.push(item.job.topic_id.clone());
            }
        }

        let rows: Vec<(String, String, Vec<i32>)> = generated
            .iter()
            .map(|item| {
                (
                    item.job.topic_id.clone(),
                    item.summary.clone(),
                    item.job.used_feeds.clone(),
                )
            })
            .collect();
        self.context
            .with_repository(|repo| repo.store_topic_summaries(&rows))?;
        info!("Topic summaries generated and stored for {} topics", rows.len());

        let usages: Vec<TokenUsage> = generated.iter().map(|item| item.usage).collect();
        let mut result = TaskResult::success(&self.name)
            .with_metric("topics_processed", topics.len())
            .with_metric("summaries_generated", generated.len())
            .with_metric("failed", attempted - generated.len())
            .with_metrics(usage_metrics(&usages));
        if !incoherent_topics.is_empty() {
            result = result.with_warning(format!(
                "{} out of {} topics have incoherent content errors",
                incoherent_topics.len(),
                generated.len()
            ));
        }

        Ok(result.with_data(TaskData::TopicSummaries {
            briefing_id,
            topic_summaries: rows
                .into_iter()
                .map(|(topic_id, summary, _)| (topic_id, summary))
                .collect(),
            incoherent_topics,
        }))
    }
}

#[async_trait]
impl Task for TopicSummarizationTask {
    task_accessors!(TopicSummarization);

    fn requires_llm(&self) -> bool {
        true
    }

    async fn execute(&mut self) -> TaskResult {
        match self.summarize().await {
            Ok(result) => result,
            Err(e) => {
                error!("Topic summarization failed: {}", e);
                TaskResult::failure(&self.name, e.to_string())
                    .with_metric("topics_processed", 0)
                    .with_metric("summaries_generated", 0)
            }
        }
    }
}

/// Formats up to `limit` article summaries of a topic, newest first.
fn build_topic_job(
    topic_id: &str,
    topic_title: &str,
    feeds: &[FeedEntry],
    limit: usize,
) -> Option<TopicJob> {
    let summarized: Vec<&FeedEntry> = feeds
        .iter()
        .filter(|f| f.summarized_article.as_deref().is_some_and(|s| !s.is_empty()))
        .take(limit)
        .collect();
    if summarized.is_empty() {
        return None;
    }
    if summarized.len() < limit {
        info!(
            "Only {} summaries available for topic {}",
            summarized.len(),
            topic_id
        );
    }

    let summaries_text = summarized
        .iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "Article {} from {}:\nTitle: {}\nSummary: {}",
                i + 1,
                f.source,
                f.title_or_link(),
                f.summarized_article.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    Some(TopicJob {
        topic_id: topic_id.to_string(),
        topic_title: topic_title.to_string(),
        summaries_text,
        used_feeds: summarized.iter().map(|f| f.id).collect(),
    })
}

async fn summarize_topic(llm: &LlmClient, job: TopicJob) -> Result<TopicSummary, Error> {
    let prompt = TOPIC_SUMMARY_USER.replace("{article_summaries}", &job.summaries_text);
    let response = llm
        .generate(LlmClient::prepare_prompts(&prompt, Some(TOPIC_SUMMARY_SYSTEM)))
        .await?;
    Ok(TopicSummary {
        summary: clean_llm_output(&response.content),
        usage: response.usage,
        job,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(id: i32, summary: Option<&str>) -> FeedEntry {
        FeedEntry {
            id,
            title: Some(format!("Headline {}", id)),
            link: format!("https://example.com/{}", id),
            published: None,
            summary: None,
            source: "Wire".into(),
            feed_url: None,
            fetched_at: "2026-01-01 00:00:00".into(),
            scraped_text: None,
            summarized_article: summary.map(str::to_string),
        }
    }

    #[test]
    fn test_topic_job_formats_summaries_and_tracks_feeds() {
        let feeds = vec![
            feed(1, Some("First.")),
            feed(2, None),
            feed(3, Some("Third.")),
            feed(4, Some("Fourth.")),
        ];
        let job = build_topic_job("t-1", "Title", &feeds, 2).unwrap();
        assert_eq!(job.used_feeds, vec![1, 3]);
        assert_eq!(
            job.summaries_text,
            "Article 1 from Wire:\nTitle: Headline 1\nSummary: First.\n\n\
             Article 2 from Wire:\nTitle: Headline 3\nSummary: Third."
        );
    }

    #[test]
    fn test_topic_without_summaries_has_no_job() {
        assert!(build_topic_job("t-1", "Title", &[feed(1, None)], 5).is_none());
    }
}
