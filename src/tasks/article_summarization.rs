use super::usage_metrics;
use crate::constants::{ARTICLE_SUMMARY_SYSTEM, ARTICLE_SUMMARY_USER};
use crate::core::{Task, TaskContext, TaskData, TaskResult};
use crate::db::FeedEntry;
use crate::errors::Error;
use crate::llm::{LlmClient, TokenUsage};
use crate::utils::{clean_llm_output, run_bounded, truncate_chars};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Summarizes the scraped article text of every feed behind a briefing's topics.
pub struct ArticleSummarizationTask {
    name: String,
    human_review: bool,
    context: TaskContext,
}

struct ArticleJob {
    feed_id: i32,
    text: String,
}

impl ArticleSummarizationTask {
    pub fn new(name: String, human_review: bool, context: TaskContext) -> Self {
        ArticleSummarizationTask {
            name,
            human_review,
            context,
        }
    }

    async fn summarize(&mut self) -> Result<TaskResult, Error> {
        let scope = self.task_type();
        let requested = self.context.briefing_id(scope)?;
        let max_length: Option<usize> = self.param("max_length", None)?;
        let max_concurrent: usize = self.param("max_concurrent", DEFAULT_MAX_CONCURRENT)?;
        let nr_articles: Option<usize> = self.param("nr_articles", None)?;
        let llm = Arc::clone(self.context.llm()?);

        let Some((briefing_id, topics)) = self
            .context
            .with_repository(|repo| repo.topics_for_briefing(requested.as_deref()))?
        else {
            return Ok(TaskResult::no_data(&self.name, "No briefing found"));
        };
        info!(
            "Processing briefing {}: {} topics",
            briefing_id,
            topics.len()
        );
        if topics.is_empty() {
            return Ok(TaskResult::no_data(
                &self.name,
                &format!("No topics found for briefing {}", briefing_id),
            )
            .with_metric("articles_processed", 0));
        }

        let topic_ids: Vec<String> = topics.iter().map(|t| t.id.clone()).collect();
        let feeds_by_topic = self
            .context
            .with_repository(|repo| repo.feeds_for_topics(&topic_ids))?;

        let mut jobs = Vec::new();
        for (topic_id, feeds) in feeds_by_topic {
            let valid: Vec<FeedEntry> = feeds
                .into_iter()
                .filter(|f| f.scraped_text.as_deref().is_some_and(|t| !t.is_empty()))
                .collect();
            if valid.is_empty() {
                warn!("No scraped articles found for topic {}", topic_id);
                continue;
            }
            for feed in sample_articles(valid, nr_articles) {
                jobs.push(ArticleJob {
                    feed_id: feed.id,
                    text: feed.scraped_text.unwrap_or_default(),
                });
            }
        }

        if jobs.is_empty() {
            return Ok(TaskResult::no_data(
                &self.name,
                &format!("No valid articles found for briefing {}", briefing_id),
            )
            .with_metric("articles_processed", 0));
        }

        info!("Generating summaries for {} articles", jobs.len());
        let total = jobs.len();
        let progress = self
            .context
            .logger_manager
            .progress(total as u64, "Summarizing articles");
        let outcomes = run_bounded(jobs, max_concurrent, &progress, |job| {
            let llm = Arc::clone(&llm);
            async move { summarize_article(&llm, job, max_length).await }
        })
        .await;

        let succeeded: Vec<(i32, String, TokenUsage)> = outcomes.into_iter().flatten().collect();
        let failed = total - succeeded.len();
        if succeeded.is_empty() {
            return Ok(TaskResult::failure(
                &self.name,
                format!("All {} article summaries failed", total),
            )
            .with_metric("articles_processed", total)
            .with_metric("failed", failed));
        }

        let summaries: Vec<(i32, String)> = succeeded
            .iter()
            .map(|(id, summary, _)| (*id, summary.clone()))
            .collect();
        self.context
            .with_repository(|repo| repo.update_article_summaries(&summaries))?;
        info!("Successfully processed {} articles", summaries.len());

        let usages: Vec<TokenUsage> = succeeded.iter().map(|(_, _, usage)| *usage).collect();
        Ok(TaskResult::success(&self.name)
            .with_metric("articles_processed", total)
            .with_metric("summaries_generated", summaries.len())
            .with_metric("failed", failed)
            .with_metrics(usage_metrics(&usages))
            .with_data(TaskData::ArticleSummaries {
                briefing_id,
                summarized_feeds: summaries.iter().map(|(id, _)| *id).collect(),
            }))
    }
}

#[async_trait]
impl Task for ArticleSummarizationTask {
    task_accessors!(ArticleSummarization);

    fn requires_llm(&self) -> bool {
        true
    }

    async fn execute(&mut self) -> TaskResult {
        match self.summarize().await {
            Ok(result) => result,
            Err(e) => {
                error!("Article summarization failed: {}", e);
                TaskResult::failure(&self.name, e.to_string())
                    .with_metric("articles_processed", 0)
                    .with_metric("summaries_generated", 0)
            }
        }
    }
}

async fn summarize_article(
    llm: &LlmClient,
    job: ArticleJob,
    max_length: Option<usize>,
) -> Result<(i32, String, TokenUsage), Error> {
    let text = match max_length {
        Some(limit) => truncate_chars(&job.text, limit),
        None => job.text.as_str(),
    };
    let prompt = ARTICLE_SUMMARY_USER.replace("{article}", text);
    let response = llm
        .generate(LlmClient::prepare_prompts(&prompt, Some(ARTICLE_SUMMARY_SYSTEM)))
        .await?;
    let summary = clean_llm_output(&response.content);
    if summary.is_empty() {
        return Err(Error::Llm(format!(
            "Empty summary for feed {}",
            job.feed_id
        )));
    }
    Ok((job.feed_id, summary, response.usage))
}

/// Keeps at most `limit` articles, chosen at random.
fn sample_articles(feeds: Vec<FeedEntry>, limit: Option<usize>) -> Vec<FeedEntry> {
    match limit {
        Some(n) if feeds.len() > n => feeds
            .choose_multiple(&mut rand::thread_rng(), n)
            .cloned()
            .collect(),
        _ => feeds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(id: i32) -> FeedEntry {
        FeedEntry {
            id,
            title: None,
            link: format!("https://example.com/{}", id),
            published: None,
            summary: None,
            source: "Example".into(),
            feed_url: None,
            fetched_at: "2026-01-01 00:00:00".into(),
            scraped_text: Some("text".into()),
            summarized_article: None,
        }
    }

    #[test]
    fn test_sample_articles_respects_limit() {
        let feeds: Vec<FeedEntry> = (1..=6).map(feed).collect();
        let sampled = sample_articles(feeds.clone(), Some(3));
        assert_eq!(sampled.len(), 3);
        assert!(sampled.iter().all(|f| feeds.contains(f)));

        assert_eq!(sample_articles(feeds.clone(), Some(10)).len(), 6);
        assert_eq!(sample_articles(feeds, None).len(), 6);
    }
}
