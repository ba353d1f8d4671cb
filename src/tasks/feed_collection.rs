use crate::config::FeedSource;
use crate::core::{Task, TaskContext, TaskData, TaskResult};
use crate::db::NewFeedEntry;
use crate::errors::Error;
use crate::utils::{collapse_whitespace, format_db_timestamp, html_to_text, run_bounded, utc_now_formatted};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";
const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Polls every configured RSS/Atom feed and stores new entries.
pub struct FeedCollectionTask {
    name: String,
    human_review: bool,
    context: TaskContext,
}

impl FeedCollectionTask {
    pub fn new(name: String, human_review: bool, context: TaskContext) -> Self {
        FeedCollectionTask {
            name,
            human_review,
            context,
        }
    }

    async fn collect(&mut self) -> Result<TaskResult, Error> {
        let timeout: u64 = self.param("timeout", DEFAULT_TIMEOUT_SECS)?;
        let user_agent: String = self.param("user_agent", DEFAULT_USER_AGENT.to_string())?;
        let max_concurrent: usize = self.param("max_concurrent", DEFAULT_MAX_CONCURRENT)?;

        let feeds = self.context.conf.feeds();
        if feeds.is_empty() {
            return Ok(TaskResult::no_data(&self.name, "No feeds configured")
                .with_metric("total_feeds", 0)
                .with_metric("entries_stored", 0));
        }
        info!("Starting feed collection for {} sources", feeds.len());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent(user_agent)
            .build()?;
        let progress = self
            .context
            .logger_manager
            .progress(feeds.len() as u64, "Fetching feeds");
        let bodies = run_bounded(feeds.clone(), max_concurrent, &progress, |feed| {
            let client = client.clone();
            async move { fetch_feed(&client, &feed.url).await }
        })
        .await;

        let fetched_at = utc_now_formatted();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut entries = Vec::new();
        let mut failed_feeds = 0;

        for (feed, body) in feeds.iter().zip(bodies) {
            let Some(body) = body else {
                failed_feeds += 1;
                continue;
            };
            match parse_feed_entries(&body, feed, &fetched_at) {
                Ok(parsed) if parsed.is_empty() => {
                    warn!("No entries found for feed {} ({})", feed.name, feed.url);
                }
                Ok(parsed) => {
                    let before = entries.len();
                    for entry in parsed {
                        if seen.insert((entry.source.clone(), entry.link.clone())) {
                            entries.push(entry);
                        }
                    }
                    debug!(
                        "Processed {} entries from {} ({})",
                        entries.len() - before,
                        feed.name,
                        feed.url
                    );
                }
                Err(e) => {
                    warn!("Could not parse feed {}: {}", feed.url, e);
                    failed_feeds += 1;
                }
            }
        }

        let entries_found = entries.len();
        let entries_stored = self
            .context
            .with_repository(|repo| repo.insert_feed_entries(&entries))?;
        info!(
            "Feed collection completed: {} entries found, {} new",
            entries_found, entries_stored
        );

        Ok(TaskResult::success(&self.name)
            .with_data(TaskData::FeedCollection {
                feeds_polled: feeds.len(),
                entries_stored,
            })
            .with_metric("total_feeds", feeds.len())
            .with_metric("failed_feeds", failed_feeds)
            .with_metric("entries_found", entries_found)
            .with_metric("entries_stored", entries_stored))
    }
}

#[async_trait]
impl Task for FeedCollectionTask {
    task_accessors!(FeedCollection);

    async fn execute(&mut self) -> TaskResult {
        match self.collect().await {
            Ok(result) => result,
            Err(e) => {
                error!("Feed collection failed: {}", e);
                TaskResult::failure(&self.name, e.to_string()).with_metric("entries_stored", 0)
            }
        }
    }
}

async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    let body = response.bytes().await?;
    debug!("Fetched feed {}", url);
    Ok(body.to_vec())
}

/// Parses an RSS or Atom document into rows for the feeds table.
///
/// Entries without a link are dropped. The summary is reduced to plain text and the
/// published time falls back to the updated time.
pub fn parse_feed_entries(
    body: &[u8],
    source: &FeedSource,
    fetched_at: &str,
) -> Result<Vec<NewFeedEntry>, Error> {
    let feed = feed_rs::parser::parse(body)?;
    let source_name = if source.name.is_empty() {
        feed.title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_else(|| source.url.clone())
    } else {
        source.name.clone()
    };

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first()?.href.clone();
            Some(NewFeedEntry {
                title: entry.title.map(|t| collapse_whitespace(&t.content)),
                link,
                published: entry
                    .published
                    .or(entry.updated)
                    .map(|ts| format_db_timestamp(&ts)),
                summary: entry
                    .summary
                    .map(|s| html_to_text(&s.content))
                    .filter(|s| !s.is_empty()),
                source: source_name.clone(),
                feed_url: Some(source.url.clone()),
                fetched_at: fetched_at.to_string(),
            })
        })
        .collect())
}
