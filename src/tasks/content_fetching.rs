use crate::core::{Task, TaskContext, TaskData, TaskResult};
use crate::db::FeedEntry;
use crate::errors::Error;
use crate::utils::{html_to_text, run_bounded};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use texting_robots::Robot;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CONCURRENT: usize = 5;
const DEFAULT_RATE_LIMIT_SECS: f64 = 0.5;
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0";

/// Downloads the article pages behind a briefing's topics and stores their text.
pub struct ContentFetchingTask {
    name: String,
    human_review: bool,
    context: TaskContext,
}

enum FetchOutcome {
    Fetched(String),
    DisallowedByRobots,
}

impl ContentFetchingTask {
    pub fn new(name: String, human_review: bool, context: TaskContext) -> Self {
        ContentFetchingTask {
            name,
            human_review,
            context,
        }
    }

    async fn fetch(&mut self) -> Result<TaskResult, Error> {
        let scope = self.task_type();
        let requested = self.context.briefing_id(scope)?;
        let timeout: u64 = self.param("timeout", DEFAULT_TIMEOUT_SECS)?;
        let max_concurrent: usize = self.param("max_concurrent", DEFAULT_MAX_CONCURRENT)?;
        let rate_limit: f64 = self.param("rate_limit", DEFAULT_RATE_LIMIT_SECS)?;
        let check_robots_txt: bool = self.param("check_robots_txt", true)?;
        let user_agent: Option<String> = self.param("user_agent", None)?;
        let user_agent = user_agent.unwrap_or_else(|| BROWSER_USER_AGENT.to_string());

        let Some((briefing_id, topics)) = self
            .context
            .with_repository(|repo| repo.topics_for_briefing(requested.as_deref()))?
        else {
            return Ok(TaskResult::no_data(&self.name, "No briefing found, skipping scraping"));
        };
        info!("Found {} topics for briefing {}", topics.len(), briefing_id);

        let no_data = |message: String| {
            TaskResult::no_data(&self.name, &message)
                .with_data(TaskData::ContentFetching {
                    briefing_id: briefing_id.clone(),
                    feeds_scraped: Vec::new(),
                })
                .with_metric("total_urls", 0)
                .with_metric("successful_fetches", 0)
        };
        if topics.is_empty() {
            return Ok(no_data(format!(
                "No topics found for briefing {}, skipping scraping",
                briefing_id
            )));
        }

        let topic_ids: Vec<String> = topics.iter().map(|t| t.id.clone()).collect();
        let feeds_by_topic = self
            .context
            .with_repository(|repo| repo.feeds_for_topics(&topic_ids))?;
        let pending = pending_feeds(feeds_by_topic.into_values().flatten());
        if pending.is_empty() {
            return Ok(no_data(format!(
                "No unfetched articles for briefing {} topics, skipping scraping",
                briefing_id
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent(user_agent.clone())
            .default_headers(headers)
            .build()?;
        let robots = Arc::new(RobotsCache::default());
        let delay = Duration::from_secs_f64(rate_limit.max(0.0));

        info!("Attempting to fetch {} URLs", pending.len());
        let progress = self
            .context
            .logger_manager
            .progress(pending.len() as u64, "Fetching content");
        let links: Vec<String> = pending.iter().map(|f| f.link.clone()).collect();
        let outcomes = run_bounded(links, max_concurrent, &progress, |link| {
            let client = client.clone();
            let robots = Arc::clone(&robots);
            let user_agent = user_agent.clone();
            async move {
                if check_robots_txt && !robots.allowed(&client, &user_agent, &link).await {
                    warn!("Skipping {}: not allowed by robots.txt", link);
                    return Ok(FetchOutcome::DisallowedByRobots);
                }
                tokio::time::sleep(delay).await;
                fetch_page(&client, &link).await.map(FetchOutcome::Fetched)
            }
        })
        .await;

        let mut updates: Vec<(i32, String)> = Vec::new();
        let mut skipped_robots = 0;
        for (feed, outcome) in pending.iter().zip(outcomes) {
            match outcome {
                Some(FetchOutcome::Fetched(text)) if !text.is_empty() => {
                    updates.push((feed.id, text));
                }
                Some(FetchOutcome::DisallowedByRobots) => skipped_robots += 1,
                _ => {}
            }
        }

        self.context
            .with_repository(|repo| repo.update_scraped_text(&updates))?;
        let total_urls = pending.len();
        let successful_fetches = updates.len();
        info!(
            "Successfully fetched {}/{} URLs",
            successful_fetches, total_urls
        );

        Ok(TaskResult::success(&self.name)
            .with_metric("total_urls", total_urls)
            .with_metric("successful_fetches", successful_fetches)
            .with_metric("skipped_robots", skipped_robots)
            .with_metric(
                "success_rate",
                successful_fetches as f64 / total_urls as f64,
            )
            .with_data(TaskData::ContentFetching {
                briefing_id,
                feeds_scraped: updates.iter().map(|(id, _)| *id).collect(),
            }))
    }
}

#[async_trait]
impl Task for ContentFetchingTask {
    task_accessors!(ContentFetching);

    async fn execute(&mut self) -> TaskResult {
        match self.fetch().await {
            Ok(result) => result,
            Err(e) => {
                error!("Content fetching failed: {}", e);
                TaskResult::failure(&self.name, e.to_string())
                    .with_metric("total_urls", 0)
                    .with_metric("successful_fetches", 0)
            }
        }
    }
}

/// Feeds that still need their page text, each link once.
fn pending_feeds(feeds: impl Iterator<Item = FeedEntry>) -> Vec<FeedEntry> {
    let mut seen = HashSet::new();
    feeds
        .filter(|f| f.scraped_text.as_deref().map_or(true, str::is_empty))
        .filter(|f| seen.insert(f.id))
        .collect()
}

async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String, Error> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(Error::Validation(format!(
            "Failed to fetch {}, status: {}",
            url,
            response.status()
        )));
    }
    let html = response.text().await?;
    debug!("Fetched {} ({} bytes)", url, html.len());
    Ok(html_to_text(&html))
}

/// Parsed robots.txt files keyed by scheme and host. `None` means no usable file,
/// which allows everything.
#[derive(Default)]
struct RobotsCache {
    robots: Mutex<HashMap<String, Option<Arc<Robot>>>>,
}

impl RobotsCache {
    async fn allowed(&self, client: &reqwest::Client, user_agent: &str, url: &str) -> bool {
        let Some(origin) = origin_of(url) else {
            return true;
        };

        let mut robots = self.robots.lock().await;
        if !robots.contains_key(&origin) {
            let fetched = fetch_robots(client, user_agent, &origin).await;
            robots.insert(origin.clone(), fetched.map(Arc::new));
        }
        match robots.get(&origin) {
            Some(Some(robot)) => robot.allowed(url),
            _ => true,
        }
    }
}

async fn fetch_robots(client: &reqwest::Client, user_agent: &str, origin: &str) -> Option<Robot> {
    let robots_url = format!("{}/robots.txt", origin);
    let response = match client.get(&robots_url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(_) => return None,
        Err(e) => {
            warn!("Error checking robots.txt at {}: {}", robots_url, e);
            return None;
        }
    };
    let body = response.bytes().await.ok()?;
    parse_robots(user_agent, &body)
}

fn parse_robots(user_agent: &str, body: &[u8]) -> Option<Robot> {
    match Robot::new(user_agent, body) {
        Ok(robot) => Some(robot),
        Err(e) => {
            warn!("Unparsable robots.txt: {}", e);
            None
        }
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(id: i32, scraped: Option<&str>) -> FeedEntry {
        FeedEntry {
            id,
            title: None,
            link: format!("https://news.example.com/{}", id),
            published: None,
            summary: None,
            source: "Example".into(),
            feed_url: None,
            fetched_at: "2026-01-01 00:00:00".into(),
            scraped_text: scraped.map(str::to_string),
            summarized_article: None,
        }
    }

    #[test]
    fn test_pending_feeds_skip_scraped_and_duplicates() {
        let feeds = vec![feed(1, None), feed(2, Some("text")), feed(1, None), feed(3, Some(""))];
        let ids: Vec<i32> = pending_feeds(feeds.into_iter()).iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_robots_rules_are_applied() {
        let body = b"User-agent: *\nDisallow: /private/\n";
        let robot = parse_robots("news-briefing", body).unwrap();
        assert!(robot.allowed("https://news.example.com/world/story"));
        assert!(!robot.allowed("https://news.example.com/private/story"));
    }

    #[test]
    fn test_origin_keeps_scheme_host_and_port() {
        assert_eq!(
            origin_of("https://news.example.com/a/b?c=d").as_deref(),
            Some("https://news.example.com")
        );
        assert_eq!(
            origin_of("http://localhost:8080/x").as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(origin_of("not a url"), None);
    }
}
