use crate::constants::{DISPLAY_DATE_FORMAT, ID_TIMESTAMP_FORMAT, INCOHERENT_CONTENT_MARKER};
use crate::core::{Task, TaskContext, TaskData, TaskResult};
use crate::db::TopicArticle;
use crate::errors::Error;
use crate::utils::utc_now_simple;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use minijinja::{AutoEscape, Environment};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

const DEFAULT_TEMPLATE: &str = include_str!("../templates/briefing.html.j2");

/// Renders a briefing, its topic summaries and related articles to an HTML file.
pub struct BriefingHtmlGenerationTask {
    name: String,
    human_review: bool,
    context: TaskContext,
}

#[derive(Debug, Serialize)]
struct RenderedTopic {
    title: String,
    summary: String,
    articles: Vec<TopicArticle>,
}

#[derive(Debug, Serialize)]
struct BriefingPage<'a> {
    briefing_id: &'a str,
    date: String,
    topics: &'a [RenderedTopic],
}

impl BriefingHtmlGenerationTask {
    pub fn new(name: String, human_review: bool, context: TaskContext) -> Self {
        BriefingHtmlGenerationTask {
            name,
            human_review,
            context,
        }
    }

    async fn render(&mut self) -> Result<TaskResult, Error> {
        let output_path: String =
            self.param("output_path", format!("briefings/{}.html", utc_now_simple()))?;
        let template: Option<String> = self.param("template_string", None)?;
        let scope = self.task_type();
        let requested = self.context.briefing_id(scope)?;

        let Some((briefing_id, topics)) = self
            .context
            .with_repository(|repo| repo.topics_for_briefing(requested.as_deref()))?
        else {
            return Ok(TaskResult::no_data(&self.name, "No briefing found")
                .with_metric("topics_rendered", 0));
        };
        if topics.is_empty() {
            return Ok(TaskResult::no_data(
                &self.name,
                &format!("No topics found for briefing {}", briefing_id),
            )
            .with_metric("topics_rendered", 0));
        }

        let mut rendered = Vec::new();
        let mut skipped = 0;
        for topic in &topics {
            let summary = topic.summary.as_deref().unwrap_or_default();
            if summary.trim().is_empty() {
                warn!("Skipping topic {} with no summary", topic.id);
                skipped += 1;
                continue;
            }
            if summary.contains(INCOHERENT_CONTENT_MARKER) {
                warn!("Skipping topic {} due to incoherent content error", topic.id);
                skipped += 1;
                continue;
            }
            let articles = self
                .context
                .with_repository(|repo| repo.articles_for_topic(&topic.id))?;
            rendered.push(RenderedTopic {
                title: topic.display_title().to_string(),
                summary: summary.to_string(),
                articles,
            });
        }

        let html = render_page(
            template.as_deref().unwrap_or(DEFAULT_TEMPLATE),
            &BriefingPage {
                briefing_id: &briefing_id,
                date: display_date(&briefing_id),
                topics: &rendered,
            },
        )?;

        let path = Path::new(&output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, html)?;
        info!("Briefing HTML saved to {}", output_path);

        let mut result = TaskResult::success(&self.name)
            .with_metric("topics_rendered", rendered.len())
            .with_metric("topics_skipped", skipped)
            .with_data(TaskData::BriefingRendering {
                briefing_id,
                output_path,
                topics_count: topics.len(),
            });
        if skipped > 0 {
            let warning = format!("Skipped {} topic(s) without summary", skipped);
            warn!("{}", warning);
            result = result.with_warning(warning);
        }
        Ok(result)
    }
}

#[async_trait]
impl Task for BriefingHtmlGenerationTask {
    task_accessors!(BriefingHtmlGeneration);

    async fn execute(&mut self) -> TaskResult {
        match self.render().await {
            Ok(result) => result,
            Err(e) => {
                error!("Rendering failed: {}", e);
                TaskResult::failure(&self.name, e.to_string()).with_metric("topics_rendered", 0)
            }
        }
    }
}

fn render_page(template: &str, page: &BriefingPage<'_>) -> Result<String, Error> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    Ok(env.render_str(template, page)?)
}

/// Human readable date of a timestamp briefing id, or the id itself.
fn display_date(briefing_id: &str) -> String {
    match NaiveDateTime::parse_from_str(briefing_id, ID_TIMESTAMP_FORMAT) {
        Ok(date) => date.format(DISPLAY_DATE_FORMAT).to_string(),
        Err(_) => {
            warn!("Could not parse briefing ID as date: {}", briefing_id);
            briefing_id.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, ConfigManager};
    use crate::db::{BriefingRepository, Database, NewFeedEntry, Topic};
    use crate::utils::{utc_now_formatted, LoggerManager};
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn seeded_db() -> Database {
        let db = Database::new(":memory:").unwrap();
        let mut conn = db.get_conn().unwrap();
        let mut repo = BriefingRepository::new(&mut conn);
        let now = utc_now_formatted();
        let entries: Vec<NewFeedEntry> = ["a", "b"]
            .iter()
            .map(|slug| NewFeedEntry {
                title: Some(format!("<b>{}</b> story", slug)),
                link: format!("https://example.com/{}", slug),
                published: Some(now.clone()),
                summary: None,
                source: "Wire".into(),
                feed_url: None,
                fetched_at: now.clone(),
            })
            .collect();
        repo.insert_feed_entries(&entries).unwrap();

        let topic = |id: &str, title: &str| Topic {
            id: id.into(),
            title: Some(title.into()),
            generated_at: now.clone(),
            summary: None,
        };
        repo.insert_topics(&[
            (topic("2026-01-05-08-30-0", "Rates held"), vec![1, 2]),
            (topic("2026-01-05-08-30-1", "Unclear"), vec![2]),
            (topic("2026-01-05-08-30-2", "Empty"), vec![]),
        ])
        .unwrap();
        repo.store_topic_summaries(&[
            ("2026-01-05-08-30-0".into(), "Central bank held rates.".into(), vec![1]),
            (
                "2026-01-05-08-30-1".into(),
                "<ERROR> Cannot determine coherent topic. <ERROR>".into(),
                vec![],
            ),
        ])
        .unwrap();
        repo.store_briefing_with_topics(
            &[
                "2026-01-05-08-30-0".into(),
                "2026-01-05-08-30-1".into(),
                "2026-01-05-08-30-2".into(),
            ],
            Some("2026-01-05-08-30".into()),
        )
        .unwrap();
        drop(conn);
        db
    }

    #[tokio::test]
    async fn test_renders_summarized_topics_only() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out/briefing.html");
        let mut params = Map::new();
        params.insert("output_path".into(), json!(output.to_string_lossy()));

        let conf = ConfigManager::from_settings(Map::new(), Map::new(), CliArgs::new());
        let ctx = TaskContext::new(
            seeded_db(),
            Arc::new(conf),
            Arc::new(LoggerManager::detached()),
            params,
            None,
        );
        let mut task = BriefingHtmlGenerationTask::new("render".into(), false, ctx);
        let result = task.execute().await;

        assert!(result.is_success(), "{:?}", result.error());
        assert_eq!(result.metrics()["topics_rendered"], 1);
        assert_eq!(result.metrics()["topics_skipped"], 2);
        assert_eq!(result.warning(), Some("Skipped 2 topic(s) without summary"));

        let html = fs::read_to_string(&output).unwrap();
        assert!(html.contains("January 05, 2026 08:30"));
        assert!(html.contains("Central bank held rates."));
        assert!(html.contains("&lt;b&gt;a&lt;"));
        assert!(!html.contains("<b>a"));
        assert!(html.contains("Used in Summary"));
        assert!(!html.contains("Unclear"));
    }

    #[tokio::test]
    async fn test_missing_briefing_is_no_data() {
        let conf = ConfigManager::from_settings(Map::new(), Map::new(), CliArgs::new());
        let ctx = TaskContext::new(
            Database::new(":memory:").unwrap(),
            Arc::new(conf),
            Arc::new(LoggerManager::detached()),
            Map::new(),
            None,
        );
        let mut task = BriefingHtmlGenerationTask::new("render".into(), false, ctx);
        let result = task.execute().await;
        assert!(result.is_success());
        assert!(result.is_no_data());
    }

    #[test]
    fn test_display_date_falls_back_to_id() {
        assert_eq!(display_date("2026-03-01-17-05"), "March 01, 2026 17:05");
        assert_eq!(display_date("manual"), "manual");
    }
}
