use async_trait::async_trait;
use news_briefing::config::{CliArgs, ConfigManager, StaticEnv, TaskConfig, WorkflowDefinition};
use news_briefing::core::{ScriptedConsole, TaskData, WorkflowHandler};
use news_briefing::db::{BriefingRepository, Database, NewFeedEntry, Topic};
use news_briefing::errors::Error;
use news_briefing::llm::{ChatMessage, LlmClient, LlmProvider, LlmResponse, ProviderKind, TokenUsage};
use news_briefing::tasks::BuiltinTasks;
use news_briefing::utils::{utc_now_formatted, utc_now_simple, LoggerManager};
use serde_json::{json, Map};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Answers with the first reply whose marker appears anywhere in the conversation.
#[derive(Debug)]
struct CannedProvider {
    replies: Vec<(&'static str, String)>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LlmProvider for CannedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        "canned"
    }

    async fn call_llm_api(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let conversation: String = messages.iter().map(|m| m.content.as_str()).collect();
        self.replies
            .iter()
            .find(|(marker, _)| conversation.contains(marker))
            .map(|(_, reply)| LlmResponse {
                content: reply.clone(),
                usage: TokenUsage::new(10, 5),
            })
            .ok_or_else(|| Error::Llm("no canned reply".to_string()))
    }
}

/// Two topics from one clustering run, three scraped articles.
fn seed(db: &Database) -> Vec<String> {
    let mut conn = db.get_conn().unwrap();
    let mut repo = BriefingRepository::new(&mut conn);
    let now = utc_now_formatted();
    let entries: Vec<NewFeedEntry> = [("Wire", "rates"), ("Daily", "rates-2"), ("Wire", "storm")]
        .iter()
        .map(|(source, slug)| NewFeedEntry {
            title: Some(format!("Story about {}", slug)),
            link: format!("https://example.com/{}", slug),
            published: Some(now.clone()),
            summary: Some(format!("Abstract of {}", slug)),
            source: source.to_string(),
            feed_url: None,
            fetched_at: now.clone(),
        })
        .collect();
    repo.insert_feed_entries(&entries).unwrap();
    repo.update_scraped_text(&[
        (1, "The central bank held rates.".into()),
        (2, "Rates stay where they were.".into()),
        (3, "A storm hit the coast.".into()),
    ])
    .unwrap();

    let prefix = utc_now_simple();
    let ids = vec![format!("{}-0", prefix), format!("{}-1", prefix)];
    let topic = |id: &str| Topic {
        id: id.to_string(),
        title: None,
        generated_at: now.clone(),
        summary: None,
    };
    repo.insert_topics(&[(topic(&ids[0]), vec![1, 2]), (topic(&ids[1]), vec![3])])
        .unwrap();
    ids
}

#[tokio::test]
async fn test_llm_stages_produce_a_rendered_briefing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("briefings/today.html");
    let db = Database::new(":memory:").unwrap();
    let topic_ids = seed(&db);

    let calls = Arc::new(AtomicUsize::new(0));
    let provider = CannedProvider {
        replies: vec![
            ("TOPIC TITLE", "\"Central bank holds rates\"".to_string()),
            ("chief editor", format!("<think>rates matter</think>[{}]", topic_ids[0])),
            ("topic analysis", "Rates were held steady.".to_string()),
            ("concise article summaries", "The bank kept rates.".to_string()),
        ],
        calls: Arc::clone(&calls),
    };

    let tasks = vec![
        TaskConfig::new("titles", "topic_title_generation"),
        TaskConfig::new("select", "topic_selection")
            .depends_on(&["titles"])
            .with_param("nr_topics", 1),
        TaskConfig::new("summarize_articles", "article_summarization").depends_on(&["select"]),
        TaskConfig::new("summarize_topics", "topic_summarization")
            .depends_on(&["summarize_articles"]),
        TaskConfig::new("render", "briefing_html_generation")
            .depends_on(&["summarize_topics"])
            .with_param("output_path", output.to_string_lossy().to_string()),
    ];
    let mut workflows = BTreeMap::new();
    workflows.insert("daily".to_string(), WorkflowDefinition { tasks });

    let conf = ConfigManager::from_settings(Map::new(), Map::new(), CliArgs::new())
        .with_env(StaticEnv::default());
    let mut handler = WorkflowHandler::new(
        db.clone(),
        Arc::new(conf),
        Arc::new(LoggerManager::detached()),
        Some(Arc::new(LlmClient::new(provider))),
        workflows,
        Arc::new(BuiltinTasks),
    )
    .with_console(ScriptedConsole::default());

    let results = handler.execute_workflow("daily").await.unwrap();
    for (name, result) in results.iter() {
        assert!(result.is_success(), "{} failed: {:?}", name, result.error());
    }

    let titles = results.get("titles").unwrap();
    assert_eq!(titles.metrics()["titles_generated"], json!(2));
    assert_eq!(titles.metrics()["sum_total_tokens"], json!(30));

    let briefing_id = match results.get("select").unwrap().data() {
        Some(TaskData::TopicSelection {
            briefing_id: Some(id),
            selected_topics,
            ..
        }) => {
            assert_eq!(selected_topics, &vec![topic_ids[0].clone()]);
            id.clone()
        }
        other => panic!("unexpected selection data {:?}", other),
    };

    assert_eq!(
        results.get("summarize_articles").unwrap().metrics()["summaries_generated"],
        json!(2)
    );
    match results.get("render").unwrap().data() {
        Some(TaskData::BriefingRendering {
            briefing_id: rendered,
            topics_count,
            ..
        }) => {
            assert_eq!(rendered, &briefing_id);
            assert_eq!(*topics_count, 1);
        }
        other => panic!("unexpected render data {:?}", other),
    }

    let html = std::fs::read_to_string(&output).unwrap();
    assert!(html.contains("Central bank holds rates"));
    assert!(html.contains("Rates were held steady."));
    assert!(html.contains("Used in Summary"));
    assert!(!html.contains("storm"));

    // 2 titles, 1 selection, 2 article summaries, 1 topic summary
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_selection_without_topics_is_not_a_failure() {
    let conf = ConfigManager::from_settings(Map::new(), Map::new(), CliArgs::new())
        .with_env(StaticEnv::default());
    let provider = CannedProvider {
        replies: Vec::new(),
        calls: Arc::default(),
    };
    let mut workflows = BTreeMap::new();
    workflows.insert(
        "daily".to_string(),
        WorkflowDefinition {
            tasks: vec![
                TaskConfig::new("select", "topic_selection"),
                TaskConfig::new("render", "briefing_html_generation").depends_on(&["select"]),
            ],
        },
    );
    let mut handler = WorkflowHandler::new(
        Database::new(":memory:").unwrap(),
        Arc::new(conf),
        Arc::new(LoggerManager::detached()),
        Some(Arc::new(LlmClient::new(provider))),
        workflows,
        Arc::new(BuiltinTasks),
    );

    let results = handler.execute_workflow("daily").await.unwrap();

    let select = results.get("select").unwrap();
    assert!(select.is_success());
    assert!(select.is_no_data());
    let render = results.get("render").unwrap();
    assert!(render.is_success());
    assert!(render.is_no_data());
}
