use crate::schema::{briefing_topics, briefings, feeds, topic_feeds, topics};
use diesel::{Insertable, Queryable};
use serde::{Deserialize, Serialize};

/// A stored feed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
pub struct FeedEntry {
    pub id: i32,
    pub title: Option<String>,
    pub link: String,
    /// UTC timestamp, `%Y-%m-%d %H:%M:%S`
    pub published: Option<String>,
    pub summary: Option<String>,
    /// Configured name of the feed the entry came from
    pub source: String,
    pub feed_url: Option<String>,
    pub fetched_at: String,
    pub scraped_text: Option<String>,
    pub summarized_article: Option<String>,
}

impl FeedEntry {
    pub fn title_or_link(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.link)
    }
}

/// A feed entry about to be stored
#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = feeds)]
pub struct NewFeedEntry {
    pub title: Option<String>,
    pub link: String,
    pub published: Option<String>,
    pub summary: Option<String>,
    pub source: String,
    pub feed_url: Option<String>,
    pub fetched_at: String,
}

/// A cluster of related feed entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = topics)]
pub struct Topic {
    /// `{YYYY-MM-DD-HH-MM}-{cluster label}`
    pub id: String,
    pub title: Option<String>,
    pub generated_at: String,
    pub summary: Option<String>,
}

impl Topic {
    /// Minute resolution timestamp the topic id starts with.
    pub fn id_timestamp(&self) -> String {
        self.id.split('-').take(5).collect::<Vec<_>>().join("-")
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Insertable)]
#[diesel(table_name = topic_feeds)]
pub struct TopicFeed {
    pub topic_id: String,
    pub feed_id: i32,
    pub used_for_summarization: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = briefings)]
pub struct Briefing {
    pub id: String,
    pub title: Option<String>,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Insertable)]
#[diesel(table_name = briefing_topics)]
pub struct BriefingTopic {
    pub briefing_id: String,
    pub topic_id: String,
}

/// An article listed under a topic in the rendered briefing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicArticle {
    pub source: String,
    pub title: String,
    pub link: String,
    pub used_for_summarization: bool,
}
