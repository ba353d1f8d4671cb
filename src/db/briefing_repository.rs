use crate::db::models::{
    Briefing, BriefingTopic, FeedEntry, NewFeedEntry, Topic, TopicArticle, TopicFeed,
};
use crate::errors::Error;
use crate::utils::{format_db_timestamp, utc_now_formatted, utc_now_simple};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::collections::BTreeMap;

/// Repository for feeds, topics and briefings in the SQLite database
pub struct BriefingRepository<'a> {
    /// Database connection
    pub conn: &'a mut SqliteConnection,
}

impl<'a> BriefingRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        BriefingRepository { conn }
    }

    /// Stores feed entries, ignoring those already present for the same (source, link).
    ///
    /// # Returns
    ///
    /// The number of newly inserted rows
    pub fn insert_feed_entries(&mut self, entries: &[NewFeedEntry]) -> Result<usize, Error> {
        use crate::schema::feeds;

        self.conn.transaction::<_, Error, _>(|conn| {
            let mut inserted = 0;
            for entry in entries {
                inserted += diesel::insert_or_ignore_into(feeds::table)
                    .values(entry)
                    .execute(conn)?;
            }
            Ok(inserted)
        })
    }

    /// Feed entries published within the last `hours`, newest first.
    pub fn recent_feeds(&mut self, hours: i64) -> Result<Vec<FeedEntry>, Error> {
        use crate::schema::feeds;

        let cutoff = format_db_timestamp(&(Utc::now() - Duration::hours(hours)));
        Ok(feeds::table
            .filter(feeds::published.ge(cutoff))
            .order(feeds::published.desc())
            .load::<FeedEntry>(self.conn)?)
    }

    /// Inserts topics together with the feed entries that belong to them.
    pub fn insert_topics(&mut self, clusters: &[(Topic, Vec<i32>)]) -> Result<usize, Error> {
        use crate::schema::{topic_feeds, topics};

        self.conn.transaction::<_, Error, _>(|conn| {
            let mut inserted = 0;
            for (topic, feed_ids) in clusters {
                inserted += diesel::insert_or_ignore_into(topics::table)
                    .values(topic)
                    .execute(conn)?;
                for feed_id in feed_ids {
                    diesel::insert_or_ignore_into(topic_feeds::table)
                        .values(TopicFeed {
                            topic_id: topic.id.clone(),
                            feed_id: *feed_id,
                            used_for_summarization: false,
                        })
                        .execute(conn)?;
                }
            }
            Ok(inserted)
        })
    }

    /// The briefing with the greatest id; ids are timestamps so this is the newest one.
    pub fn most_recent_briefing(&mut self) -> Result<Option<Briefing>, Error> {
        use crate::schema::briefings;

        Ok(briefings::table
            .order(briefings::id.desc())
            .first::<Briefing>(self.conn)
            .optional()?)
    }

    /// Topics generated within `hours` that belong to the newest clustering run.
    pub fn most_recent_topics(&mut self, hours: i64) -> Result<Vec<Topic>, Error> {
        use crate::schema::topics;

        let cutoff = format_db_timestamp(&(Utc::now() - Duration::hours(hours)));
        let recent = topics::table
            .filter(topics::generated_at.ge(cutoff))
            .order(topics::id.asc())
            .load::<Topic>(self.conn)?;

        let Some(newest) = recent.iter().map(Topic::id_timestamp).max() else {
            return Ok(Vec::new());
        };
        Ok(recent
            .into_iter()
            .filter(|topic| topic.id_timestamp() == newest)
            .collect())
    }

    /// Feed entries grouped by topic id, newest first within each topic.
    pub fn feeds_for_topics(
        &mut self,
        topic_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<FeedEntry>>, Error> {
        use crate::schema::{feeds, topic_feeds};

        if topic_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let rows = topic_feeds::table
            .inner_join(feeds::table)
            .filter(topic_feeds::topic_id.eq_any(topic_ids))
            .order((topic_feeds::topic_id.asc(), feeds::published.desc()))
            .select((topic_feeds::topic_id, feeds::all_columns))
            .load::<(String, FeedEntry)>(self.conn)?;

        let mut grouped: BTreeMap<String, Vec<FeedEntry>> = BTreeMap::new();
        for (topic_id, feed) in rows {
            grouped.entry(topic_id).or_default().push(feed);
        }
        Ok(grouped)
    }

    /// Topics of the given briefing, or of the most recent one when `briefing_id` is `None`.
    ///
    /// # Returns
    ///
    /// `None` when no briefing exists, otherwise the briefing id and its topics
    pub fn topics_for_briefing(
        &mut self,
        briefing_id: Option<&str>,
    ) -> Result<Option<(String, Vec<Topic>)>, Error> {
        use crate::schema::{briefing_topics, topics};

        let briefing_id = match briefing_id {
            Some(id) => id.to_string(),
            None => match self.most_recent_briefing()? {
                Some(briefing) => briefing.id,
                None => return Ok(None),
            },
        };

        let found = briefing_topics::table
            .inner_join(topics::table)
            .filter(briefing_topics::briefing_id.eq(&briefing_id))
            .order(topics::id.asc())
            .select(topics::all_columns)
            .load::<Topic>(self.conn)?;

        Ok(Some((briefing_id, found)))
    }

    /// Creates a briefing for the selected topics, replacing any briefing with the same id.
    ///
    /// # Arguments
    ///
    /// * `topic_ids` - Selected topic ids
    /// * `briefing_id` - Explicit id; defaults to the current minute
    pub fn store_briefing_with_topics(
        &mut self,
        topic_ids: &[String],
        briefing_id: Option<String>,
    ) -> Result<String, Error> {
        use crate::schema::{briefing_topics, briefings};

        let briefing_id = briefing_id.unwrap_or_else(utc_now_simple);
        let briefing = Briefing {
            id: briefing_id.clone(),
            title: None,
            generated_at: utc_now_formatted(),
        };

        self.conn.transaction::<_, Error, _>(|conn| {
            diesel::replace_into(briefings::table)
                .values(&briefing)
                .execute(conn)?;
            diesel::delete(briefing_topics::table.filter(briefing_topics::briefing_id.eq(&briefing.id)))
                .execute(conn)?;
            for topic_id in topic_ids {
                diesel::insert_or_ignore_into(briefing_topics::table)
                    .values(BriefingTopic {
                        briefing_id: briefing.id.clone(),
                        topic_id: topic_id.clone(),
                    })
                    .execute(conn)?;
            }
            Ok(())
        })?;

        Ok(briefing_id)
    }

    pub fn update_scraped_text(&mut self, texts: &[(i32, String)]) -> Result<usize, Error> {
        use crate::schema::feeds;

        self.conn.transaction::<_, Error, _>(|conn| {
            let mut updated = 0;
            for (feed_id, text) in texts {
                updated += diesel::update(feeds::table.find(*feed_id))
                    .set(feeds::scraped_text.eq(text))
                    .execute(conn)?;
            }
            Ok(updated)
        })
    }

    pub fn update_article_summaries(&mut self, summaries: &[(i32, String)]) -> Result<usize, Error> {
        use crate::schema::feeds;

        self.conn.transaction::<_, Error, _>(|conn| {
            let mut updated = 0;
            for (feed_id, summary) in summaries {
                updated += diesel::update(feeds::table.find(*feed_id))
                    .set(feeds::summarized_article.eq(summary))
                    .execute(conn)?;
            }
            Ok(updated)
        })
    }

    pub fn update_topic_titles(&mut self, titles: &[(String, String)]) -> Result<usize, Error> {
        use crate::schema::topics;

        self.conn.transaction::<_, Error, _>(|conn| {
            let mut updated = 0;
            for (topic_id, title) in titles {
                updated += diesel::update(topics::table.find(topic_id))
                    .set(topics::title.eq(title))
                    .execute(conn)?;
            }
            Ok(updated)
        })
    }

    /// Writes topic summaries and flags the feeds each summary was built from.
    pub fn store_topic_summaries(
        &mut self,
        summaries: &[(String, String, Vec<i32>)],
    ) -> Result<usize, Error> {
        use crate::schema::{topic_feeds, topics};

        self.conn.transaction::<_, Error, _>(|conn| {
            let mut updated = 0;
            for (topic_id, summary, used_feed_ids) in summaries {
                updated += diesel::update(topics::table.find(topic_id))
                    .set(topics::summary.eq(summary))
                    .execute(conn)?;
                diesel::update(
                    topic_feeds::table
                        .filter(topic_feeds::topic_id.eq(topic_id))
                        .filter(topic_feeds::feed_id.eq_any(used_feed_ids)),
                )
                .set(topic_feeds::used_for_summarization.eq(true))
                .execute(conn)?;
            }
            Ok(updated)
        })
    }

    /// Articles of a topic for display, newest first.
    pub fn articles_for_topic(&mut self, topic_id: &str) -> Result<Vec<TopicArticle>, Error> {
        use crate::schema::{feeds, topic_feeds};

        let rows = topic_feeds::table
            .inner_join(feeds::table)
            .filter(topic_feeds::topic_id.eq(topic_id))
            .order(feeds::published.desc())
            .select((
                feeds::source,
                feeds::title,
                feeds::link,
                topic_feeds::used_for_summarization,
            ))
            .load::<(String, Option<String>, String, bool)>(self.conn)?;

        Ok(rows
            .into_iter()
            .map(|(source, title, link, used)| TopicArticle {
                source,
                title: title.unwrap_or_else(|| link.clone()),
                link,
                used_for_summarization: used,
            })
            .collect())
    }
}
