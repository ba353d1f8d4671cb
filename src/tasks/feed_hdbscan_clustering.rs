use crate::core::{Task, TaskContext, TaskData, TaskResult};
use crate::db::Topic;
use crate::errors::Error;
use crate::llm::{embedder_for, ProviderKind};
use crate::utils::{utc_now_formatted, utc_now_simple};
use async_trait::async_trait;
use hdbscan::{Hdbscan, HdbscanHyperParams};
use std::collections::BTreeMap;
use tracing::{error, info};

const DEFAULT_TIME_WINDOW_HOURS: i64 = 24;
const DEFAULT_EMBEDDING_PROVIDER: &str = "ollama";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_MIN_SAMPLES: usize = 2;
const DEFAULT_MIN_CLUSTER_SIZE: usize = 2;
const DEFAULT_EPSILON: f64 = 0.1;

/// Label HDBSCAN assigns to points outside every cluster.
pub const NOISE_LABEL: i32 = -1;

/// HDBSCAN hyper parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSettings {
    pub min_samples: usize,
    pub min_cluster_size: usize,
    pub epsilon: f64,
}

/// Groups recent feed entries into topics by clustering their embeddings.
pub struct FeedHdbscanClusteringTask {
    name: String,
    human_review: bool,
    context: TaskContext,
}

impl FeedHdbscanClusteringTask {
    pub fn new(name: String, human_review: bool, context: TaskContext) -> Self {
        FeedHdbscanClusteringTask {
            name,
            human_review,
            context,
        }
    }

    async fn cluster(&mut self) -> Result<TaskResult, Error> {
        let time_window: i64 = self.param("time_window_hours", DEFAULT_TIME_WINDOW_HOURS)?;
        let provider: String =
            self.param("embedding_provider", DEFAULT_EMBEDDING_PROVIDER.to_string())?;
        let model: String = self.param("embedding_model", DEFAULT_EMBEDDING_MODEL.to_string())?;
        let settings = ClusterSettings {
            min_samples: self.param("min_samples", DEFAULT_MIN_SAMPLES)?,
            min_cluster_size: self.param("min_cluster_size", DEFAULT_MIN_CLUSTER_SIZE)?,
            epsilon: self.param("epsilon", DEFAULT_EPSILON)?,
        };

        let feeds = self
            .context
            .with_repository(|repo| repo.recent_feeds(time_window))?;
        info!(
            "{} feed entries found in the last {} hours",
            feeds.len(),
            time_window
        );
        if feeds.is_empty() {
            return Ok(TaskResult::no_data(
                &self.name,
                &format!("No feed entries found in the last {} hours", time_window),
            )
            .with_metric("feeds_clustered", 0)
            .with_metric("topics_created", 0));
        }

        let texts: Vec<String> = feeds
            .iter()
            .map(|f| {
                format!(
                    "{}: {}. {}",
                    f.source,
                    f.title_or_link(),
                    f.summary.as_deref().unwrap_or_default()
                )
            })
            .collect();

        let embedder = embedder_for(provider.parse::<ProviderKind>()?, &model, &self.context.conf)?;
        info!("Embedding {} entries with {}", texts.len(), model);
        let embeddings = embedder.embed_texts(&texts).await?;
        if embeddings.len() != feeds.len() {
            return Err(Error::Clustering(format!(
                "Expected {} embeddings, got {}",
                feeds.len(),
                embeddings.len()
            )));
        }

        info!("Running HDBSCAN clustering");
        let labels = cluster_embeddings(&embeddings, &settings)?;
        let noise_points = labels.iter().filter(|l| **l == NOISE_LABEL).count();
        if noise_points == labels.len() {
            return Ok(TaskResult::failure(
                &self.name,
                "Clustering failed: No valid clusters found. All entries were classified as noise. \
                 Try adjusting clustering parameters (min_samples, min_cluster_size, epsilon) \
                 to allow for smaller or more relaxed clusters.",
            )
            .with_metric("feeds_clustered", 0)
            .with_metric("topics_created", 0)
            .with_metric("noise_points", noise_points)
            .with_metric("min_samples", settings.min_samples)
            .with_metric("min_cluster_size", settings.min_cluster_size)
            .with_metric("epsilon", settings.epsilon));
        }

        let mut groups: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
        for (feed, label) in feeds.iter().zip(&labels) {
            if *label != NOISE_LABEL {
                groups.entry(*label).or_default().push(feed.id);
            }
        }

        let stamp = utc_now_simple();
        let generated_at = utc_now_formatted();
        let clusters: Vec<(Topic, Vec<i32>)> = groups
            .into_iter()
            .map(|(label, feed_ids)| {
                let topic = Topic {
                    id: format!("{}-{}", stamp, label),
                    title: None,
                    generated_at: generated_at.clone(),
                    summary: None,
                };
                (topic, feed_ids)
            })
            .collect();
        let topic_ids: Vec<String> = clusters.iter().map(|(t, _)| t.id.clone()).collect();

        self.context
            .with_repository(|repo| repo.insert_topics(&clusters))?;
        info!(
            "Created {} topics from {} entries ({} noise)",
            topic_ids.len(),
            labels.len() - noise_points,
            noise_points
        );

        Ok(TaskResult::success(&self.name)
            .with_metric("feeds_clustered", labels.len() - noise_points)
            .with_metric("topics_created", topic_ids.len())
            .with_metric("noise_points", noise_points)
            .with_data(TaskData::Clustering { topic_ids }))
    }
}

#[async_trait]
impl Task for FeedHdbscanClusteringTask {
    task_accessors!(FeedHdbscanClustering);

    async fn execute(&mut self) -> TaskResult {
        match self.cluster().await {
            Ok(result) => result,
            Err(e) => {
                error!("Clustering failed: {}", e);
                TaskResult::failure(&self.name, e.to_string())
                    .with_metric("feeds_clustered", 0)
                    .with_metric("topics_created", 0)
            }
        }
    }
}

/// Clusters embedding vectors; returns one label per input, [`NOISE_LABEL`] for noise.
pub fn cluster_embeddings(
    embeddings: &[Vec<f32>],
    settings: &ClusterSettings,
) -> Result<Vec<i32>, Error> {
    if embeddings.len() < settings.min_cluster_size.max(2) {
        return Ok(vec![NOISE_LABEL; embeddings.len()]);
    }

    let data: Vec<Vec<f64>> = embeddings
        .iter()
        .map(|v| v.iter().map(|x| f64::from(*x)).collect())
        .collect();
    let hyper_params = HdbscanHyperParams::builder()
        .min_cluster_size(settings.min_cluster_size)
        .min_samples(settings.min_samples)
        .epsilon(settings.epsilon)
        .build();
    Hdbscan::new(&data, hyper_params)
        .cluster()
        .map_err(|e| Error::Clustering(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn blob(center: f32, n: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| vec![center + i as f32 * 0.01, center - i as f32 * 0.01])
            .collect()
    }

    #[test]
    fn test_two_separated_groups_form_two_clusters() {
        let mut points = blob(0.0, 6);
        points.extend(blob(50.0, 6));
        let settings = ClusterSettings {
            min_samples: 2,
            min_cluster_size: 3,
            epsilon: 0.0,
        };
        let labels = cluster_embeddings(&points, &settings).unwrap();
        assert_eq!(labels.len(), 12);

        let clusters: HashSet<i32> = labels.iter().copied().filter(|l| *l != NOISE_LABEL).collect();
        assert_eq!(clusters.len(), 2);
        assert_ne!(labels[0], labels[11]);
    }

    #[test]
    fn test_too_few_points_are_noise() {
        let settings = ClusterSettings {
            min_samples: 2,
            min_cluster_size: 5,
            epsilon: 0.1,
        };
        let labels = cluster_embeddings(&blob(0.0, 3), &settings).unwrap();
        assert_eq!(labels, vec![NOISE_LABEL; 3]);
    }
}
