use std::{sync::Arc, time::Duration};

use bson::Document;
use serde::Serialize;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet
};
use tracing::{debug, error, info, warn};

use crate::{
    Env,
    db::{Db, DbError, now, title::TitleSnapshot},
    imdb::{
        CatalogTitle,
        ImdbError,
        MetadataSource,
        RetryPolicy,
        SeriesDetails,
        fetch_series_details,
        with_retry
    }
};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("catalog request failed: {0}")]
    Upstream(#[from] ImdbError),
    #[error(transparent)]
    Db(#[from] DbError)
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub workers:    usize,
    pub policy:     RetryPolicy
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            workers:    5,
            policy:     RetryPolicy::default()
        }
    }
}

impl SyncConfig {
    pub fn from_env(env: &Env) -> Self {
        Self {
            batch_size: env.sync_batch_size.max(1),
            workers:    env.sync_workers.max(1),
            policy:     RetryPolicy {
                max_attempts: env.sync_max_retries.max(1),
                cooldown:     Duration::from_secs(env.sync_cooldown_secs)
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub batches:        u64,
    pub failed_batches: u64,
    pub updated:        u64,
    pub unchanged:      u64,
    pub skipped:        u64
}

impl SyncReport {
    fn merge(&mut self, other: SyncReport) {
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
    }
}

/// Fields of the stored title that differ from the fresh catalog data.
/// Series lists that came back empty never replace stored ones, an empty
/// list there means the fetch failed.
pub fn diff_title(
    stored: &TitleSnapshot,
    fresh: &CatalogTitle,
    details: &SeriesDetails
) -> Result<Document, DbError> {
    let mut changes = Document::new();

    if stored.primary_image != fresh.primary_image {
        changes.insert("primaryImage", bson::to_bson(&fresh.primary_image)?);
    }

    if stored.rating != fresh.rating {
        changes.insert("rating", bson::to_bson(&fresh.rating)?);
    }

    if stored.metacritic != fresh.metacritic {
        changes.insert("metacritic", bson::to_bson(&fresh.metacritic)?);
    }

    if !details.seasons.is_empty() && stored.seasons != details.seasons {
        changes.insert("seasons", bson::to_bson(&details.seasons)?);
    }

    if !details.episodes.is_empty() && stored.episodes != details.episodes {
        changes.insert("episodes", bson::to_bson(&details.episodes)?);
    }

    Ok(changes)
}

async fn sync_batch(
    db: &Db,
    source: &dyn MetadataSource,
    policy: &RetryPolicy,
    batch: &[String]
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();

    let titles =
        with_retry(policy, "batch", || source.batch_titles(batch)).await?;

    if titles.len() < batch.len() {
        warn!(
            requested = batch.len(),
            returned = titles.len(),
            "catalog returned fewer titles than requested"
        );
        report.skipped += (batch.len() - titles.len()) as u64;
    }

    for fresh in titles {
        let Some(stored) = db.get_title_snapshot(&fresh.id).await? else {
            warn!(title_id = %fresh.id, "title not stored, skipping");
            report.skipped += 1;
            continue;
        };

        let details = if fresh.is_series() {
            fetch_series_details(source, &fresh.id, policy).await
        } else {
            SeriesDetails::default()
        };

        let mut changes = diff_title(&stored, &fresh, &details)?;
        let fields: Vec<String> = changes.keys().cloned().collect();

        changes.insert("updatedAt", now());

        db.set_title_fields(&fresh.id, changes).await?;

        if fields.is_empty() {
            debug!(title_id = %fresh.id, "updatedAt only");
            report.unchanged += 1;
        } else {
            info!(title_id = %fresh.id, ?fields, "fields changed");
            report.updated += 1;
        }
    }

    Ok(report)
}

async fn worker(
    id: usize,
    db: Db,
    source: Arc<dyn MetadataSource>,
    policy: RetryPolicy,
    receiver: Arc<Mutex<mpsc::Receiver<Vec<String>>>>
) -> SyncReport {
    let mut report = SyncReport::default();

    loop {
        let Some(batch) = receiver.lock().await.recv().await else {
            break;
        };

        report.batches += 1;

        match sync_batch(&db, source.as_ref(), &policy, &batch).await {
            Ok(outcome) => report.merge(outcome),
            Err(e) => {
                error!(worker = id, titles = ?batch, error = %e, "batch failed");
                report.failed_batches += 1;
            }
        }
    }

    debug!(worker = id, "worker finished");

    report
}

/// Refreshes every stored title from the catalog. Only reading the title
/// ids is fatal, a failing batch is logged and counted.
pub async fn run_sync(
    db: Db,
    source: Arc<dyn MetadataSource>,
    config: SyncConfig
) -> Result<SyncReport, DbError> {
    let ids = db.get_all_title_ids().await?;

    let batch_size = config.batch_size.max(1);
    let workers = config.workers.max(1);

    info!(
        titles = ids.len(),
        batches = ids.len().div_ceil(batch_size),
        workers,
        "starting title sync"
    );

    let (sender, receiver) = mpsc::channel::<Vec<String>>(workers * 2);
    let receiver = Arc::new(Mutex::new(receiver));

    let mut pool = JoinSet::new();

    for id in 0..workers {
        pool.spawn(worker(
            id,
            db.clone(),
            source.clone(),
            config.policy.clone(),
            receiver.clone()
        ));
    }

    for batch in ids.chunks(batch_size) {
        if sender.send(batch.to_vec()).await.is_err() {
            error!("every sync worker stopped, abandoning remaining batches");
            break;
        }
    }

    drop(sender);

    let mut report = SyncReport::default();

    while let Some(result) = pool.join_next().await {
        match result {
            Ok(outcome) => report.merge(outcome),
            Err(e) => error!(error = %e, "sync worker panicked")
        }
    }

    info!(
        batches = report.batches,
        failed_batches = report.failed_batches,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        "title sync finished"
    );

    Ok(report)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::imdb::models::{Episode, Image, Season, TitleRating};

    fn snapshot() -> TitleSnapshot {
        bson::from_document(bson::doc! {
            "_id": "tt0133093",
            "type": "movie",
            "primaryImage": { "url": "a.jpg", "width": 10, "height": 20 },
            "rating": { "aggregateRating": 8.7, "voteCount": 100 }
        })
        .unwrap()
    }

    fn catalog() -> CatalogTitle {
        serde_json::from_str(
            r#"{
                "id": "tt0133093",
                "type": "movie",
                "primaryImage": {"url": "a.jpg", "width": 10, "height": 20},
                "rating": {"aggregateRating": 8.7, "voteCount": 100}
            }"#
        )
        .unwrap()
    }

    #[test]
    fn test_identical_data_has_no_changes() {
        let changes =
            diff_title(&snapshot(), &catalog(), &SeriesDetails::default())
                .unwrap();

        assert!(changes.is_empty());
    }

    #[test]
    fn test_image_change_only_sets_image() {
        let mut fresh = catalog();
        fresh.primary_image = Image {
            url:    "b.jpg".to_string(),
            width:  10,
            height: 20
        };

        let changes =
            diff_title(&snapshot(), &fresh, &SeriesDetails::default()).unwrap();

        assert_eq!(changes.keys().collect::<Vec<_>>(), vec!["primaryImage"]);
        assert_eq!(
            changes.get_document("primaryImage").unwrap().get_str("url").unwrap(),
            "b.jpg"
        );
    }

    #[test]
    fn test_rating_and_metacritic_changes() {
        let mut fresh = catalog();
        fresh.rating = TitleRating {
            aggregate_rating: 8.8,
            vote_count:       101
        };

        let changes =
            diff_title(&snapshot(), &fresh, &SeriesDetails::default()).unwrap();

        assert!(changes.contains_key("rating"));
        assert!(!changes.contains_key("metacritic"));
    }

    #[test]
    fn test_series_lists() {
        let mut stored = snapshot();
        stored.seasons = vec![Season {
            season:        "1".to_string(),
            episode_count: 7
        }];

        let empty = diff_title(&stored, &catalog(), &SeriesDetails::default())
            .unwrap();
        assert!(!empty.contains_key("seasons"));

        let details = SeriesDetails {
            seasons:  vec![
                Season {
                    season:        "1".to_string(),
                    episode_count: 7
                },
                Season {
                    season:        "2".to_string(),
                    episode_count: 13
                },
            ],
            episodes: vec![Episode {
                id:              "tt1".to_string(),
                title:           None,
                primary_image:   None,
                season:          Some("2".to_string()),
                episode_number:  Some(1),
                runtime_seconds: None,
                plot:            None,
                rating:          None,
                release_date:    None
            }]
        };

        let changes = diff_title(&stored, &catalog(), &details).unwrap();
        assert!(changes.contains_key("seasons"));
        assert!(changes.contains_key("episodes"));
    }

    #[test]
    fn test_report_merge() {
        let mut report = SyncReport {
            batches: 1,
            updated: 2,
            ..Default::default()
        };

        report.merge(SyncReport {
            batches: 2,
            failed_batches: 1,
            skipped: 3,
            ..Default::default()
        });

        assert_eq!(report, SyncReport {
            batches:        3,
            failed_batches: 1,
            updated:        2,
            unchanged:      0,
            skipped:        3
        });
    }
}
