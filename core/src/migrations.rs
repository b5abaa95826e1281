use std::path::Path;

use bson::{Bson, Document as BsonDocument};
use futures::TryStreamExt;
use mongodb::bson::doc;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{Db, DbError, Group, Title, now, title::is_title_id};

pub const DEFAULT_BACKUP_PATH: &str = "backup_non_movie_titles.json";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("failed to encode backup: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write backup: {0}")]
    Io(#[from] std::io::Error)
}

impl From<mongodb::error::Error> for MigrationError {
    fn from(error: mongodb::error::Error) -> Self {
        MigrationError::Db(error.into())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct TitlesToMapReport {
    pub checked:  u64,
    pub migrated: u64,
    pub skipped:  u64
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonMovieReport {
    pub backed_up:      u64,
    pub groups_updated: u64,
    pub titles_deleted: u64
}

/// Map form of an array shaped `titles` field, keyed by `titleId` (or `id`
/// on the oldest entries). `None` when there is nothing to convert.
pub fn titles_array_to_map(titles: &Bson) -> Option<BsonDocument> {
    let Bson::Array(items) = titles else {
        return None;
    };

    let mut map = BsonDocument::new();

    for item in items {
        let Bson::Document(entry) = item else {
            warn!(?item, "skipping group title that is not a document");
            continue;
        };

        let key = entry
            .get_str("titleId")
            .or_else(|_| entry.get_str("id"))
            .ok()
            .filter(|key| is_title_id(key));

        match key {
            Some(key) => {
                let mut entry = entry.clone();

                entry.remove("id");
                entry.insert("titleId", key);

                map.insert(key, entry);
            }
            None => warn!(?entry, "skipping group title without an id")
        }
    }

    Some(map)
}

/// Converts every group whose `titles` is still an array (or null) into the
/// keyed map form. Safe to run repeatedly.
pub async fn titles_to_map(db: &Db) -> Result<TitlesToMapReport, MigrationError> {
    let mut report = TitlesToMapReport::default();

    let groups: Vec<BsonDocument> = Group::raw_collection(db)
        .find(doc! {
            "$or": [{ "titles": { "$type": "array" } }, { "titles": null }]
        })
        .projection(doc! { "_id": 1, "titles": 1 })
        .await?
        .try_collect()
        .await?;

    report.checked = Group::raw_collection(db).count_documents(doc! {}).await?;

    for group in groups {
        let Ok(id) = group.get_str("_id") else {
            warn!(?group, "skipping group with a non string id");
            continue;
        };

        let titles = match group.get("titles") {
            None | Some(Bson::Null) => BsonDocument::new(),
            Some(titles) => match titles_array_to_map(titles) {
                Some(map) => map,
                None => continue
            }
        };

        let count = titles.len();

        Group::raw_collection(db)
            .update_one(doc! { "_id": id }, doc! {
                "$set": { "titles": titles, "updatedAt": now() }
            })
            .await?;

        info!(group_id = id, titles = count, "converted group titles to map");
        report.migrated += 1;
    }

    report.skipped = report.checked.saturating_sub(report.migrated);

    info!(
        checked = report.checked,
        migrated = report.migrated,
        skipped = report.skipped,
        "titles-to-map finished"
    );

    Ok(report)
}

/// `$unset` document that pulls the given titles out of a group's map.
pub fn unset_titles(ids: &[String]) -> BsonDocument {
    ids.iter()
        .filter(|id| is_title_id(id))
        .map(|id| (format!("titles.{id}"), Bson::String(String::new())))
        .collect()
}

/// Backs up every non-movie title to `backup` as JSON, then removes them
/// from all groups and deletes them. Nothing is deleted if the backup
/// cannot be written.
pub async fn remove_non_movies(
    db: &Db,
    backup: &Path
) -> Result<NonMovieReport, MigrationError> {
    let mut report = NonMovieReport::default();

    let titles: Vec<Title> = Title::collection(db)
        .find(doc! { "type": { "$ne": "movie" } })
        .await?
        .try_collect()
        .await?;

    if titles.is_empty() {
        info!("no non-movie titles found");
        return Ok(report);
    }

    tokio::fs::write(backup, serde_json::to_vec_pretty(&titles)?).await?;

    report.backed_up = titles.len() as u64;

    info!(
        titles = titles.len(),
        path = %backup.display(),
        "backed up non-movie titles"
    );

    let ids: Vec<String> = titles.into_iter().map(|title| title.id).collect();

    let unset = unset_titles(&ids);

    if !unset.is_empty() {
        let any: Vec<BsonDocument> = unset
            .keys()
            .map(|path| doc! { path: { "$exists": true } })
            .collect();

        report.groups_updated = Group::raw_collection(db)
            .update_many(doc! { "$or": any }, doc! {
                "$unset": unset,
                "$set": { "updatedAt": now() }
            })
            .await?
            .modified_count;
    }

    report.titles_deleted = Title::raw_collection(db)
        .delete_many(doc! { "_id": { "$in": ids } })
        .await?
        .deleted_count;

    info!(
        groups_updated = report.groups_updated,
        titles_deleted = report.titles_deleted,
        "non-movie titles removed"
    );

    Ok(report)
}
