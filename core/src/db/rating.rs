use std::collections::HashMap;

use brunan_document::Document;
use bson::Document as BsonDocument;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::ReturnDocument};
use serde::{Deserialize, Serialize};

use super::{Db, DbError, new_id, now};

#[derive(Debug, Clone, Document, Serialize, Deserialize)]
#[document(collection = "ratings")]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    #[serde(rename = "_id")]
    pub id:              String,
    pub title_id:        String,
    pub user_id:         String,
    pub note:            f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasons_ratings: Option<HashMap<String, SeasonRating>>,
    pub created_at:      bson::DateTime,
    pub updated_at:      bson::DateTime
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonRating {
    pub rating:     f64,
    pub added_at:   bson::DateTime,
    pub updated_at: bson::DateTime
}

impl Rating {
    pub fn new(title_id: &str, user_id: &str, note: f64) -> Self {
        let now = now();

        Self {
            id: new_id(),
            title_id: title_id.to_string(),
            user_id: user_id.to_string(),
            note,
            seasons_ratings: None,
            created_at: now,
            updated_at: now
        }
    }

    /// A series rating starts with a single season, the overall note is
    /// that season's rating.
    pub fn new_season(
        title_id: &str,
        user_id: &str,
        season: i64,
        note: f64
    ) -> Self {
        let mut rating = Self::new(title_id, user_id, note);

        rating.seasons_ratings = Some(HashMap::from([(
            season.to_string(),
            SeasonRating {
                rating:     note,
                added_at:   rating.created_at,
                updated_at: rating.created_at
            }
        )]));

        rating
    }

    pub fn season(&self, season: i64) -> Option<&SeasonRating> {
        self.seasons_ratings
            .as_ref()
            .and_then(|seasons| seasons.get(&season.to_string()))
    }
}

/// Mean of every season rating, used as the overall series note.
pub fn season_mean(seasons: &HashMap<String, SeasonRating>) -> Option<f64> {
    if seasons.is_empty() {
        return None;
    }

    Some(
        seasons.values().map(|season| season.rating).sum::<f64>() /
            seasons.len() as f64
    )
}

/// Pipeline stage recomputing `note` from `seasonsRatings` server side, so
/// concurrent season writes never average a stale copy.
fn recompute_note_stage() -> BsonDocument {
    doc! {
        "$set": {
            "note": {
                "$ifNull": [
                    { "$avg": {
                        "$map": {
                            "input": { "$objectToArray": "$seasonsRatings" },
                            "as": "season",
                            "in": "$$season.v.rating"
                        }
                    }},
                    0.0
                ]
            }
        }
    }
}

fn season_path(season: i64) -> String {
    format!("seasonsRatings.{season}")
}

fn owner_filter(id: &str, user_id: &str) -> BsonDocument {
    doc! { "_id": id, "userId": user_id }
}

impl Db {
    /// Duplicate (userId, titleId) surfaces as `DbError::Duplicate` from
    /// the unique index.
    pub async fn add_rating(&self, rating: &Rating) -> Result<(), DbError> {
        Rating::collection(self).insert_one(rating).await?;

        Ok(())
    }

    /// Adds a season to the user's existing rating of a title. `Ok(None)`
    /// when there is no rating document or the season is already rated.
    pub async fn add_rating_season(
        &self,
        title_id: &str,
        user_id: &str,
        season: i64,
        note: f64
    ) -> Result<Option<Rating>, DbError> {
        let now = now();
        let path = season_path(season);

        Ok(Rating::collection(self)
            .find_one_and_update(
                doc! {
                    "titleId": title_id,
                    "userId": user_id,
                    &path: { "$exists": false }
                },
                vec![
                    doc! {
                        "$set": {
                            &path: {
                                "rating": note,
                                "addedAt": now,
                                "updatedAt": now
                            },
                            "updatedAt": now
                        }
                    },
                    recompute_note_stage(),
                ]
            )
            .return_document(ReturnDocument::After)
            .await?)
    }

    pub async fn get_rating(
        &self,
        id: &str,
        user_id: &str
    ) -> Result<Rating, DbError> {
        Rating::find_one(self, owner_filter(id, user_id))
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn get_user_rating_for_title(
        &self,
        title_id: &str,
        user_id: &str
    ) -> Result<Option<Rating>, DbError> {
        Ok(Rating::find_one(self, doc! {
            "titleId": title_id,
            "userId": user_id
        })
        .await?)
    }

    /// Ratings of `title_id` written by any of `user_ids`.
    pub async fn get_ratings_by_title(
        &self,
        title_id: &str,
        user_ids: &[String]
    ) -> Result<Vec<Rating>, DbError> {
        Ok(Rating::collection(self)
            .find(doc! {
                "titleId": title_id,
                "userId": { "$in": user_ids }
            })
            .sort(doc! { "createdAt": 1 })
            .await?
            .try_collect()
            .await?)
    }

    pub async fn get_ratings_by_titles(
        &self,
        title_ids: &[String],
        user_ids: &[String]
    ) -> Result<Vec<Rating>, DbError> {
        Ok(Rating::collection(self)
            .find(doc! {
                "titleId": { "$in": title_ids },
                "userId": { "$in": user_ids }
            })
            .sort(doc! { "createdAt": 1 })
            .await?
            .try_collect()
            .await?)
    }

    /// Movie update: the note is set directly. Filtered by id and owner,
    /// a miss is `NotFound` whatever the cause.
    pub async fn update_rating(
        &self,
        id: &str,
        user_id: &str,
        note: f64
    ) -> Result<Rating, DbError> {
        Rating::collection(self)
            .find_one_and_update(
                owner_filter(id, user_id),
                doc! { "$set": { "note": note, "updatedAt": now() } }
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Updates an already-rated season and recomputes the overall note.
    pub async fn update_rating_season(
        &self,
        id: &str,
        user_id: &str,
        season: i64,
        note: f64
    ) -> Result<Rating, DbError> {
        let now = now();
        let path = season_path(season);

        let mut filter = owner_filter(id, user_id);
        filter.insert(&path, doc! { "$exists": true });

        Rating::collection(self)
            .find_one_and_update(filter, vec![
                doc! {
                    "$set": {
                        format!("{path}.rating"): note,
                        format!("{path}.updatedAt"): now,
                        "updatedAt": now
                    }
                },
                recompute_note_stage(),
            ])
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn delete_rating(
        &self,
        id: &str,
        user_id: &str
    ) -> Result<u64, DbError> {
        Ok(Rating::collection(self)
            .delete_one(owner_filter(id, user_id))
            .await?
            .deleted_count)
    }

    /// Removes one season. When it was the last one the whole rating is
    /// deleted and `Ok(None)` is returned.
    pub async fn delete_rating_season(
        &self,
        id: &str,
        user_id: &str,
        season: i64
    ) -> Result<Option<Rating>, DbError> {
        let path = season_path(season);

        let mut filter = owner_filter(id, user_id);
        filter.insert(&path, doc! { "$exists": true });

        let rating = Rating::collection(self)
            .find_one_and_update(filter, vec![
                doc! { "$unset": path.as_str() },
                doc! { "$set": { "updatedAt": now() } },
                recompute_note_stage(),
            ])
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DbError::NotFound)?;

        if rating
            .seasons_ratings
            .as_ref()
            .is_some_and(|seasons| !seasons.is_empty())
        {
            return Ok(Some(rating));
        }

        // ? guarded on the empty map so a season added meanwhile survives
        Rating::collection(self)
            .delete_one(doc! {
                "_id": id,
                "userId": user_id,
                "seasonsRatings": {}
            })
            .await?;

        Ok(None)
    }

    pub async fn delete_ratings_by_title(
        &self,
        title_id: &str
    ) -> Result<u64, DbError> {
        Ok(Rating::collection(self)
            .delete_many(doc! { "titleId": title_id })
            .await?
            .deleted_count)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_mean() {
        let first = Rating::new_season("tt1", "u1", 1, 5.0);
        let mut seasons = first.seasons_ratings.clone().unwrap();

        assert_eq!(season_mean(&seasons), Some(5.0));

        seasons.insert("2".to_string(), SeasonRating {
            rating:     8.0,
            added_at:   first.created_at,
            updated_at: first.created_at
        });

        assert_eq!(season_mean(&seasons), Some(6.5));
        assert_eq!(season_mean(&HashMap::new()), None);
    }

    #[test]
    fn test_new_rating_timestamps_match() {
        let rating = Rating::new("tt1", "u1", 7.5);

        assert_eq!(rating.created_at, rating.updated_at);
        assert!(rating.seasons_ratings.is_none());

        let stored = bson::to_document(&rating).unwrap();
        assert!(!stored.contains_key("seasonsRatings"));
    }

    #[test]
    fn test_new_season_rating() {
        let rating = Rating::new_season("tt1", "u1", 3, 9.0);

        assert_eq!(rating.note, 9.0);
        assert_eq!(rating.season(3).unwrap().rating, 9.0);
        assert!(rating.season(1).is_none());
    }

    #[test]
    fn test_recompute_stage_reads_season_ratings() {
        let stage = recompute_note_stage();
        let note = stage.get_document("$set").unwrap().get_document("note").unwrap();

        assert!(note.contains_key("$ifNull"));
    }
}
