use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ErrorStatus, SeasonCheck, check_season_value, require_season, to_utc};
use crate::db::{Db, DbError, Rating, SeasonRating};

#[derive(Debug, thiserror::Error)]
pub enum RatingError {
    #[error("rating note must be between 0 and 10")]
    InvalidNote,
    #[error("group {group_id} do not have title {title_id} or do not exist")]
    TitleNotInGroup { group_id: String, title_id: String },
    #[error("group not found")]
    GroupNotFound,
    #[error("title not found")]
    TitleNotFound,
    #[error("user rating already exists for this title")]
    AlreadyExists,
    #[error("rating not found")]
    NotFound,
    #[error("season number is required for TV series ratings")]
    SeasonRequired,
    #[error("season number must be greater than 0")]
    InvalidSeason,
    #[error("season {0} does not exist for this title")]
    SeasonDoesNotExist(i64),
    #[error("rating already exists for this season")]
    SeasonRatingAlreadyExists,
    #[error("season {0} is not rated")]
    SeasonNotRated(i64),
    #[error(transparent)]
    Db(DbError)
}

impl ErrorStatus for RatingError {
    fn status(&self) -> Option<u16> {
        match self {
            RatingError::InvalidNote |
            RatingError::SeasonRequired |
            RatingError::InvalidSeason |
            RatingError::SeasonDoesNotExist(_) => Some(400),
            RatingError::TitleNotInGroup { .. } |
            RatingError::GroupNotFound |
            RatingError::TitleNotFound |
            RatingError::NotFound |
            RatingError::SeasonNotRated(_) => Some(404),
            RatingError::AlreadyExists |
            RatingError::SeasonRatingAlreadyExists => Some(409),
            RatingError::Db(_) => None
        }
    }
}

impl From<DbError> for RatingError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound => RatingError::NotFound,
            error => RatingError::Db(error)
        }
    }
}

impl From<SeasonCheck> for RatingError {
    fn from(check: SeasonCheck) -> Self {
        match check {
            SeasonCheck::Required => RatingError::SeasonRequired,
            SeasonCheck::Invalid => RatingError::InvalidSeason,
            SeasonCheck::Missing(season) => {
                RatingError::SeasonDoesNotExist(season)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRating {
    pub group_id: String,
    pub title_id: String,
    pub note:     f64,
    #[serde(default)]
    pub season:   Option<i64>
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatingUpdate {
    pub note:   f64,
    #[serde(default)]
    pub season: Option<i64>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingsBatchRequest {
    #[serde(default)]
    pub group_id: Option<String>,
    pub titles:   Vec<String>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonRatingResponse {
    pub rating:     f64,
    pub added_at:   DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingResponse {
    pub id:              String,
    pub title_id:        String,
    pub user_id:         String,
    pub note:            f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasons_ratings: Option<BTreeMap<String, SeasonRatingResponse>>,
    pub created_at:      DateTime<Utc>,
    pub updated_at:      DateTime<Utc>
}

impl From<SeasonRating> for SeasonRatingResponse {
    fn from(season: SeasonRating) -> Self {
        Self {
            rating:     season.rating,
            added_at:   to_utc(season.added_at),
            updated_at: to_utc(season.updated_at)
        }
    }
}

impl From<Rating> for RatingResponse {
    fn from(rating: Rating) -> Self {
        Self {
            id:              rating.id,
            title_id:        rating.title_id,
            user_id:         rating.user_id,
            note:            rating.note,
            seasons_ratings: rating.seasons_ratings.map(|seasons| {
                seasons
                    .into_iter()
                    .map(|(season, rating)| (season, rating.into()))
                    .collect()
            }),
            created_at:      to_utc(rating.created_at),
            updated_at:      to_utc(rating.updated_at)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TitleRatings {
    pub ratings: Vec<RatingResponse>
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingsBatch {
    pub titles: HashMap<String, Vec<RatingResponse>>
}

pub fn validate_note(note: f64) -> Result<f64, RatingError> {
    if !(0.0..=10.0).contains(&note) {
        return Err(RatingError::InvalidNote);
    }

    Ok(note)
}


#[derive(Debug, Clone)]
pub struct RatingService {
    db: Db
}

impl RatingService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn ensure_in_group(
        &self,
        user_id: &str,
        group_id: &str,
        title_id: &str
    ) -> Result<(), RatingError> {
        if !self
            .db
            .group_contains_title(group_id, title_id, user_id)
            .await?
        {
            return Err(RatingError::TitleNotInGroup {
                group_id: group_id.to_string(),
                title_id: title_id.to_string()
            });
        }

        Ok(())
    }

    async fn title(
        &self,
        title_id: &str
    ) -> Result<crate::db::Title, RatingError> {
        match self.db.get_title(title_id).await {
            Err(DbError::NotFound) => Err(RatingError::TitleNotFound),
            result => Ok(result?)
        }
    }

    pub async fn add(
        &self,
        user_id: &str,
        new: NewRating
    ) -> Result<RatingResponse, RatingError> {
        let note = validate_note(new.note)?;

        self.ensure_in_group(user_id, &new.group_id, &new.title_id)
            .await?;

        let title = self.title(&new.title_id).await?;

        if !title.is_series() {
            let rating = Rating::new(&title.id, user_id, note);

            return match self.db.add_rating(&rating).await {
                Ok(()) => Ok(rating.into()),
                Err(DbError::Duplicate) => Err(RatingError::AlreadyExists),
                Err(e) => Err(e.into())
            };
        }

        let season = require_season(&title, new.season)?;

        let rating = Rating::new_season(&title.id, user_id, season, note);

        match self.db.add_rating(&rating).await {
            Ok(()) => return Ok(rating.into()),
            Err(DbError::Duplicate) => {
                debug!(
                    title_id = %title.id,
                    season,
                    "rating exists, merging season"
                );
            }
            Err(e) => return Err(e.into())
        }

        self.db
            .add_rating_season(&title.id, user_id, season, note)
            .await?
            .map(RatingResponse::from)
            .ok_or(RatingError::SeasonRatingAlreadyExists)
    }

    pub async fn get_by_id(
        &self,
        user_id: &str,
        id: &str
    ) -> Result<RatingResponse, RatingError> {
        Ok(self.db.get_rating(id, user_id).await?.into())
    }

    /// Ratings on the title by every member of the group.
    pub async fn get_by_title(
        &self,
        user_id: &str,
        group_id: &str,
        title_id: &str
    ) -> Result<TitleRatings, RatingError> {
        self.ensure_in_group(user_id, group_id, title_id).await?;

        let group = match self.db.get_group_for_member(group_id, user_id).await
        {
            Err(DbError::NotFound) => {
                return Err(RatingError::TitleNotInGroup {
                    group_id: group_id.to_string(),
                    title_id: title_id.to_string()
                });
            }
            result => result?
        };

        Ok(TitleRatings {
            ratings: self
                .db
                .get_ratings_by_title(title_id, &group.users)
                .await?
                .into_iter()
                .map(RatingResponse::from)
                .collect()
        })
    }

    /// Ratings keyed by title. Scoped to the group's members when a group is
    /// given, otherwise to the caller's own ratings.
    pub async fn get_batch(
        &self,
        user_id: &str,
        request: RatingsBatchRequest
    ) -> Result<RatingsBatch, RatingError> {
        let users = match &request.group_id {
            Some(group_id) => {
                match self.db.get_group_for_member(group_id, user_id).await {
                    Err(DbError::NotFound) => {
                        return Err(RatingError::GroupNotFound);
                    }
                    result => result?.users
                }
            }
            None => vec![user_id.to_string()]
        };

        let mut titles: HashMap<String, Vec<RatingResponse>> = request
            .titles
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect();

        if titles.is_empty() {
            return Ok(RatingsBatch { titles });
        }

        let ids: Vec<String> = titles.keys().cloned().collect();

        for rating in self.db.get_ratings_by_titles(&ids, &users).await? {
            titles
                .entry(rating.title_id.clone())
                .or_default()
                .push(rating.into());
        }

        Ok(RatingsBatch { titles })
    }

    pub async fn update(
        &self,
        user_id: &str,
        id: &str,
        update: RatingUpdate
    ) -> Result<RatingResponse, RatingError> {
        let note = validate_note(update.note)?;

        let rating = self.db.get_rating(id, user_id).await?;

        let title = self.title(&rating.title_id).await?;

        if !title.is_series() {
            return Ok(self.db.update_rating(id, user_id, note).await?.into());
        }

        let season = require_season(&title, update.season)?;

        if rating.season(season).is_none() {
            return Err(RatingError::SeasonNotRated(season));
        }

        match self
            .db
            .update_rating_season(id, user_id, season, note)
            .await
        {
            Ok(rating) => Ok(rating.into()),
            // ? the season was removed between the read and the write
            Err(DbError::NotFound) => Err(RatingError::SeasonNotRated(season)),
            Err(e) => Err(e.into())
        }
    }

    pub async fn delete(
        &self,
        user_id: &str,
        id: &str
    ) -> Result<(), RatingError> {
        if self.db.delete_rating(id, user_id).await? == 0 {
            return Err(RatingError::NotFound);
        }

        Ok(())
    }

    /// `Ok(None)` when the last season was removed along with the rating.
    pub async fn delete_season(
        &self,
        user_id: &str,
        id: &str,
        season: i64
    ) -> Result<Option<RatingResponse>, RatingError> {
        let season = check_season_value(season)?;

        Ok(self
            .db
            .delete_rating_season(id, user_id, season)
            .await?
            .map(RatingResponse::from))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_bounds() {
        assert_eq!(validate_note(0.0).unwrap(), 0.0);
        assert_eq!(validate_note(10.0).unwrap(), 10.0);
        assert!(matches!(validate_note(15.0), Err(RatingError::InvalidNote)));
        assert!(matches!(validate_note(-0.5), Err(RatingError::InvalidNote)));
        assert!(matches!(validate_note(f64::NAN), Err(RatingError::InvalidNote)));
    }

    #[test]
    fn test_status_table() {
        assert_eq!(RatingError::InvalidNote.status(), Some(400));
        assert_eq!(RatingError::AlreadyExists.status(), Some(409));
        assert_eq!(RatingError::SeasonRatingAlreadyExists.status(), Some(409));
        assert_eq!(RatingError::SeasonNotRated(2).status(), Some(404));
        assert_eq!(RatingError::Db(DbError::Duplicate).status(), None);
    }

    #[test]
    fn test_messages() {
        let error = RatingError::TitleNotInGroup {
            group_id: "g1".to_string(),
            title_id: "tt1".to_string()
        };

        assert_eq!(
            error.to_string(),
            "group g1 do not have title tt1 or do not exist"
        );
        assert_eq!(
            RatingError::InvalidNote.to_string(),
            "rating note must be between 0 and 10"
        );
    }

    #[test]
    fn test_response_timestamps_serialize_rfc3339() {
        let rating = Rating::new_season("tt1", "u1", 1, 8.0);
        let response = RatingResponse::from(rating);

        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["note"], 8.0);
        assert_eq!(json["createdAt"], json["updatedAt"]);
        assert!(json["createdAt"].as_str().unwrap().contains('T'));
        assert_eq!(json["seasonsRatings"]["1"]["rating"], 8.0);
    }

    #[test]
    fn test_new_rating_accepts_missing_season() {
        let new: NewRating = serde_json::from_str(
            r#"{"groupId": "g1", "titleId": "tt1", "note": 7}"#
        )
        .unwrap();

        assert_eq!(new.note, 7.0);
        assert!(new.season.is_none());
    }
}
