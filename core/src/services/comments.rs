use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ErrorStatus, SeasonCheck, check_season_value, require_season, to_utc};
use crate::db::{Comment, Db, DbError, SeasonComment, Title};

#[derive(Debug, thiserror::Error)]
pub enum CommentError {
    #[error("comment cannot be empty")]
    CommentIsEmpty,
    #[error("group {group_id} do not have title {title_id} or do not exist")]
    TitleNotInGroup { group_id: String, title_id: String },
    #[error("title not found")]
    TitleNotFound,
    #[error("user comment already exists for this title")]
    AlreadyExists,
    #[error("comment not found")]
    NotFound,
    #[error("season number is required for TV series comments")]
    SeasonRequired,
    #[error("season value is invalid")]
    InvalidSeason,
    #[error("season {0} does not exist for this title")]
    SeasonDoesNotExist(i64),
    #[error("season comment already exists for this title")]
    SeasonCommentAlreadyExists,
    #[error("season {0} has no comment")]
    SeasonNotCommented(i64),
    #[error(transparent)]
    Db(DbError)
}

impl ErrorStatus for CommentError {
    fn status(&self) -> Option<u16> {
        match self {
            CommentError::CommentIsEmpty |
            CommentError::SeasonRequired |
            CommentError::InvalidSeason |
            CommentError::SeasonDoesNotExist(_) => Some(400),
            CommentError::TitleNotInGroup { .. } |
            CommentError::TitleNotFound |
            CommentError::NotFound |
            CommentError::SeasonNotCommented(_) => Some(404),
            CommentError::AlreadyExists |
            CommentError::SeasonCommentAlreadyExists => Some(409),
            CommentError::Db(_) => None
        }
    }
}

impl From<DbError> for CommentError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound => CommentError::NotFound,
            error => CommentError::Db(error)
        }
    }
}

impl From<SeasonCheck> for CommentError {
    fn from(check: SeasonCheck) -> Self {
        match check {
            SeasonCheck::Required => CommentError::SeasonRequired,
            SeasonCheck::Invalid => CommentError::InvalidSeason,
            SeasonCheck::Missing(season) => {
                CommentError::SeasonDoesNotExist(season)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub group_id: String,
    pub title_id: String,
    pub comment:  String,
    #[serde(default)]
    pub season:   Option<i64>
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentUpdate {
    pub comment: String,
    #[serde(default)]
    pub season:  Option<i64>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonCommentResponse {
    pub comment:    String,
    pub added_at:   DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id:               String,
    pub title_id:         String,
    pub user_id:          String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment:          Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasons_comments: Option<BTreeMap<String, SeasonCommentResponse>>,
    pub created_at:       DateTime<Utc>,
    pub updated_at:       DateTime<Utc>
}

impl From<SeasonComment> for SeasonCommentResponse {
    fn from(season: SeasonComment) -> Self {
        Self {
            comment:    season.comment,
            added_at:   to_utc(season.added_at),
            updated_at: to_utc(season.updated_at)
        }
    }
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id:               comment.id,
            title_id:         comment.title_id,
            user_id:          comment.user_id,
            comment:          comment.comment,
            seasons_comments: comment.seasons_comments.map(|seasons| {
                seasons
                    .into_iter()
                    .map(|(season, comment)| (season, comment.into()))
                    .collect()
            }),
            created_at:       to_utc(comment.created_at),
            updated_at:       to_utc(comment.updated_at)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TitleComments {
    pub comments: Vec<CommentResponse>
}

/// Trimmed body, rejected when nothing is left.
pub fn validate_comment(comment: &str) -> Result<&str, CommentError> {
    let comment = comment.trim();

    if comment.is_empty() {
        return Err(CommentError::CommentIsEmpty);
    }

    Ok(comment)
}


#[derive(Debug, Clone)]
pub struct CommentService {
    db: Db
}

impl CommentService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn ensure_in_group(
        &self,
        user_id: &str,
        group_id: &str,
        title_id: &str
    ) -> Result<(), CommentError> {
        if !self
            .db
            .group_contains_title(group_id, title_id, user_id)
            .await?
        {
            return Err(CommentError::TitleNotInGroup {
                group_id: group_id.to_string(),
                title_id: title_id.to_string()
            });
        }

        Ok(())
    }

    async fn title(&self, title_id: &str) -> Result<Title, CommentError> {
        match self.db.get_title(title_id).await {
            Err(DbError::NotFound) => Err(CommentError::TitleNotFound),
            result => Ok(result?)
        }
    }

    pub async fn add(
        &self,
        user_id: &str,
        new: NewComment
    ) -> Result<CommentResponse, CommentError> {
        let body = validate_comment(&new.comment)?;

        self.ensure_in_group(user_id, &new.group_id, &new.title_id)
            .await?;

        let title = self.title(&new.title_id).await?;

        if !title.is_series() {
            let comment = Comment::new(&title.id, user_id, body);

            return match self.db.add_comment(&comment).await {
                Ok(()) => Ok(comment.into()),
                Err(DbError::Duplicate) => Err(CommentError::AlreadyExists),
                Err(e) => Err(e.into())
            };
        }

        let season = require_season(&title, new.season)?;

        let comment = Comment::new_season(&title.id, user_id, season, body);

        match self.db.add_comment(&comment).await {
            Ok(()) => return Ok(comment.into()),
            Err(DbError::Duplicate) => {
                debug!(
                    title_id = %title.id,
                    season,
                    "comment exists, merging season"
                );
            }
            Err(e) => return Err(e.into())
        }

        self.db
            .add_comment_season(&title.id, user_id, season, body)
            .await?
            .map(CommentResponse::from)
            .ok_or(CommentError::SeasonCommentAlreadyExists)
    }

    pub async fn get_by_id(
        &self,
        user_id: &str,
        id: &str
    ) -> Result<CommentResponse, CommentError> {
        Ok(self.db.get_comment(id, user_id).await?.into())
    }

    pub async fn get_by_title(
        &self,
        user_id: &str,
        group_id: &str,
        title_id: &str
    ) -> Result<TitleComments, CommentError> {
        self.ensure_in_group(user_id, group_id, title_id).await?;

        let group = match self.db.get_group_for_member(group_id, user_id).await
        {
            Err(DbError::NotFound) => {
                return Err(CommentError::TitleNotInGroup {
                    group_id: group_id.to_string(),
                    title_id: title_id.to_string()
                });
            }
            result => result?
        };

        Ok(TitleComments {
            comments: self
                .db
                .get_comments_by_title(title_id, &group.users)
                .await?
                .into_iter()
                .map(CommentResponse::from)
                .collect()
        })
    }

    pub async fn update(
        &self,
        user_id: &str,
        id: &str,
        update: CommentUpdate
    ) -> Result<CommentResponse, CommentError> {
        let body = validate_comment(&update.comment)?;

        let comment = self.db.get_comment(id, user_id).await?;

        let title = self.title(&comment.title_id).await?;

        if !title.is_series() {
            return Ok(self.db.update_comment(id, user_id, body).await?.into());
        }

        let season = require_season(&title, update.season)?;

        let commented = comment
            .seasons_comments
            .as_ref()
            .is_some_and(|seasons| seasons.contains_key(&season.to_string()));

        if !commented {
            return Err(CommentError::SeasonNotCommented(season));
        }

        match self
            .db
            .update_comment_season(id, user_id, season, body)
            .await
        {
            Ok(comment) => Ok(comment.into()),
            Err(DbError::NotFound) => {
                Err(CommentError::SeasonNotCommented(season))
            }
            Err(e) => Err(e.into())
        }
    }

    pub async fn delete(
        &self,
        user_id: &str,
        id: &str
    ) -> Result<(), CommentError> {
        if self.db.delete_comment(id, user_id).await? == 0 {
            return Err(CommentError::NotFound);
        }

        Ok(())
    }

    pub async fn delete_season(
        &self,
        user_id: &str,
        id: &str,
        season: i64
    ) -> Result<Option<CommentResponse>, CommentError> {
        let season = check_season_value(season)?;

        Ok(self
            .db
            .delete_comment_season(id, user_id, season)
            .await?
            .map(CommentResponse::from))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_comments_rejected() {
        assert!(matches!(validate_comment(""), Err(CommentError::CommentIsEmpty)));
        assert!(matches!(
            validate_comment(" \n\t "),
            Err(CommentError::CommentIsEmpty)
        ));
        assert_eq!(validate_comment("  loved it ").unwrap(), "loved it");
    }

    #[test]
    fn test_status_table() {
        assert_eq!(CommentError::CommentIsEmpty.status(), Some(400));
        assert_eq!(
            CommentError::TitleNotInGroup {
                group_id: "g".to_string(),
                title_id: "t".to_string()
            }
            .status(),
            Some(404)
        );
        assert_eq!(CommentError::AlreadyExists.status(), Some(409));
        assert_eq!(CommentError::SeasonCommentAlreadyExists.status(), Some(409));
        assert_eq!(CommentError::Db(DbError::Duplicate).status(), None);
    }

    #[test]
    fn test_season_check_translation() {
        assert!(matches!(
            CommentError::from(SeasonCheck::Missing(4)),
            CommentError::SeasonDoesNotExist(4)
        ));
        assert!(matches!(
            CommentError::from(SeasonCheck::Required),
            CommentError::SeasonRequired
        ));
    }

    #[test]
    fn test_movie_comment_response_omits_seasons() {
        let response = CommentResponse::from(Comment::new("tt1", "u1", "nice"));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["comment"], "nice");
        assert!(json.get("seasonsComments").is_none());
    }
}
