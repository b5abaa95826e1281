use std::collections::HashMap;

use brunan_document::Document;
use bson::Document as BsonDocument;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::ReturnDocument};
use serde::{Deserialize, Serialize};

use super::{Db, DbError, new_id, now};

#[derive(Debug, Clone, Document, Serialize, Deserialize)]
#[document(collection = "comments")]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id:               String,
    pub title_id:         String,
    pub user_id:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment:          Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasons_comments: Option<HashMap<String, SeasonComment>>,
    pub created_at:       bson::DateTime,
    pub updated_at:       bson::DateTime
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonComment {
    pub comment:    String,
    pub added_at:   bson::DateTime,
    pub updated_at: bson::DateTime
}

impl Comment {
    pub fn new(title_id: &str, user_id: &str, comment: &str) -> Self {
        let now = now();

        Self {
            id: new_id(),
            title_id: title_id.to_string(),
            user_id: user_id.to_string(),
            comment: Some(comment.to_string()),
            seasons_comments: None,
            created_at: now,
            updated_at: now
        }
    }

    pub fn new_season(
        title_id: &str,
        user_id: &str,
        season: i64,
        comment: &str
    ) -> Self {
        let now = now();

        Self {
            id: new_id(),
            title_id: title_id.to_string(),
            user_id: user_id.to_string(),
            comment: None,
            seasons_comments: Some(HashMap::from([(
                season.to_string(),
                SeasonComment {
                    comment:    comment.to_string(),
                    added_at:   now,
                    updated_at: now
                }
            )])),
            created_at: now,
            updated_at: now
        }
    }
}

fn season_path(season: i64) -> String {
    format!("seasonsComments.{season}")
}

fn owner_filter(id: &str, user_id: &str) -> BsonDocument {
    doc! { "_id": id, "userId": user_id }
}

impl Db {
    pub async fn add_comment(&self, comment: &Comment) -> Result<(), DbError> {
        Comment::collection(self).insert_one(comment).await?;

        Ok(())
    }

    /// `Ok(None)` when the user has no comment document for the title or
    /// the season already has one.
    pub async fn add_comment_season(
        &self,
        title_id: &str,
        user_id: &str,
        season: i64,
        comment: &str
    ) -> Result<Option<Comment>, DbError> {
        let now = now();
        let path = season_path(season);

        Ok(Comment::collection(self)
            .find_one_and_update(
                doc! {
                    "titleId": title_id,
                    "userId": user_id,
                    &path: { "$exists": false }
                },
                doc! {
                    "$set": {
                        &path: {
                            "comment": comment,
                            "addedAt": now,
                            "updatedAt": now
                        },
                        "updatedAt": now
                    }
                }
            )
            .return_document(ReturnDocument::After)
            .await?)
    }

    pub async fn get_comment(
        &self,
        id: &str,
        user_id: &str
    ) -> Result<Comment, DbError> {
        Comment::find_one(self, owner_filter(id, user_id))
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn get_comments_by_title(
        &self,
        title_id: &str,
        user_ids: &[String]
    ) -> Result<Vec<Comment>, DbError> {
        Ok(Comment::collection(self)
            .find(doc! {
                "titleId": title_id,
                "userId": { "$in": user_ids }
            })
            .sort(doc! { "createdAt": 1 })
            .await?
            .try_collect()
            .await?)
    }

    pub async fn update_comment(
        &self,
        id: &str,
        user_id: &str,
        comment: &str
    ) -> Result<Comment, DbError> {
        Comment::collection(self)
            .find_one_and_update(
                owner_filter(id, user_id),
                doc! { "$set": { "comment": comment, "updatedAt": now() } }
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn update_comment_season(
        &self,
        id: &str,
        user_id: &str,
        season: i64,
        comment: &str
    ) -> Result<Comment, DbError> {
        let now = now();
        let path = season_path(season);

        let mut filter = owner_filter(id, user_id);
        filter.insert(&path, doc! { "$exists": true });

        Comment::collection(self)
            .find_one_and_update(
                filter,
                doc! {
                    "$set": {
                        format!("{path}.comment"): comment,
                        format!("{path}.updatedAt"): now,
                        "updatedAt": now
                    }
                }
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn delete_comment(
        &self,
        id: &str,
        user_id: &str
    ) -> Result<u64, DbError> {
        Ok(Comment::collection(self)
            .delete_one(owner_filter(id, user_id))
            .await?
            .deleted_count)
    }

    /// Removes one season comment, deleting the document when nothing is
    /// left on it. `Ok(None)` when the document was deleted.
    pub async fn delete_comment_season(
        &self,
        id: &str,
        user_id: &str,
        season: i64
    ) -> Result<Option<Comment>, DbError> {
        let path = season_path(season);

        let mut filter = owner_filter(id, user_id);
        filter.insert(&path, doc! { "$exists": true });

        let comment = Comment::collection(self)
            .find_one_and_update(
                filter,
                doc! {
                    "$unset": { &path: "" },
                    "$set": { "updatedAt": now() }
                }
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DbError::NotFound)?;

        if comment
            .seasons_comments
            .as_ref()
            .is_some_and(|seasons| !seasons.is_empty())
        {
            return Ok(Some(comment));
        }

        Comment::collection(self)
            .delete_one(doc! {
                "_id": id,
                "userId": user_id,
                "seasonsComments": {}
            })
            .await?;

        Ok(None)
    }

    pub async fn delete_comments_by_title(
        &self,
        title_id: &str
    ) -> Result<u64, DbError> {
        Ok(Comment::collection(self)
            .delete_many(doc! { "titleId": title_id })
            .await?
            .deleted_count)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_comment_shape() {
        let comment = Comment::new("tt1", "u1", "great");
        let stored = bson::to_document(&comment).unwrap();

        assert_eq!(stored.get_str("comment").unwrap(), "great");
        assert!(!stored.contains_key("seasonsComments"));
        assert_eq!(comment.created_at, comment.updated_at);
    }

    #[test]
    fn test_season_comment_shape() {
        let comment = Comment::new_season("tt1", "u1", 2, "slow start");
        let stored = bson::to_document(&comment).unwrap();

        assert!(!stored.contains_key("comment"));
        assert_eq!(
            stored
                .get_document("seasonsComments")
                .unwrap()
                .get_document("2")
                .unwrap()
                .get_str("comment")
                .unwrap(),
            "slow start"
        );
    }
}
