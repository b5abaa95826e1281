use std::collections::HashMap;

use brunan_document::Document;
use bson::Document as BsonDocument;
use mongodb::{bson::doc, options::ReturnDocument};
use serde::{Deserialize, Serialize};

use super::{Db, DbError, User, now, title::is_title_id};

#[derive(Debug, Clone, Document, Serialize, Deserialize)]
#[document(collection = "groups")]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(rename = "_id")]
    pub id:         String,
    pub name:       String,
    pub owner_id:   String,
    pub users:      Vec<String>,
    #[serde(default)]
    pub titles:     HashMap<String, GroupTitle>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTitle {
    pub title_id:        String,
    #[serde(default)]
    pub watched:         bool,
    pub added_at:        bson::DateTime,
    pub updated_at:      bson::DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_at:      Option<bson::DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasons_watched: Option<HashMap<String, SeasonWatched>>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonWatched {
    #[serde(default)]
    pub watched:    bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<bson::DateTime>,
    pub added_at:   bson::DateTime,
    pub updated_at: bson::DateTime
}

impl Group {
    pub fn new(name: &str, owner_id: &str) -> Self {
        let now = now();

        Self {
            id:         super::new_id(),
            name:       name.to_string(),
            owner_id:   owner_id.to_string(),
            users:      vec![owner_id.to_string()],
            titles:     HashMap::new(),
            created_at: now,
            updated_at: now
        }
    }
}

impl GroupTitle {
    pub fn new(title_id: &str) -> Self {
        let now = now();

        Self {
            title_id:        title_id.to_string(),
            watched:         false,
            added_at:        now,
            updated_at:      now,
            watched_at:      None,
            seasons_watched: None
        }
    }
}

fn member_filter(group_id: &str, user_id: &str) -> BsonDocument {
    doc! { "_id": group_id, "users": user_id }
}

/// `None` for ids that would not name a single key of the titles map.
fn member_title_filter(
    group_id: &str,
    title_id: &str,
    user_id: &str
) -> Option<BsonDocument> {
    if !is_title_id(title_id) {
        return None;
    }

    let mut filter = member_filter(group_id, user_id);
    filter.insert(format!("titles.{title_id}"), doc! { "$exists": true });

    Some(filter)
}

impl Db {
    /// A group is only visible to its members. A missing group and a
    /// group the user is not part of are both `NotFound`.
    pub async fn get_group_for_member(
        &self,
        group_id: &str,
        user_id: &str
    ) -> Result<Group, DbError> {
        Group::find_one(self, member_filter(group_id, user_id))
            .await?
            .ok_or(DbError::NotFound)
    }

    /// True iff the group exists, `user_id` is a member, and `title_id` is a
    /// key of its titles map. The cause of a `false` is not reported.
    pub async fn group_contains_title(
        &self,
        group_id: &str,
        title_id: &str,
        user_id: &str
    ) -> Result<bool, DbError> {
        let Some(filter) = member_title_filter(group_id, title_id, user_id)
        else {
            return Ok(false);
        };

        Ok(Group::raw_collection(self)
            .find_one(filter)
            .projection(doc! { "_id": 1 })
            .await?
            .is_some())
    }

    pub async fn insert_group(&self, group: &Group) -> Result<(), DbError> {
        Group::collection(self).insert_one(group).await?;

        Ok(())
    }

    pub async fn add_user_to_group(
        &self,
        group_id: &str,
        user_id: &str
    ) -> Result<bool, DbError> {
        Ok(Group::collection(self)
            .update_one(
                doc! { "_id": group_id },
                doc! {
                    "$addToSet": { "users": user_id },
                    "$set": { "updatedAt": now() }
                }
            )
            .await?
            .matched_count >
            0)
    }

    /// Inserts the entry only when the key is absent. `Ok(false)` means the
    /// title was already there, or the group is not visible to the user.
    pub async fn add_title_to_group(
        &self,
        group_id: &str,
        user_id: &str,
        entry: &GroupTitle
    ) -> Result<bool, DbError> {
        let path = format!("titles.{}", entry.title_id);

        let mut filter = member_filter(group_id, user_id);
        filter.insert(&path, doc! { "$exists": false });

        Ok(Group::collection(self)
            .update_one(
                filter,
                doc! {
                    "$set": {
                        &path: bson::to_bson(entry)?,
                        "updatedAt": now()
                    }
                }
            )
            .await?
            .modified_count >
            0)
    }

    pub async fn remove_title_from_group(
        &self,
        group_id: &str,
        user_id: &str,
        title_id: &str
    ) -> Result<bool, DbError> {
        let path = format!("titles.{title_id}");

        let mut filter = member_filter(group_id, user_id);
        filter.insert(&path, doc! { "$exists": true });

        Ok(Group::collection(self)
            .update_one(
                filter,
                doc! {
                    "$unset": { &path: "" },
                    "$set": { "updatedAt": now() }
                }
            )
            .await?
            .modified_count >
            0)
    }

    /// Applies `$set`/`$unset` fields to one title entry of a group and
    /// returns the updated group.
    pub async fn update_group_title(
        &self,
        group_id: &str,
        user_id: &str,
        title_id: &str,
        set: BsonDocument,
        unset: Vec<String>
    ) -> Result<Group, DbError> {
        let mut filter = member_filter(group_id, user_id);
        filter.insert(format!("titles.{title_id}"), doc! { "$exists": true });

        let mut set = set;
        set.insert("updatedAt", now());

        let mut update = doc! { "$set": set };

        if !unset.is_empty() {
            update.insert(
                "$unset",
                unset
                    .into_iter()
                    .map(|path| (path, bson::Bson::String(String::new())))
                    .collect::<BsonDocument>()
            );
        }

        Group::collection(self)
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn get_group_users(
        &self,
        group_id: &str,
        user_id: &str
    ) -> Result<Vec<User>, DbError> {
        let group = self.get_group_for_member(group_id, user_id).await?;

        self.get_users_by_ids(&group.users).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_group_has_owner_as_member() {
        let group = Group::new("friday movies", "owner");

        assert_eq!(group.users, vec!["owner".to_string()]);
        assert!(group.titles.is_empty());
        assert_eq!(group.created_at, group.updated_at);
        assert_eq!(group.id.len(), 24);
    }

    #[test]
    fn test_title_filter_rejects_nested_paths() {
        let filter = member_title_filter("g1", "tt0133093", "u1").unwrap();
        assert!(filter.contains_key("titles.tt0133093"));

        assert!(member_title_filter("g1", "tt0133093.titleId", "u1").is_none());
        assert!(member_title_filter("g1", "tt0133093.$x", "u1").is_none());
        assert!(member_title_filter("g1", "", "u1").is_none());
    }

    #[test]
    fn test_group_title_omits_empty_optionals() {
        let stored = bson::to_document(&GroupTitle::new("tt0133093")).unwrap();

        assert_eq!(stored.get_str("titleId").unwrap(), "tt0133093");
        assert!(!stored.get_bool("watched").unwrap());
        assert!(!stored.contains_key("watchedAt"));
        assert!(!stored.contains_key("seasonsWatched"));
    }

    #[test]
    fn test_titles_map_roundtrip_from_storage() {
        let group: Group = bson::from_document(doc! {
            "_id": "g1",
            "name": "group",
            "ownerId": "u1",
            "users": ["u1"],
            "titles": {
                "tt1": {
                    "titleId": "tt1",
                    "watched": true,
                    "addedAt": bson::DateTime::now(),
                    "updatedAt": bson::DateTime::now(),
                    "seasonsWatched": {
                        "1": {
                            "watched": true,
                            "addedAt": bson::DateTime::now(),
                            "updatedAt": bson::DateTime::now()
                        }
                    }
                }
            },
            "createdAt": bson::DateTime::now(),
            "updatedAt": bson::DateTime::now()
        })
        .unwrap();

        let entry = &group.titles["tt1"];
        assert!(entry.watched);
        assert!(entry.seasons_watched.as_ref().unwrap()["1"].watched);
    }
}
