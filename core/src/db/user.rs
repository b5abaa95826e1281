use brunan_document::Document;
use futures::TryStreamExt;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use super::{Db, DbError, new_id, now};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin
}

#[derive(Debug, Clone, Document, Serialize, Deserialize)]
#[document(collection = "users")]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id:            String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name:          Option<String>,
    pub username:      String,
    // ? absent rather than null so the partial unique index ignores it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email:         Option<String>,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url:    Option<String>,
    #[serde(default)]
    pub groups:        Vec<String>,
    #[serde(default)]
    pub role:          Role,
    #[serde(default = "active")]
    pub is_active:     bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<bson::DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_hash:    Option<String>,
    pub created_at:    bson::DateTime,
    pub updated_at:    bson::DateTime
}

fn active() -> bool {
    true
}

impl User {
    pub fn new(
        username: &str,
        email: Option<&str>,
        password_hash: String,
        role: Role
    ) -> Self {
        let now = now();

        Self {
            id: new_id(),
            name: None,
            username: username.to_string(),
            email: email.map(str::to_string),
            password_hash,
            avatar_url: None,
            groups: Vec::new(),
            role,
            is_active: true,
            last_login_at: None,
            token_hash: None,
            created_at: now,
            updated_at: now
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl Db {
    pub async fn user_exists(&self, id: &str) -> Result<bool, DbError> {
        Ok(User::raw_collection(self)
            .find_one(doc! { "_id": id })
            .projection(doc! { "_id": 1 })
            .await?
            .is_some())
    }

    pub async fn get_user(&self, id: &str) -> Result<User, DbError> {
        User::find_one(self, doc! { "_id": id })
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Case-insensitive, same collation as `username_unique`.
    pub async fn get_user_by_username(
        &self,
        username: &str
    ) -> Result<Option<User>, DbError> {
        Ok(User::collection(self)
            .find_one(doc! { "username": username })
            .collation(super::indexes::case_insensitive())
            .await?)
    }

    pub async fn get_user_by_email(
        &self,
        email: &str
    ) -> Result<Option<User>, DbError> {
        Ok(User::collection(self)
            .find_one(doc! { "email": email })
            .collation(super::indexes::case_insensitive())
            .await?)
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), DbError> {
        User::collection(self).insert_one(user).await?;

        Ok(())
    }

    pub async fn delete_user(&self, id: &str) -> Result<bool, DbError> {
        Ok(User::collection(self)
            .delete_one(doc! { "_id": id })
            .await?
            .deleted_count >
            0)
    }

    pub async fn get_users_by_ids(
        &self,
        ids: &[String]
    ) -> Result<Vec<User>, DbError> {
        Ok(User::collection(self)
            .find(doc! { "_id": { "$in": ids } })
            .sort(doc! { "createdAt": 1 })
            .await?
            .try_collect()
            .await?)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, DbError> {
        Ok(User::collection(self)
            .find(doc! {})
            .sort(doc! { "createdAt": 1 })
            .await?
            .try_collect()
            .await?)
    }

    pub async fn add_group_to_user(
        &self,
        user_id: &str,
        group_id: &str
    ) -> Result<bool, DbError> {
        Ok(User::collection(self)
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$addToSet": { "groups": group_id },
                    "$set": { "updatedAt": now() }
                }
            )
            .await?
            .matched_count >
            0)
    }

    pub async fn set_user_token(
        &self,
        user_id: &str,
        token_hash: &str
    ) -> Result<(), DbError> {
        let now = now();

        let result = User::collection(self)
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$set": {
                        "tokenHash": token_hash,
                        "lastLoginAt": now,
                        "updatedAt": now
                    }
                }
            )
            .await?;

        if result.matched_count == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_without_email_omits_field() {
        let user = User::new("ana", None, "hash".to_string(), Role::User);
        let stored = bson::to_document(&user).unwrap();

        assert!(!stored.contains_key("email"));
        assert!(!stored.contains_key("tokenHash"));
        assert_eq!(stored.get_str("role").unwrap(), "user");
        assert!(stored.get_bool("isActive").unwrap());
    }

    #[test]
    fn test_legacy_user_defaults() {
        let user: User = bson::from_document(doc! {
            "_id": "u1",
            "username": "old",
            "passwordHash": "hash",
            "createdAt": bson::DateTime::now(),
            "updatedAt": bson::DateTime::now()
        })
        .unwrap();

        assert!(user.is_active);
        assert_eq!(user.role, Role::User);
        assert!(user.groups.is_empty());
        assert!(!user.is_admin());
    }
}
