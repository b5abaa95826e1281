#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex}
};

use async_trait::async_trait;
use brunan_core::{
    db::{Db, IndexManager, Role, new_id},
    imdb::{
        CatalogTitle,
        EpisodesPage,
        ImdbError,
        MetadataSource,
        RetryPolicy,
        Season
    },
    services::{Services, users::NewUserRequest}
};

/// Fresh database on `TEST_MONGO_URL` with every index in place, `None`
/// when the variable is unset.
pub async fn test_db() -> Option<Db> {
    let url = std::env::var("TEST_MONGO_URL").ok()?;

    let db = Db::connect(&url, &format!("brunan_test_{}", new_id()), true)
        .await
        .expect("failed to connect to the test database");

    IndexManager::new(db.clone())
        .create(false)
        .await
        .expect("failed to create indexes");

    Some(db)
}

/// Same as [`test_db`] but without indexes.
pub async fn bare_test_db() -> Option<Db> {
    let url = std::env::var("TEST_MONGO_URL").ok()?;

    Some(
        Db::connect(&url, &format!("brunan_test_{}", new_id()), true)
            .await
            .expect("failed to connect to the test database")
    )
}

macro_rules! require_db {
    () => {
        require_db!(test_db)
    };
    ($setup:ident) => {
        match common::$setup().await {
            Some(db) => db,
            None => {
                eprintln!("TEST_MONGO_URL not set, skipping");
                return;
            }
        }
    };
}

/// In-memory catalog standing in for the IMDb api.
#[derive(Default)]
pub struct FakeCatalog {
    titles:  Mutex<HashMap<String, CatalogTitle>>,
    seasons: Mutex<HashMap<String, Vec<Season>>>
}

impl FakeCatalog {
    pub fn put(&self, title: CatalogTitle) {
        self.titles.lock().unwrap().insert(title.id.clone(), title);
    }

    pub fn put_seasons(&self, id: &str, seasons: &[(&str, i64)]) {
        self.seasons.lock().unwrap().insert(
            id.to_string(),
            seasons
                .iter()
                .map(|(season, episode_count)| Season {
                    season:        season.to_string(),
                    episode_count: *episode_count
                })
                .collect()
        );
    }

    pub fn set_image(&self, id: &str, url: &str) {
        if let Some(title) = self.titles.lock().unwrap().get_mut(id) {
            title.primary_image.url = url.to_string();
        }
    }
}

#[async_trait]
impl MetadataSource for FakeCatalog {
    async fn title(&self, id: &str) -> Result<CatalogTitle, ImdbError> {
        self.titles
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(ImdbError::Status(404))
    }

    async fn batch_titles(
        &self,
        ids: &[String]
    ) -> Result<Vec<CatalogTitle>, ImdbError> {
        let titles = self.titles.lock().unwrap();

        Ok(ids.iter().filter_map(|id| titles.get(id).cloned()).collect())
    }

    async fn seasons(&self, id: &str) -> Result<Vec<Season>, ImdbError> {
        Ok(self
            .seasons
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn episodes_page(
        &self,
        _id: &str,
        _page_size: u32,
        _page_token: Option<&str>
    ) -> Result<EpisodesPage, ImdbError> {
        Ok(EpisodesPage::default())
    }
}

pub fn catalog_title(id: &str, kind: &str) -> CatalogTitle {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "type": kind,
        "primaryTitle": format!("title {id}"),
        "primaryImage": {"url": format!("https://img/{id}.jpg"), "width": 100, "height": 150},
        "startYear": 1999,
        "rating": {"aggregateRating": 7.5, "voteCount": 1000}
    }))
    .unwrap()
}

pub fn services(db: &Db, catalog: Arc<FakeCatalog>) -> Services {
    Services::new(db.clone(), catalog, RetryPolicy::once())
}

pub fn imdb_url(id: &str) -> String {
    format!("https://www.imdb.com/title/{id}/")
}

pub async fn user(services: &Services, username: &str) -> String {
    services
        .users
        .create_user(
            NewUserRequest {
                name:     None,
                username: username.to_string(),
                email:    None,
                password: "password".to_string()
            },
            Role::User
        )
        .await
        .unwrap()
        .id
}
