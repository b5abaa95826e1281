use brunan_document::Document;
use bson::{Bson, Document as BsonDocument};
use futures::TryStreamExt;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use super::{Db, DbError, Group, query::TitleQuery};
use crate::imdb::models::{
    CatalogTitle,
    CodeName,
    Episode,
    Image,
    Interest,
    Metacritic,
    Person,
    Season,
    TitleRating,
    is_series_kind
};

#[derive(Debug, Clone, Document, Serialize, Deserialize)]
#[document(collection = "titles")]
#[serde(rename_all = "camelCase")]
pub struct Title {
    #[serde(rename = "_id")]
    pub id:               String,
    #[serde(rename = "type", default)]
    pub kind:             String,
    #[serde(default)]
    pub primary_title:    String,
    #[serde(default)]
    pub primary_image:    Image,
    #[serde(default)]
    pub start_year:       i64,
    #[serde(default)]
    pub runtime_seconds:  i64,
    #[serde(default)]
    pub genres:           Vec<String>,
    #[serde(default)]
    pub rating:           TitleRating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metacritic:       Option<Metacritic>,
    #[serde(default)]
    pub plot:             String,
    #[serde(default)]
    pub directors:        Vec<Person>,
    #[serde(default)]
    pub writers:          Vec<Person>,
    #[serde(default)]
    pub stars:            Vec<Person>,
    #[serde(default)]
    pub origin_countries: Vec<CodeName>,
    #[serde(default)]
    pub spoken_languages: Vec<CodeName>,
    #[serde(default)]
    pub interests:        Vec<Interest>,
    #[serde(default)]
    pub seasons:          Vec<Season>,
    #[serde(default)]
    pub episodes:         Vec<Episode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at:         Option<bson::DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at:       Option<bson::DateTime>
}

impl Title {
    pub fn from_catalog(
        title: CatalogTitle,
        seasons: Vec<Season>,
        episodes: Vec<Episode>,
        now: bson::DateTime
    ) -> Self {
        Self {
            id: title.id,
            kind: title.kind,
            primary_title: title.primary_title,
            primary_image: title.primary_image,
            start_year: title.start_year,
            runtime_seconds: title.runtime_seconds,
            genres: title.genres,
            rating: title.rating,
            metacritic: title.metacritic,
            plot: title.plot,
            directors: title.directors,
            writers: title.writers,
            stars: title.stars,
            origin_countries: title.origin_countries,
            spoken_languages: title.spoken_languages,
            interests: title.interests,
            seasons,
            episodes,
            added_at: Some(now),
            updated_at: Some(now)
        }
    }

    pub fn is_series(&self) -> bool {
        is_series_kind(&self.kind)
    }

    pub fn has_season(&self, season: i64) -> bool {
        let key = season.to_string();

        self.seasons.iter().any(|s| s.season == key)
    }
}

/// Fields the sync routine compares against fresh catalog data.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleSnapshot {
    #[serde(rename = "_id")]
    pub id:            String,
    #[serde(rename = "type", default)]
    pub kind:          String,
    #[serde(default)]
    pub primary_image: Image,
    #[serde(default)]
    pub seasons:       Vec<Season>,
    #[serde(default)]
    pub episodes:      Vec<Episode>,
    #[serde(default)]
    pub rating:        TitleRating,
    #[serde(default)]
    pub metacritic:    Option<Metacritic>
}

pub fn is_title_id(id: &str) -> bool {
    id.len() > 2 &&
        id.starts_with("tt") &&
        id[2..].bytes().all(|b| b.is_ascii_digit())
}

impl Db {
    /// Projection-only existence check. Not found is `Ok(false)`.
    pub async fn title_exists(&self, id: &str) -> Result<bool, DbError> {
        Ok(Title::raw_collection(self)
            .find_one(doc! { "_id": id })
            .projection(doc! { "_id": 1 })
            .await?
            .is_some())
    }

    pub async fn get_title(&self, id: &str) -> Result<Title, DbError> {
        Title::find_one(self, doc! { "_id": id })
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn insert_title(&self, title: &Title) -> Result<(), DbError> {
        Title::collection(self).insert_one(title).await?;

        Ok(())
    }

    pub async fn delete_title(&self, id: &str) -> Result<bool, DbError> {
        Ok(Title::collection(self)
            .delete_one(doc! { "_id": id })
            .await?
            .deleted_count >
            0)
    }

    pub async fn get_titles_by_ids(
        &self,
        ids: &[String]
    ) -> Result<Vec<Title>, DbError> {
        Ok(Title::collection(self)
            .find(doc! { "_id": { "$in": ids } })
            .await?
            .try_collect()
            .await?)
    }

    /// Runs a page query. When `query.ids` is set and no sort field is
    /// given, the page is cut from the id list itself so its order holds.
    pub async fn get_page_of_titles(
        &self,
        query: &TitleQuery
    ) -> Result<(u64, Vec<Title>), DbError> {
        if let (Some(ids), None) = (&query.ids, query.sort_field) {
            let page_ids: Vec<String> = ids
                .iter()
                .skip(query.pagination.skip() as usize)
                .take(query.pagination.size as usize)
                .cloned()
                .collect();

            let mut titles = self.get_titles_by_ids(&page_ids).await?;

            titles.sort_by_key(|title| {
                page_ids.iter().position(|id| *id == title.id)
            });

            // ? ids that no longer resolve to a title are not counted
            let total = Title::count_documents(self, query.filter()).await?;

            return Ok((total, titles));
        }

        let collection = Title::collection(self);

        let total = collection.count_documents(query.filter()).await?;

        let titles = collection
            .find(query.filter())
            .sort(query.sort())
            .skip(query.pagination.skip())
            .limit(query.pagination.size as i64)
            .await?
            .try_collect()
            .await?;

        Ok((total, titles))
    }

    pub async fn get_all_title_ids(&self) -> Result<Vec<String>, DbError> {
        let documents: Vec<BsonDocument> = Title::raw_collection(self)
            .find(doc! {})
            .projection(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;

        Ok(documents
            .into_iter()
            .filter_map(|document| match document.get("_id") {
                Some(Bson::String(id)) => Some(id.clone()),
                _ => None
            })
            .collect())
    }

    pub async fn get_title_snapshot(
        &self,
        id: &str
    ) -> Result<Option<TitleSnapshot>, DbError> {
        Ok(self
            .database()
            .collection::<TitleSnapshot>(Title::COLLECTION)
            .find_one(doc! { "_id": id })
            .projection(doc! {
                "_id": 1,
                "type": 1,
                "primaryImage": 1,
                "seasons": 1,
                "episodes": 1,
                "rating": 1,
                "metacritic": 1
            })
            .await?)
    }

    pub async fn set_title_fields(
        &self,
        id: &str,
        fields: BsonDocument
    ) -> Result<bool, DbError> {
        Ok(Title::collection(self)
            .update_one(doc! { "_id": id }, doc! { "$set": fields })
            .await?
            .matched_count >
            0)
    }

    /// Removes a title from every group that references it.
    pub async fn remove_title_from_all_groups(
        &self,
        id: &str
    ) -> Result<u64, DbError> {
        let path = format!("titles.{id}");

        Ok(Group::collection(self)
            .update_many(
                doc! { &path: { "$exists": true } },
                doc! {
                    "$unset": { &path: "" },
                    "$currentDate": { "updatedAt": true }
                }
            )
            .await?
            .modified_count)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_id_shape() {
        assert!(is_title_id("tt0133093"));
        assert!(!is_title_id("tt"));
        assert!(!is_title_id("nm0905154"));
        assert!(!is_title_id("tt12.3"));
        assert!(!is_title_id("tt1$"));
    }

    #[test]
    fn test_has_season() {
        let title: Title = bson::from_document(doc! {
            "_id": "tt0903747",
            "type": "tvSeries",
            "seasons": [
                { "season": "1", "episodeCount": 7 },
                { "season": "2", "episodeCount": 13 }
            ]
        })
        .unwrap();

        assert!(title.is_series());
        assert!(title.has_season(2));
        assert!(!title.has_season(3));
        assert!(title.episodes.is_empty());
    }

    #[test]
    fn test_from_catalog_stamps_timestamps() {
        let catalog: CatalogTitle = serde_json::from_str(
            r#"{"id": "tt0133093", "type": "movie", "primaryTitle": "The Matrix"}"#
        )
        .unwrap();

        let now = bson::DateTime::now();
        let title = Title::from_catalog(catalog, Vec::new(), Vec::new(), now);

        assert_eq!(title.added_at, Some(now));
        assert_eq!(title.updated_at, Some(now));

        let stored = bson::to_document(&title).unwrap();
        assert_eq!(stored.get_str("_id").unwrap(), "tt0133093");
        assert!(!stored.contains_key("metacritic"));
    }
}
