use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ErrorStatus, to_utc};
use crate::{
    db::{
        Db,
        DbError,
        Page,
        Pagination,
        Title,
        TitleQuery,
        now,
        query::title_sort_field,
        title::is_title_id
    },
    imdb::{
        ImdbError,
        MetadataSource,
        RetryPolicy,
        SeriesDetails,
        fetch_series_details,
        models::{Image, Metacritic, Person, Season, TitleRating},
        with_retry
    }
};

lazy_static::lazy_static! {
    static ref TITLE_URL: Regex =
        Regex::new(r"^https?://(?:www\.)?imdb\.com/title/(tt[0-9]+)/?")
            .unwrap();
}

/// Extracts the title id out of an IMDb title url.
pub fn parse_title_url(url: &str) -> Option<String> {
    TITLE_URL
        .captures(url.trim())
        .map(|captures| captures[1].to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum TitleError {
    #[error("invalid title url")]
    InvalidTitleUrl,
    #[error("invalid title id")]
    InvalidTitleId,
    #[error("title already exists")]
    AlreadyExists,
    #[error("title not found")]
    NotFound,
    #[error("invalid orderBy value: {0}")]
    InvalidOrderBy(String),
    #[error("failed to fetch title from the catalog")]
    Upstream(#[source] ImdbError),
    #[error(transparent)]
    Db(DbError)
}

impl ErrorStatus for TitleError {
    fn status(&self) -> Option<u16> {
        match self {
            TitleError::InvalidTitleUrl |
            TitleError::InvalidTitleId |
            TitleError::InvalidOrderBy(_) => Some(400),
            TitleError::NotFound => Some(404),
            TitleError::AlreadyExists => Some(409),
            TitleError::Upstream(_) => Some(502),
            TitleError::Db(_) => None
        }
    }
}

impl From<DbError> for TitleError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound => TitleError::NotFound,
            DbError::Duplicate => TitleError::AlreadyExists,
            error => TitleError::Db(error)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddTitleRequest {
    pub url: String
}

/// Paging options as sent by clients. `order_by` is checked against the
/// sortable fields when converted into a [`TitleQuery`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitlePageRequest {
    pub page:      Option<u64>,
    pub size:      Option<u64>,
    pub order_by:  Option<String>,
    pub ascending: Option<bool>,
    #[serde(default)]
    pub ids:       Option<Vec<String>>
}

impl TitlePageRequest {
    pub fn to_query(&self) -> Result<TitleQuery, TitleError> {
        let sort_field = match self.order_by.as_deref() {
            None | Some("") => None,
            Some(order_by) => Some(
                title_sort_field(order_by)
                    .ok_or_else(|| TitleError::InvalidOrderBy(order_by.to_string()))?
            )
        };

        Ok(TitleQuery {
            pagination: Pagination::new(self.page, self.size),
            sort_field,
            ascending: self.ascending.unwrap_or(true),
            ids: self.ids.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleResponse {
    pub id:               String,
    #[serde(rename = "type")]
    pub kind:             String,
    pub primary_title:    String,
    pub primary_image:    Image,
    pub start_year:       i64,
    pub runtime_seconds:  i64,
    pub genres:           Vec<String>,
    pub rating:           TitleRating,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metacritic:       Option<Metacritic>,
    pub plot:             String,
    pub directors_names:  Vec<String>,
    pub writers_names:    Vec<String>,
    pub stars_names:      Vec<String>,
    pub origin_countries: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub seasons:          Vec<Season>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at:         Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at:       Option<DateTime<Utc>>
}

impl From<Title> for TitleResponse {
    fn from(title: Title) -> Self {
        let names = |people: &[Person]| -> Vec<String> {
            people
                .iter()
                .map(|person| person.display_name.clone())
                .collect()
        };

        Self {
            directors_names:  names(&title.directors),
            writers_names:    names(&title.writers),
            stars_names:      names(&title.stars),
            origin_countries: title
                .origin_countries
                .into_iter()
                .map(|country| country.name)
                .collect(),
            id:               title.id,
            kind:             title.kind,
            primary_title:    title.primary_title,
            primary_image:    title.primary_image,
            start_year:       title.start_year,
            runtime_seconds:  title.runtime_seconds,
            genres:           title.genres,
            rating:           title.rating,
            metacritic:       title.metacritic,
            plot:             title.plot,
            seasons:          title.seasons,
            added_at:         title.added_at.map(to_utc),
            updated_at:       title.updated_at.map(to_utc)
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub ratings:  u64,
    pub comments: u64,
    pub groups:   u64
}


#[derive(Clone)]
pub struct TitleService {
    db:     Db,
    source: Arc<dyn MetadataSource>,
    policy: RetryPolicy
}

impl TitleService {
    pub fn new(
        db: Db,
        source: Arc<dyn MetadataSource>,
        policy: RetryPolicy
    ) -> Self {
        Self { db, source, policy }
    }

    async fn fetch(&self, title_id: &str) -> Result<Title, TitleError> {
        let catalog =
            with_retry(&self.policy, title_id, || self.source.title(title_id))
                .await
                .map_err(|e| {
                    warn!(title_id, error = %e, "failed to fetch title");
                    TitleError::Upstream(e)
                })?;

        let SeriesDetails { seasons, episodes } = if catalog.is_series() {
            fetch_series_details(self.source.as_ref(), title_id, &self.policy)
                .await
        } else {
            SeriesDetails::default()
        };

        Ok(Title::from_catalog(catalog, seasons, episodes, now()))
    }

    /// Fetches a title from the catalog and stores it. A title that is
    /// already stored is a conflict, whether found up front or by the
    /// unique `_id` on insert.
    pub async fn add_new_title(
        &self,
        title_id: &str
    ) -> Result<TitleResponse, TitleError> {
        Ok(self.insert_new(title_id).await?.into())
    }

    pub async fn add_from_url(
        &self,
        request: AddTitleRequest
    ) -> Result<TitleResponse, TitleError> {
        let title_id =
            parse_title_url(&request.url).ok_or(TitleError::InvalidTitleUrl)?;

        self.add_new_title(&title_id).await
    }

    async fn insert_new(&self, title_id: &str) -> Result<Title, TitleError> {
        if !is_title_id(title_id) {
            return Err(TitleError::InvalidTitleId);
        }

        if self.db.title_exists(title_id).await? {
            return Err(TitleError::AlreadyExists);
        }

        let title = self.fetch(title_id).await?;

        self.db.insert_title(&title).await?;

        info!(
            title_id,
            kind = %title.kind,
            seasons = title.seasons.len(),
            episodes = title.episodes.len(),
            "title added"
        );

        Ok(title)
    }

    /// Stored title, fetched and inserted first when missing.
    pub async fn ensure_title(&self, title_id: &str) -> Result<Title, TitleError> {
        match self.db.get_title(title_id).await {
            Ok(title) => return Ok(title),
            Err(DbError::NotFound) => {}
            Err(e) => return Err(e.into())
        }

        match self.insert_new(title_id).await {
            Err(TitleError::AlreadyExists) => {
                Ok(self.db.get_title(title_id).await?)
            }
            result => result
        }
    }

    pub async fn get_title(&self, title_id: &str) -> Result<TitleResponse, TitleError> {
        Ok(self.db.get_title(title_id).await?.into())
    }

    pub async fn get_page_of_titles(
        &self,
        request: &TitlePageRequest
    ) -> Result<Page<TitleResponse>, TitleError> {
        let query = request.to_query()?;

        let (total, titles) = self.db.get_page_of_titles(&query).await?;

        Ok(Page::new(query.pagination, total, titles)
            .map(TitleResponse::from))
    }

    /// Deletes a title and everything bound to it: ratings, comments and
    /// its entries in every group. The title goes last so an interrupted
    /// run can be repeated.
    pub async fn cascade_delete_title(
        &self,
        title_id: &str
    ) -> Result<CascadeReport, TitleError> {
        if !self.db.title_exists(title_id).await? {
            return Err(TitleError::NotFound);
        }

        let report = CascadeReport {
            ratings:  self.db.delete_ratings_by_title(title_id).await?,
            comments: self.db.delete_comments_by_title(title_id).await?,
            groups:   self.db.remove_title_from_all_groups(title_id).await?
        };

        if !self.db.delete_title(title_id).await? {
            return Err(TitleError::NotFound);
        }

        info!(
            title_id,
            ratings = report.ratings,
            comments = report.comments,
            groups = report.groups,
            "title deleted"
        );

        Ok(report)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_title_url() {
        assert_eq!(
            parse_title_url("https://www.imdb.com/title/tt0133093/"),
            Some("tt0133093".to_string())
        );
        assert_eq!(
            parse_title_url("http://imdb.com/title/tt0903747"),
            Some("tt0903747".to_string())
        );
        assert_eq!(
            parse_title_url("https://www.imdb.com/title/tt0133093/?ref_=nv_sr"),
            Some("tt0133093".to_string())
        );
        assert_eq!(parse_title_url("https://www.imdb.com/name/nm0905154/"), None);
        assert_eq!(parse_title_url("https://evil.com/imdb.com/title/tt1"), None);
        assert_eq!(parse_title_url("tt0133093"), None);
    }

    #[test]
    fn test_page_request_rejects_unknown_order() {
        let request = TitlePageRequest {
            order_by: Some("plot".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            request.to_query(),
            Err(TitleError::InvalidOrderBy(field)) if field == "plot"
        ));
    }

    #[test]
    fn test_page_request_defaults() {
        let query = TitlePageRequest::default().to_query().unwrap();

        assert_eq!(query.pagination, Pagination { page: 1, size: 20 });
        assert!(query.ascending);
        assert!(query.sort_field.is_none());

        let query = TitlePageRequest {
            order_by: Some("rating".to_string()),
            ascending: Some(false),
            size: Some(1000),
            ..Default::default()
        }
        .to_query()
        .unwrap();

        assert_eq!(query.sort_field, Some("rating.aggregateRating"));
        assert_eq!(query.pagination.size, 100);
        assert!(!query.ascending);
    }

    #[test]
    fn test_status_table() {
        assert_eq!(TitleError::AlreadyExists.status(), Some(409));
        assert_eq!(TitleError::Upstream(ImdbError::Status(500)).status(), Some(502));
        assert_eq!(TitleError::InvalidOrderBy("x".to_string()).status(), Some(400));
        assert_eq!(TitleError::from(DbError::Duplicate).status(), Some(409));
        assert_eq!(TitleError::from(DbError::NotFound).status(), Some(404));
    }

    #[test]
    fn test_response_name_lists() {
        let title: Title = bson::from_document(bson::doc! {
            "_id": "tt0133093",
            "type": "movie",
            "primaryTitle": "The Matrix",
            "directors": [
                { "id": "nm1", "displayName": "Lana Wachowski" },
                { "id": "nm2", "displayName": "Lilly Wachowski" }
            ],
            "originCountries": [{ "code": "US", "name": "United States" }]
        })
        .unwrap();

        let response = TitleResponse::from(title);

        assert_eq!(response.directors_names, vec![
            "Lana Wachowski",
            "Lilly Wachowski"
        ]);
        assert_eq!(response.origin_countries, vec!["United States"]);
        assert!(response.writers_names.is_empty());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "movie");
        assert!(json.get("seasons").is_none());
    }
}
