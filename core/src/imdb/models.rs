use serde::{Deserialize, Serialize};

// ? these shapes are shared between the catalog responses and the stored
// ? title documents, field names are identical on both sides

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default)]
    pub url:    String,
    #[serde(default)]
    pub width:  i64,
    #[serde(default)]
    pub height: i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id:                  String,
    #[serde(default)]
    pub display_name:        String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_names:   Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_image:       Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_professions: Option<Vec<String>>
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRating {
    #[serde(default)]
    pub aggregate_rating: f64,
    #[serde(default)]
    pub vote_count:       i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metacritic {
    #[serde(default)]
    pub score:        i64,
    #[serde(default)]
    pub review_count: i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeName {
    pub code: String,
    #[serde(default)]
    pub name: String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interest {
    pub id:          String,
    #[serde(default)]
    pub name:        String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_subgenre: Option<bool>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub season:        String,
    #[serde(default)]
    pub episode_count: i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseDate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year:  Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day:   Option<i64>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id:              String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title:           Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_image:   Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season:          Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number:  Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot:            Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating:          Option<TitleRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date:    Option<ReleaseDate>
}

/// A title as returned by `GET /titles/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTitle {
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
    pub interests:        Vec<Interest>
}

impl CatalogTitle {
    pub fn is_series(&self) -> bool {
        is_series_kind(&self.kind)
    }
}

pub fn is_series_kind(kind: &str) -> bool {
    matches!(kind, "tvSeries" | "tvMiniSeries")
}

#[derive(Debug, Deserialize)]
pub struct BatchTitlesResponse {
    #[serde(default)]
    pub titles: Vec<CatalogTitle>
}

#[derive(Debug, Deserialize)]
pub struct SeasonsResponse {
    #[serde(default)]
    pub seasons: Vec<Season>
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodesPage {
    #[serde(default)]
    pub episodes:        Vec<Episode>,
    #[serde(default)]
    pub next_page_token: Option<String>
}

impl EpisodesPage {
    /// The catalog signals the last page with an empty or missing token.
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_movie() {
        let json = r#"{
            "id": "tt0133093",
            "type": "movie",
            "primaryTitle": "The Matrix",
            "primaryImage": {"url": "https://m.media-amazon.com/x.jpg", "width": 2100, "height": 3156},
            "startYear": 1999,
            "runtimeSeconds": 8160,
            "genres": ["Action", "Sci-Fi"],
            "rating": {"aggregateRating": 8.7, "voteCount": 2200000},
            "metacritic": {"score": 73, "reviewCount": 36},
            "directors": [{"id": "nm0905154", "displayName": "Lana Wachowski"}],
            "originCountries": [{"code": "US", "name": "United States"}]
        }"#;

        let title: CatalogTitle = serde_json::from_str(json).unwrap();

        assert_eq!(title.id, "tt0133093");
        assert!(!title.is_series());
        assert_eq!(title.primary_image.width, 2100);
        assert_eq!(title.metacritic.unwrap().score, 73);
        assert_eq!(title.directors[0].display_name, "Lana Wachowski");
        assert!(title.writers.is_empty());
    }

    #[test]
    fn test_series_kinds() {
        assert!(is_series_kind("tvSeries"));
        assert!(is_series_kind("tvMiniSeries"));
        assert!(!is_series_kind("movie"));
        assert!(!is_series_kind("tvEpisode"));
    }

    #[test]
    fn test_episode_page_token() {
        let last: EpisodesPage =
            serde_json::from_str(r#"{"episodes": [], "nextPageToken": ""}"#)
                .unwrap();
        assert_eq!(last.next_token(), None);

        let missing: EpisodesPage =
            serde_json::from_str(r#"{"episodes": []}"#).unwrap();
        assert_eq!(missing.next_token(), None);

        let more: EpisodesPage = serde_json::from_str(
            r#"{"episodes": [{"id": "tt1", "season": "1", "episodeNumber": 1}], "nextPageToken": "abc"}"#
        )
        .unwrap();
        assert_eq!(more.next_token(), Some("abc"));
        assert_eq!(more.episodes[0].episode_number, Some(1));
    }
}
