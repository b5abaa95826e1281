use brunan_core::services::{groups::GroupTitlesQuery, titles::TitlePageRequest};
use serde::Deserialize;

/// `true` and `false` are the only values that mean anything, every other
/// value is treated as if the parameter was never sent.
pub fn tri_state(value: Option<&str>) -> Option<bool> {
    match value.map(str::trim) {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None
    }
}

fn number(value: Option<&str>) -> Option<u64> {
    value.and_then(|value| value.trim().parse().ok())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    page:      Option<String>,
    size:      Option<String>,
    order_by:  Option<String>,
    ascending: Option<String>,
    watched:   Option<String>
}

impl PageQuery {
    pub fn titles(&self) -> TitlePageRequest {
        TitlePageRequest {
            page:      number(self.page.as_deref()),
            size:      number(self.size.as_deref()),
            order_by:  self.order_by.clone(),
            ascending: tri_state(self.ascending.as_deref()),
            ids:       None
        }
    }

    pub fn group_titles(&self) -> GroupTitlesQuery {
        GroupTitlesQuery {
            page:      number(self.page.as_deref()),
            size:      number(self.size.as_deref()),
            order_by:  self.order_by.clone(),
            ascending: tri_state(self.ascending.as_deref()),
            watched:   tri_state(self.watched.as_deref())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupQuery {
    pub group_id: String
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tri_state() {
        assert_eq!(tri_state(Some("true")), Some(true));
        assert_eq!(tri_state(Some("false")), Some(false));
        assert_eq!(tri_state(Some("TRUE")), None);
        assert_eq!(tri_state(Some("1")), None);
        assert_eq!(tri_state(Some("")), None);
        assert_eq!(tri_state(None), None);
    }

    #[test]
    fn test_group_titles_query() {
        let query = PageQuery {
            page: Some("2".to_string()),
            size: Some("abc".to_string()),
            order_by: Some("watchedAt".to_string()),
            ascending: Some("false".to_string()),
            watched: Some("maybe".to_string())
        }
        .group_titles();

        assert_eq!(query.page, Some(2));
        assert_eq!(query.size, None);
        assert_eq!(query.order_by.as_deref(), Some("watchedAt"));
        assert_eq!(query.ascending, Some(false));
        assert_eq!(query.watched, None);
    }
}
