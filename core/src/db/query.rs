use mongodb::bson::{Document, doc};
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PAGE_SIZE;

/// 1-indexed page request, always within bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pagination {
    pub page: u64,
    pub size: u64
}

impl Pagination {
    pub fn new(page: Option<u64>, size: Option<u64>) -> Self {
        Self {
            page: page.filter(|page| *page > 0).unwrap_or(1).min(MAX_PAGE),
            size: size
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .min(MAX_PAGE_SIZE)
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.size)
    }

    pub fn total_pages(&self, total_results: u64) -> u64 {
        total_results.div_ceil(self.size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub page:          u64,
    pub size:          u64,
    pub total_pages:   u64,
    pub total_results: u64,
    pub content:       Vec<T>
}

impl<T> Page<T> {
    pub fn new(pagination: Pagination, total_results: u64, content: Vec<T>) -> Self {
        Self {
            page: pagination.page,
            size: pagination.size,
            total_pages: pagination.total_pages(total_results),
            total_results,
            content
        }
    }

    pub fn empty(pagination: Pagination) -> Self {
        Self::new(pagination, 0, Vec::new())
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            page:          self.page,
            size:          self.size,
            total_pages:   self.total_pages,
            total_results: self.total_results,
            content:       self.content.into_iter().map(f).collect()
        }
    }
}

/// Sortable title fields, keyed by the `orderBy` value clients send.
const TITLE_SORT_FIELDS: &[(&str, &str)] = &[
    ("primaryTitle", "primaryTitle"),
    ("startYear", "startYear"),
    ("runtimeSeconds", "runtimeSeconds"),
    ("rating", "rating.aggregateRating"),
    ("addedAt", "addedAt"),
    ("updatedAt", "updatedAt")
];

pub fn title_sort_field(order_by: &str) -> Option<&'static str> {
    TITLE_SORT_FIELDS
        .iter()
        .find(|(name, _)| *name == order_by)
        .map(|(_, field)| *field)
}

/// Explicit options for a page of titles.
#[derive(Debug, Clone, Default)]
pub struct TitleQuery {
    pub pagination: Pagination,
    /// Already-whitelisted storage field, see [`title_sort_field`].
    pub sort_field: Option<&'static str>,
    pub ascending:  bool,
    /// Restricts the page to these ids. With no sort field the order of
    /// the list is kept.
    pub ids:        Option<Vec<String>>
}

impl TitleQuery {
    pub fn filter(&self) -> Document {
        match &self.ids {
            Some(ids) => doc! { "_id": { "$in": ids.clone() } },
            None => doc! {}
        }
    }

    pub fn sort(&self) -> Document {
        let direction = if self.ascending { 1 } else { -1 };

        match self.sort_field {
            // ? _id as a tiebreaker keeps paging stable
            Some(field) => doc! { field: direction, "_id": 1 },
            None => doc! { "_id": 1 }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, size: 20 });
        assert_eq!(Pagination::new(Some(0), Some(0)), Pagination { page: 1, size: 20 });
        assert_eq!(Pagination::new(Some(3), Some(500)).size, MAX_PAGE_SIZE);
        assert_eq!(Pagination::new(Some(3), Some(10)).skip(), 20);
        assert_eq!(Pagination::new(Some(u64::MAX), Some(100)).page, MAX_PAGE);
        assert_eq!(
            Pagination::new(Some(u64::MAX), Some(100)).skip(),
            (MAX_PAGE - 1) * 100
        );
        assert_eq!(
            Pagination { page: u64::MAX, size: 100 }.skip(),
            u64::MAX
        );
    }

    #[test]
    fn test_total_pages() {
        let pagination = Pagination::new(Some(1), Some(10));

        assert_eq!(pagination.total_pages(0), 0);
        assert_eq!(pagination.total_pages(10), 1);
        assert_eq!(pagination.total_pages(11), 2);
    }

    #[test]
    fn test_sort_whitelist() {
        assert_eq!(title_sort_field("rating"), Some("rating.aggregateRating"));
        assert_eq!(title_sort_field("primaryTitle"), Some("primaryTitle"));
        assert_eq!(title_sort_field("$where"), None);
        assert_eq!(title_sort_field("plot"), None);
        assert_eq!(title_sort_field(""), None);
    }

    #[test]
    fn test_title_query_documents() {
        let query = TitleQuery {
            sort_field: Some("startYear"),
            ascending: false,
            ids: Some(vec!["tt1".to_string()]),
            ..Default::default()
        };

        assert_eq!(query.sort(), doc! { "startYear": -1, "_id": 1 });
        assert_eq!(query.filter(), doc! { "_id": { "$in": ["tt1"] } });
        assert_eq!(TitleQuery::default().filter(), doc! {});
    }

    #[test]
    fn test_page_map() {
        let page = Page::new(Pagination::new(Some(2), Some(1)), 3, vec![1, 2])
            .map(|n| n * 10);

        assert_eq!(page.content, vec![10, 20]);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
    }
}
