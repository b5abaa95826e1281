pub mod comments;
pub mod groups;
pub mod ratings;
pub mod titles;
pub mod users;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use comments::{CommentError, CommentService};
pub use groups::{GroupError, GroupService};
pub use ratings::{RatingError, RatingService};
pub use titles::{TitleError, TitleService};
pub use users::{UserError, UserService};

use crate::{
    db::{Db, Title},
    imdb::{MetadataSource, RetryPolicy}
};


/// Maps a service error to the HTTP status it is reported with. `None`
/// marks an internal fault, reported as a generic 500.
pub trait ErrorStatus: std::error::Error {
    fn status(&self) -> Option<u16>;
}

/// Why a season argument was rejected against a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonCheck {
    Required,
    Invalid,
    Missing(i64)
}

pub fn check_season_value(season: i64) -> Result<i64, SeasonCheck> {
    if season < 1 {
        return Err(SeasonCheck::Invalid);
    }

    Ok(season)
}

/// Validates a season given for a series title.
pub fn require_season(
    title: &Title,
    season: Option<i64>
) -> Result<i64, SeasonCheck> {
    let season = check_season_value(season.ok_or(SeasonCheck::Required)?)?;

    if !title.has_season(season) {
        return Err(SeasonCheck::Missing(season));
    }

    Ok(season)
}

pub fn to_utc(datetime: bson::DateTime) -> DateTime<Utc> {
    datetime.to_chrono()
}


/// Every service over one database handle and metadata source.
#[derive(Clone)]
pub struct Services {
    pub titles:   TitleService,
    pub ratings:  RatingService,
    pub comments: CommentService,
    pub groups:   GroupService,
    pub users:    UserService
}

impl Services {
    pub fn new(
        db: Db,
        source: Arc<dyn MetadataSource>,
        policy: RetryPolicy
    ) -> Self {
        let titles = TitleService::new(db.clone(), source, policy);

        Self {
            ratings: RatingService::new(db.clone()),
            comments: CommentService::new(db.clone()),
            groups: GroupService::new(db.clone(), titles.clone()),
            users: UserService::new(db),
            titles
        }
    }
}


#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn series() -> Title {
        bson::from_document(doc! {
            "_id": "tt0903747",
            "type": "tvSeries",
            "seasons": [{ "season": "1" }, { "season": "2" }]
        })
        .unwrap()
    }

    #[test]
    fn test_require_season() {
        let title = series();

        assert_eq!(require_season(&title, Some(2)), Ok(2));
        assert_eq!(require_season(&title, None), Err(SeasonCheck::Required));
        assert_eq!(require_season(&title, Some(0)), Err(SeasonCheck::Invalid));
        assert_eq!(require_season(&title, Some(-3)), Err(SeasonCheck::Invalid));
        assert_eq!(
            require_season(&title, Some(5)),
            Err(SeasonCheck::Missing(5))
        );
    }
}
