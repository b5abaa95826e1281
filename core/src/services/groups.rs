use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap}
};

use bson::{Bson, Document};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    ErrorStatus,
    check_season_value,
    ratings::RatingResponse,
    titles::{TitleError, TitlePageRequest, TitleResponse, TitleService, parse_title_url},
    to_utc,
    users::UserResponse
};
use crate::{
    db::{
        Db,
        DbError,
        Group,
        GroupTitle,
        Page,
        Pagination,
        SeasonWatched,
        title::is_title_id
    },
    imdb::ImdbError
};

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("only the group owner can perform this action")]
    NotOwner,
    #[error("group not found")]
    GroupNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("group name is invalid")]
    NameInvalid,
    #[error("a group with this name already exists")]
    DuplicatedName,
    #[error("invalid title url")]
    InvalidTitleUrl,
    #[error("title is already in group")]
    TitleAlreadyInGroup,
    #[error("title not found in group")]
    TitleNotInGroup,
    #[error("cannot update watchedAt when watched is set to false")]
    WatchedAtWithoutWatched,
    #[error("watchedAt must be a date (YYYY-MM-DD) or an RFC 3339 datetime")]
    InvalidWatchedAt,
    #[error("season value is invalid")]
    InvalidSeason,
    #[error("season does not exist for this title")]
    SeasonDoesNotExist,
    #[error("invalid orderBy value: {0}")]
    InvalidOrderBy(String),
    #[error("title is unavailable in the catalog")]
    TitleUnavailable(#[source] ImdbError),
    #[error(transparent)]
    Title(TitleError),
    #[error(transparent)]
    Db(DbError)
}

impl ErrorStatus for GroupError {
    fn status(&self) -> Option<u16> {
        match self {
            GroupError::NotOwner => Some(403),
            GroupError::GroupNotFound |
            GroupError::UserNotFound |
            GroupError::TitleNotInGroup => Some(404),
            GroupError::NameInvalid |
            GroupError::DuplicatedName |
            GroupError::InvalidTitleUrl |
            GroupError::WatchedAtWithoutWatched |
            GroupError::InvalidWatchedAt |
            GroupError::InvalidSeason |
            GroupError::SeasonDoesNotExist |
            GroupError::InvalidOrderBy(_) => Some(400),
            GroupError::TitleAlreadyInGroup => Some(409),
            GroupError::TitleUnavailable(_) => Some(502),
            GroupError::Title(error) => error.status(),
            GroupError::Db(_) => None
        }
    }
}

impl From<DbError> for GroupError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound => GroupError::GroupNotFound,
            error => GroupError::Db(error)
        }
    }
}

impl From<TitleError> for GroupError {
    fn from(error: TitleError) -> Self {
        match error {
            TitleError::Upstream(e) => GroupError::TitleUnavailable(e),
            TitleError::InvalidTitleId | TitleError::InvalidTitleUrl => {
                GroupError::InvalidTitleUrl
            }
            TitleError::InvalidOrderBy(field) => GroupError::InvalidOrderBy(field),
            TitleError::Db(e) => GroupError::Db(e),
            error => GroupError::Title(error)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    pub user_id: String
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddGroupTitleRequest {
    pub url:      String,
    pub group_id: String
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedUpdate {
    pub title_id:   String,
    #[serde(default)]
    pub watched:    Option<bool>,
    #[serde(default)]
    pub watched_at: Option<String>,
    #[serde(default)]
    pub season:     Option<i64>
}

#[derive(Debug, Clone, Default)]
pub struct GroupTitlesQuery {
    pub page:      Option<u64>,
    pub size:      Option<u64>,
    pub order_by:  Option<String>,
    pub ascending: Option<bool>,
    pub watched:   Option<bool>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonWatchedResponse {
    pub watched:    bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<DateTime<Utc>>,
    pub added_at:   DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTitleResponse {
    pub id:              String,
    pub watched:         bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_at:      Option<DateTime<Utc>>,
    pub added_at:        DateTime<Utc>,
    pub updated_at:      DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasons_watched: Option<BTreeMap<String, SeasonWatchedResponse>>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    pub id:         String,
    pub name:       String,
    pub owner_id:   String,
    pub users:      Vec<String>,
    pub titles:     Vec<GroupTitleResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTitleDetail {
    pub title:         TitleResponse,
    #[serde(flatten)]
    pub state:         GroupTitleResponse,
    pub group_ratings: Vec<RatingResponse>
}

impl From<SeasonWatched> for SeasonWatchedResponse {
    fn from(season: SeasonWatched) -> Self {
        Self {
            watched:    season.watched,
            watched_at: season.watched_at.map(to_utc),
            added_at:   to_utc(season.added_at),
            updated_at: to_utc(season.updated_at)
        }
    }
}

impl From<GroupTitle> for GroupTitleResponse {
    fn from(entry: GroupTitle) -> Self {
        Self {
            id:              entry.title_id,
            watched:         entry.watched,
            watched_at:      entry.watched_at.map(to_utc),
            added_at:        to_utc(entry.added_at),
            updated_at:      to_utc(entry.updated_at),
            seasons_watched: entry.seasons_watched.map(|seasons| {
                seasons
                    .into_iter()
                    .map(|(season, state)| (season, state.into()))
                    .collect()
            })
        }
    }
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        let mut titles: Vec<GroupTitleResponse> = group
            .titles
            .into_values()
            .map(GroupTitleResponse::from)
            .collect();

        titles.sort_by(|a, b| {
            a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id))
        });

        Self {
            id: group.id,
            name: group.name,
            owner_id: group.owner_id,
            users: group.users,
            titles,
            created_at: to_utc(group.created_at),
            updated_at: to_utc(group.updated_at)
        }
    }
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or an RFC 3339 datetime.
pub fn parse_watched_at(value: &str) -> Result<bson::DateTime, GroupError> {
    let value = value.trim();

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(bson::DateTime::from_chrono(datetime.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| bson::DateTime::from_chrono(datetime.and_utc()))
        .ok_or(GroupError::InvalidWatchedAt)
}

/// Watched state currently stored for a title or one of its seasons.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WatchedState {
    pub watched:        bool,
    pub has_watched_at: bool
}

/// Field changes relative to the entry being updated.
#[derive(Debug, Default, PartialEq)]
pub struct WatchedPlan {
    pub set:   Vec<(&'static str, Bson)>,
    pub unset: Vec<&'static str>
}

/// Applies the watched rules to a request:
/// a `watchedAt` needs the entry watched, now or in this request;
/// `watched: false` clears `watchedAt`;
/// `watched: true` without a date stamps `now` unless one is already set.
pub fn plan_watched(
    current: WatchedState,
    watched: Option<bool>,
    watched_at: Option<bson::DateTime>,
    now: bson::DateTime
) -> Result<WatchedPlan, GroupError> {
    if watched_at.is_some() && !current.watched && watched != Some(true) {
        return Err(GroupError::WatchedAtWithoutWatched);
    }

    let mut plan = WatchedPlan::default();

    match watched {
        Some(false) => {
            plan.set.push(("watched", Bson::Boolean(false)));
            plan.unset.push("watchedAt");
        }
        Some(true) => {
            plan.set.push(("watched", Bson::Boolean(true)));

            match watched_at {
                Some(at) => plan.set.push(("watchedAt", Bson::DateTime(at))),
                None if !current.has_watched_at => {
                    plan.set.push(("watchedAt", Bson::DateTime(now)));
                }
                None => {}
            }
        }
        None => {
            if let Some(at) = watched_at {
                plan.set.push(("watchedAt", Bson::DateTime(at)));
            }
        }
    }

    plan.set.push(("updatedAt", Bson::DateTime(now)));

    Ok(plan)
}

/// Orders group entries by one of their own timestamps. Entries without
/// one go last, ties fall back to the title id.
pub fn sort_entries_by(
    entries: &mut [&GroupTitle],
    field: &str,
    ascending: bool
) {
    let key = |entry: &GroupTitle| match field {
        "watchedAt" => entry.watched_at,
        _ => Some(entry.added_at)
    };

    entries.sort_by(|a, b| {
        match (key(a), key(b)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(left), Some(right)) if ascending => left.cmp(&right),
            (Some(left), Some(right)) => right.cmp(&left)
        }
        .then_with(|| a.title_id.cmp(&b.title_id))
    });
}

fn is_group_sort(order_by: Option<&str>) -> bool {
    matches!(order_by, Some("addedAt" | "watchedAt"))
}


#[derive(Clone)]
pub struct GroupService {
    db:     Db,
    titles: TitleService
}

impl GroupService {
    pub fn new(db: Db, titles: TitleService) -> Self {
        Self { db, titles }
    }

    pub async fn create_group(
        &self,
        owner_id: &str,
        request: CreateGroupRequest
    ) -> Result<GroupResponse, GroupError> {
        let name = request.name.trim();

        if name.is_empty() {
            return Err(GroupError::NameInvalid);
        }

        if !self.db.user_exists(owner_id).await? {
            return Err(GroupError::UserNotFound);
        }

        let group = Group::new(name, owner_id);

        match self.db.insert_group(&group).await {
            Ok(()) => {}
            Err(DbError::Duplicate) => return Err(GroupError::DuplicatedName),
            Err(e) => return Err(e.into())
        }

        self.db.add_group_to_user(owner_id, &group.id).await?;

        info!(group_id = %group.id, owner_id, "group created");

        Ok(group.into())
    }

    pub async fn get_group(
        &self,
        user_id: &str,
        group_id: &str
    ) -> Result<GroupResponse, GroupError> {
        Ok(self.db.get_group_for_member(group_id, user_id).await?.into())
    }

    pub async fn add_user(
        &self,
        owner_id: &str,
        group_id: &str,
        request: AddUserRequest
    ) -> Result<GroupResponse, GroupError> {
        let group = self.db.get_group_for_member(group_id, owner_id).await?;

        if group.owner_id != owner_id {
            return Err(GroupError::NotOwner);
        }

        if !self.db.user_exists(&request.user_id).await? {
            return Err(GroupError::UserNotFound);
        }

        self.db.add_user_to_group(group_id, &request.user_id).await?;
        self.db.add_group_to_user(&request.user_id, group_id).await?;

        info!(group_id, user_id = %request.user_id, "user added to group");

        Ok(self.db.get_group_for_member(group_id, owner_id).await?.into())
    }

    pub async fn list_users(
        &self,
        user_id: &str,
        group_id: &str
    ) -> Result<Vec<UserResponse>, GroupError> {
        Ok(self
            .db
            .get_group_users(group_id, user_id)
            .await?
            .into_iter()
            .map(UserResponse::from)
            .collect())
    }

    /// Adds a title by its IMDb url, fetching it into the catalog first
    /// when no group has it yet.
    pub async fn add_title(
        &self,
        user_id: &str,
        request: AddGroupTitleRequest
    ) -> Result<GroupTitleResponse, GroupError> {
        let title_id =
            parse_title_url(&request.url).ok_or(GroupError::InvalidTitleUrl)?;

        let group = self
            .db
            .get_group_for_member(&request.group_id, user_id)
            .await?;

        if group.titles.contains_key(&title_id) {
            return Err(GroupError::TitleAlreadyInGroup);
        }

        self.titles.ensure_title(&title_id).await?;

        let entry = GroupTitle::new(&title_id);

        if !self
            .db
            .add_title_to_group(&group.id, user_id, &entry)
            .await?
        {
            return Err(GroupError::TitleAlreadyInGroup);
        }

        info!(group_id = %group.id, title_id, "title added to group");

        Ok(entry.into())
    }

    pub async fn list_titles(
        &self,
        user_id: &str,
        group_id: &str,
        query: GroupTitlesQuery
    ) -> Result<Page<GroupTitleDetail>, GroupError> {
        let group = self.db.get_group_for_member(group_id, user_id).await?;

        let mut entries: Vec<&GroupTitle> = group
            .titles
            .values()
            .filter(|entry| query.watched.is_none_or(|w| entry.watched == w))
            .collect();

        let order_by = query.order_by.as_deref().filter(|o| !o.is_empty());
        let ascending = query.ascending.unwrap_or(true);

        if is_group_sort(order_by) {
            sort_entries_by(&mut entries, order_by.unwrap_or_default(), ascending);
        } else {
            entries.sort_by(|a, b| a.title_id.cmp(&b.title_id));
        }

        let request = TitlePageRequest {
            page: query.page,
            size: query.size,
            order_by: order_by
                .filter(|o| !is_group_sort(Some(*o)))
                .map(str::to_string),
            ascending: Some(ascending),
            ids: Some(entries.iter().map(|e| e.title_id.clone()).collect())
        };

        let title_query = request.to_query()?;

        if entries.is_empty() {
            return Ok(Page::empty(Pagination::new(query.page, query.size)));
        }

        let (total, titles) = self.db.get_page_of_titles(&title_query).await?;

        let page_ids: Vec<String> =
            titles.iter().map(|title| title.id.clone()).collect();

        let mut ratings: HashMap<String, Vec<RatingResponse>> = HashMap::new();

        for rating in self
            .db
            .get_ratings_by_titles(&page_ids, &group.users)
            .await?
        {
            ratings
                .entry(rating.title_id.clone())
                .or_default()
                .push(rating.into());
        }

        let content = titles
            .into_iter()
            .filter_map(|title| {
                let entry = group.titles.get(&title.id)?.clone();

                Some(GroupTitleDetail {
                    group_ratings: ratings.remove(&title.id).unwrap_or_default(),
                    title:         title.into(),
                    state:         entry.into()
                })
            })
            .collect();

        Ok(Page::new(title_query.pagination, total, content))
    }

    pub async fn update_watched(
        &self,
        user_id: &str,
        group_id: &str,
        update: WatchedUpdate
    ) -> Result<GroupTitleResponse, GroupError> {
        if !is_title_id(&update.title_id) {
            return Err(GroupError::TitleNotInGroup);
        }

        let watched_at = update
            .watched_at
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(parse_watched_at)
            .transpose()?;

        let group = self.db.get_group_for_member(group_id, user_id).await?;

        let entry = group
            .titles
            .get(&update.title_id)
            .ok_or(GroupError::TitleNotInGroup)?;

        let now = crate::db::now();
        let base = format!("titles.{}", update.title_id);

        let (prefix, current, new_season) = match update.season {
            None => (base.clone(), WatchedState {
                watched:        entry.watched,
                has_watched_at: entry.watched_at.is_some()
            }, false),
            Some(season) => {
                let season =
                    check_season_value(season).map_err(|_| GroupError::InvalidSeason)?;

                let title = match self.db.get_title(&update.title_id).await {
                    Err(DbError::NotFound) => {
                        return Err(GroupError::SeasonDoesNotExist);
                    }
                    result => result?
                };

                if !title.is_series() || !title.has_season(season) {
                    return Err(GroupError::SeasonDoesNotExist);
                }

                let stored = entry
                    .seasons_watched
                    .as_ref()
                    .and_then(|seasons| seasons.get(&season.to_string()));

                (
                    format!("{base}.seasonsWatched.{season}"),
                    stored
                        .map(|state| WatchedState {
                            watched:        state.watched,
                            has_watched_at: state.watched_at.is_some()
                        })
                        .unwrap_or_default(),
                    stored.is_none()
                )
            }
        };

        let plan = plan_watched(current, update.watched, watched_at, now)?;

        let mut set: Document = plan
            .set
            .into_iter()
            .map(|(field, value)| (format!("{prefix}.{field}"), value))
            .collect();

        if new_season {
            set.insert(format!("{prefix}.addedAt"), now);
            if !set.contains_key(format!("{prefix}.watched")) {
                set.insert(format!("{prefix}.watched"), false);
            }
        }

        if prefix != base {
            set.insert(format!("{base}.updatedAt"), now);
        }

        let unset = plan
            .unset
            .into_iter()
            .map(|field| format!("{prefix}.{field}"))
            .collect();

        let group = match self
            .db
            .update_group_title(group_id, user_id, &update.title_id, set, unset)
            .await
        {
            Err(DbError::NotFound) => return Err(GroupError::TitleNotInGroup),
            result => result?
        };

        group
            .titles
            .get(&update.title_id)
            .cloned()
            .map(GroupTitleResponse::from)
            .ok_or(GroupError::TitleNotInGroup)
    }

    pub async fn remove_title(
        &self,
        user_id: &str,
        group_id: &str,
        title_id: &str
    ) -> Result<(), GroupError> {
        if !is_title_id(title_id) ||
            !self
                .db
                .remove_title_from_group(group_id, user_id, title_id)
                .await?
        {
            return Err(GroupError::TitleNotInGroup);
        }

        info!(group_id, title_id, "title removed from group");

        Ok(())
    }
}
