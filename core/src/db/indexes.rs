use mongodb::{
    IndexModel,
    bson::{Document, doc},
    error::ErrorKind,
    options::{Collation, CollationStrength, IndexOptions}
};
use serde::Serialize;
use tracing::{info, warn};

use super::{Comment, Db, DbError, Group, MongoError, Rating, User};

const NAMESPACE_NOT_FOUND: i32 = 26;
const INDEX_NOT_FOUND: i32 = 27;

pub fn case_insensitive() -> Collation {
    Collation::builder()
        .locale("en")
        .strength(CollationStrength::Secondary)
        .build()
}

/// Partial filter keeping documents without a non-empty string value for
/// every field out of a unique index.
fn non_empty_strings(fields: &[&str]) -> Document {
    fields
        .iter()
        .map(|field| {
            (
                field.to_string(),
                doc! { "$type": "string", "$gt": "" }.into()
            )
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name:             &'static str,
    pub collection:       &'static str,
    pub keys:             Document,
    pub unique:           bool,
    pub partial_filter:   Option<Document>,
    pub case_insensitive: bool
}

impl IndexSpec {
    fn unique(
        name: &'static str,
        collection: &'static str,
        fields: &[&str],
        case_insensitive: bool
    ) -> Self {
        Self {
            name,
            collection,
            keys: fields.iter().map(|f| (f.to_string(), 1.into())).collect(),
            unique: true,
            partial_filter: Some(non_empty_strings(fields)),
            case_insensitive
        }
    }

    fn lookup(
        name: &'static str,
        collection: &'static str,
        field: &str
    ) -> Self {
        Self {
            name,
            collection,
            keys: doc! { field: 1 },
            unique: false,
            partial_filter: None,
            case_insensitive: false
        }
    }

    pub fn model(&self) -> IndexModel {
        let options = IndexOptions::builder()
            .name(self.name.to_string())
            .unique(self.unique.then_some(true))
            .partial_filter_expression(self.partial_filter.clone())
            .collation(self.case_insensitive.then(case_insensitive))
            .build();

        IndexModel::builder()
            .keys(self.keys.clone())
            .options(options)
            .build()
    }
}

/// Every index the application relies on. Names are persisted, renaming
/// one needs a reset run.
pub fn index_specs() -> Vec<IndexSpec> {
    vec![
        IndexSpec::unique("email_unique", User::COLLECTION, &["email"], true),
        IndexSpec::unique(
            "username_unique",
            User::COLLECTION,
            &["username"],
            true
        ),
        IndexSpec::unique(
            "userId_and_titleId_unique",
            Rating::COLLECTION,
            &["userId", "titleId"],
            false
        ),
        IndexSpec::unique(
            "userId_and_titleId_unique",
            Comment::COLLECTION,
            &["userId", "titleId"],
            false
        ),
        IndexSpec::unique(
            "ownerId_and_name_unique",
            Group::COLLECTION,
            &["ownerId", "name"],
            true
        ),
        IndexSpec::lookup("titleId_idx", Rating::COLLECTION, "titleId"),
        IndexSpec::lookup("titleId_idx", Comment::COLLECTION, "titleId"),
    ]
}

fn is_error_code(error: &MongoError, code: i32) -> bool {
    matches!(error.kind.as_ref(), ErrorKind::Command(e) if e.code == code)
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
    pub dropped: Vec<String>
}

pub struct IndexManager {
    db:    Db,
    specs: Vec<IndexSpec>
}

impl IndexManager {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            specs: index_specs()
        }
    }

    pub fn specs(&self) -> &[IndexSpec] {
        &self.specs
    }

    /// Empty when the collection does not exist yet.
    pub async fn list(&self, collection: &str) -> Result<Vec<String>, DbError> {
        match self
            .db
            .database()
            .collection::<Document>(collection)
            .list_index_names()
            .await
        {
            Ok(names) => Ok(names),
            Err(e) if is_error_code(&e, NAMESPACE_NOT_FOUND) => Ok(Vec::new()),
            Err(e) => Err(e.into())
        }
    }

    /// Creates every missing index. With `reset` existing ones are dropped
    /// and recreated, which is how option changes get applied.
    pub async fn create(&self, reset: bool) -> Result<IndexReport, DbError> {
        let mut report = IndexReport::default();

        for spec in &self.specs {
            let label = format!("{}.{}", spec.collection, spec.name);
            let collection =
                self.db.database().collection::<Document>(spec.collection);

            let exists = self
                .list(spec.collection)
                .await?
                .iter()
                .any(|name| name == spec.name);

            if exists && !reset {
                info!(index = %label, "index already exists, skipping");
                report.skipped.push(label);
                continue;
            }

            if exists {
                match collection.drop_index(spec.name).await {
                    Ok(()) => {}
                    Err(e) if is_error_code(&e, INDEX_NOT_FOUND) => {
                        warn!(index = %label, "index vanished before drop");
                    }
                    Err(e) => return Err(e.into())
                }

                info!(index = %label, "dropped index");
                report.dropped.push(label.clone());
            }

            collection.create_index(spec.model()).await?;

            info!(index = %label, "created index");
            report.created.push(label);
        }

        Ok(report)
    }

    /// Drops every index except `_id_` on the managed collections.
    pub async fn delete_all(&self) -> Result<Vec<String>, DbError> {
        let mut collections: Vec<&str> =
            self.specs.iter().map(|spec| spec.collection).collect();
        collections.sort_unstable();
        collections.dedup();

        let mut dropped = Vec::new();

        for name in collections {
            let collection = self.db.database().collection::<Document>(name);

            for index in self.list(name).await? {
                if index == "_id_" {
                    continue;
                }

                collection.drop_index(&index).await?;

                info!(collection = name, index = %index, "dropped index");
                dropped.push(format!("{name}.{index}"));
            }
        }

        Ok(dropped)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_specs_have_partial_filters() {
        for spec in index_specs().iter().filter(|spec| spec.unique) {
            let filter = spec.partial_filter.as_ref().unwrap();

            for key in spec.keys.keys() {
                assert_eq!(
                    filter.get_document(key).unwrap(),
                    &doc! { "$type": "string", "$gt": "" },
                    "{} missing filter on {key}",
                    spec.name
                );
            }
        }
    }

    #[test]
    fn test_case_insensitive_specs() {
        let specs = index_specs();
        let insensitive: Vec<_> = specs
            .iter()
            .filter(|spec| spec.case_insensitive)
            .map(|spec| spec.name)
            .collect();

        assert_eq!(insensitive, vec![
            "email_unique",
            "username_unique",
            "ownerId_and_name_unique"
        ]);
    }

    #[test]
    fn test_model_options() {
        let specs = index_specs();
        let rating = specs
            .iter()
            .find(|spec| {
                spec.collection == "ratings" &&
                    spec.name == "userId_and_titleId_unique"
            })
            .unwrap();

        let model = rating.model();
        let options = model.options.unwrap();

        assert_eq!(model.keys, doc! { "userId": 1, "titleId": 1 });
        assert_eq!(options.unique, Some(true));
        assert!(options.collation.is_none());
        assert_eq!(options.name.as_deref(), Some("userId_and_titleId_unique"));
    }

    #[test]
    fn test_lookup_index_is_not_unique() {
        let model = IndexSpec::lookup("titleId_idx", "ratings", "titleId").model();
        let options = model.options.unwrap();

        assert_eq!(options.unique, None);
        assert!(options.partial_filter_expression.is_none());
    }
}
