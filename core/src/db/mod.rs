pub mod comment;
pub mod group;
pub mod indexes;
pub mod query;
pub mod rating;
pub mod title;
pub mod user;

use mongodb::{
    Client,
    Database,
    bson::oid::ObjectId,
    error::{ErrorKind, WriteFailure}
};
pub use mongodb::{bson::doc, error::Error as MongoError};
use opentelemetry::{
    global,
    trace::{FutureExt, Tracer}
};

#[rustfmt::skip]
pub use comment::{Comment, SeasonComment};
pub use group::{Group, GroupTitle, SeasonWatched};
pub use indexes::{IndexManager, IndexReport, IndexSpec};
pub use query::{Page, Pagination, TitleQuery};
pub use rating::{Rating, SeasonRating};
pub use title::Title;
pub use user::{Role, User};


const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("record not found in the database")]
    NotFound,
    #[error("duplicated record")]
    Duplicate,
    #[error("failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),
    #[error(transparent)]
    Mongo(MongoError)
}

impl From<MongoError> for DbError {
    fn from(error: MongoError) -> Self {
        if is_duplicate_key(&error) {
            DbError::Duplicate
        } else {
            DbError::Mongo(error)
        }
    }
}

pub fn is_duplicate_key(error: &MongoError) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false
    }
}

pub fn new_id() -> String {
    ObjectId::new().to_hex()
}

pub fn now() -> bson::DateTime {
    bson::DateTime::now()
}


/// Handle to the application database. Cheap to clone, every service
/// receives its own copy at startup.
#[derive(Debug, Clone)]
pub struct Db {
    database: Database
}

impl Db {
    pub async fn connect(
        url: &str,
        name: &str,
        ping: bool
    ) -> Result<Self, MongoError> {
        let tracer = global::tracer("");

        tracer
            .in_span("initializing mongo", |cx| {
                async {
                    let database =
                        Client::with_uri_str(url).await?.database(name);

                    // ? creating the client doesn't connect,
                    // ? ping to fail fast on a bad url
                    if ping {
                        database.run_command(doc! {"ping": 1}).await?;
                    }

                    Ok::<Self, MongoError>(Self { database })
                }
                .with_context(cx)
            })
            .await
    }

    pub fn from_database(database: Database) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn name(&self) -> &str {
        self.database.name()
    }

    pub async fn drop_database(self) -> Result<(), MongoError> {
        self.database.drop().await
    }
}
