#[macro_use]
mod common;

use std::sync::Arc;

use brunan_core::{
    db::{IndexManager, Title},
    imdb::RetryPolicy,
    sync::{SyncConfig, SyncReport, run_sync}
};
use common::{FakeCatalog, catalog_title, services};
use mongodb::bson::doc;

#[tokio::test]
async fn test_index_creation_is_idempotent() {
    let db = require_db!(bare_test_db);
    let manager = IndexManager::new(db.clone());
    let total = manager.specs().len();

    let first = manager.create(false).await.unwrap();
    assert_eq!(first.created.len(), total);
    assert!(first.skipped.is_empty());

    let second = manager.create(false).await.unwrap();
    assert!(second.created.is_empty());
    assert_eq!(second.skipped.len(), total);

    let reset = manager.create(true).await.unwrap();
    assert_eq!(reset.dropped.len(), total);
    assert_eq!(reset.created.len(), total);

    let users = manager.list("users").await.unwrap();
    assert!(users.contains(&"username_unique".to_string()));

    let dropped = manager.delete_all().await.unwrap();
    assert_eq!(dropped.len(), total);
    assert_eq!(manager.list("users").await.unwrap(), vec!["_id_".to_string()]);

    db.drop_database().await.unwrap();
}

#[tokio::test]
async fn test_sync_only_touches_changed_fields() {
    let db = require_db!();

    let catalog = Arc::new(FakeCatalog::default());
    catalog.put(catalog_title("tt0133093", "movie"));
    catalog.put(catalog_title("tt0111161", "movie"));

    let services = services(&db, catalog.clone());
    services.titles.add_new_title("tt0133093").await.unwrap();
    services.titles.add_new_title("tt0111161").await.unwrap();

    let before = db.get_title("tt0111161").await.unwrap();

    catalog.set_image("tt0133093", "https://img/new.jpg");

    let config = SyncConfig {
        batch_size: 1,
        workers:    2,
        policy:     RetryPolicy::default()
    };

    let report = run_sync(db.clone(), catalog.clone(), config.clone())
        .await
        .unwrap();

    assert_eq!(report, SyncReport {
        batches:        2,
        failed_batches: 0,
        updated:        1,
        unchanged:      1,
        skipped:        0
    });

    let matrix = db.get_title("tt0133093").await.unwrap();
    assert_eq!(matrix.primary_image.url, "https://img/new.jpg");

    let shawshank = db.get_title("tt0111161").await.unwrap();
    assert_eq!(shawshank.primary_image, before.primary_image);
    assert!(shawshank.updated_at >= before.updated_at);

    let report = run_sync(db.clone(), catalog, config).await.unwrap();
    assert_eq!(report.updated, 0);
    assert_eq!(report.unchanged, 2);

    assert_eq!(Title::count_documents(&db, doc! {}).await.unwrap(), 2);

    db.drop_database().await.unwrap();
}
