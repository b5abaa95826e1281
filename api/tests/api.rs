use std::sync::Arc;

use actix_web::{App, http::StatusCode, test, web};
use async_trait::async_trait;
use brunan_api::configure;
use brunan_core::{
    db::{Db, IndexManager, new_id},
    imdb::{
        CatalogTitle,
        EpisodesPage,
        ImdbError,
        MetadataSource,
        RetryPolicy,
        Season
    },
    services::Services
};
use serde_json::{Value, json};

struct SingleMovie;

#[async_trait]
impl MetadataSource for SingleMovie {
    async fn title(&self, id: &str) -> Result<CatalogTitle, ImdbError> {
        Ok(serde_json::from_value(json!({
            "id": id,
            "type": "movie",
            "primaryTitle": "The Matrix",
            "startYear": 1999
        }))
        .unwrap())
    }

    async fn batch_titles(
        &self,
        _ids: &[String]
    ) -> Result<Vec<CatalogTitle>, ImdbError> {
        Ok(Vec::new())
    }

    async fn seasons(&self, _id: &str) -> Result<Vec<Season>, ImdbError> {
        Ok(Vec::new())
    }

    async fn episodes_page(
        &self,
        _id: &str,
        _page_size: u32,
        _page_token: Option<&str>
    ) -> Result<EpisodesPage, ImdbError> {
        Ok(EpisodesPage::default())
    }
}

fn services(db: Db) -> web::Data<Services> {
    web::Data::new(Services::new(
        db,
        Arc::new(SingleMovie),
        RetryPolicy::once()
    ))
}

// ? the driver connects lazily, nothing here reaches a server
async fn offline_services() -> web::Data<Services> {
    services(
        Db::connect("mongodb://127.0.0.1:1", "brunan_offline", false)
            .await
            .unwrap()
    )
}

#[actix_web::test]
async fn test_healthcheck() {
    let app = test::init_service(
        App::new().app_data(offline_services().await).configure(configure)
    )
    .await;

    let response = test::call_service(
        &app,
        test::TestRequest::get().uri("/healthcheck").to_request()
    )
    .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn test_missing_and_malformed_tokens_are_rejected() {
    let app = test::init_service(
        App::new().app_data(offline_services().await).configure(configure)
    )
    .await;

    let response = test::call_service(
        &app,
        test::TestRequest::get().uri("/groups/abc").to_request()
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get("www-authenticate").unwrap(), "Bearer");

    let body: Value = test::read_body_json(response).await;
    assert_eq!(body, json!({"detail": "Not authenticated"}));

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/titles")
            .insert_header(("Authorization", "Bearer no-separator"))
            .to_request()
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_bad_json_body_shape() {
    let app = test::init_service(
        App::new().app_data(offline_services().await).configure(configure)
    )
    .await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/users")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"username\": ")
            .to_request()
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(response).await;
    assert_eq!(body, json!({"detail": "Invalid JSON in request body"}));
}

#[actix_web::test]
async fn test_rating_scenario() {
    let Ok(url) = std::env::var("TEST_MONGO_URL") else {
        eprintln!("TEST_MONGO_URL not set, skipping");
        return;
    };

    let db = Db::connect(&url, &format!("brunan_test_{}", new_id()), true)
        .await
        .unwrap();

    IndexManager::new(db.clone()).create(false).await.unwrap();

    let app = test::init_service(
        App::new().app_data(services(db.clone())).configure(configure)
    )
    .await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/users")
            .set_json(json!({"username": "alice", "password": "secret"}))
            .to_request()
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let login: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/login")
            .set_json(json!({"username": "ALICE", "password": "secret"}))
            .to_request()
    )
    .await;

    let bearer = format!("Bearer {}", login["accessToken"].as_str().unwrap());

    let group: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/groups")
            .insert_header(("Authorization", bearer.as_str()))
            .set_json(json!({"name": "friday"}))
            .to_request()
    )
    .await;
    let group_id = group["id"].as_str().unwrap();

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/groups/titles")
            .insert_header(("Authorization", bearer.as_str()))
            .set_json(json!({
                "url": "https://www.imdb.com/title/tt0133093/",
                "groupId": group_id
            }))
            .to_request()
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let rate = || {
        test::TestRequest::post()
            .uri("/ratings")
            .insert_header(("Authorization", bearer.as_str()))
            .set_json(json!({
                "groupId": group_id,
                "titleId": "tt0133093",
                "note": 8
            }))
            .to_request()
    };

    let response = test::call_service(&app, rate()).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let rating: Value = test::read_body_json(response).await;
    assert_eq!(rating["createdAt"], rating["updatedAt"]);

    let response = test::call_service(&app, rate()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/ratings/{}", rating["id"].as_str().unwrap()))
            .insert_header(("Authorization", bearer.as_str()))
            .set_json(json!({"note": 15}))
            .to_request()
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/comments")
            .insert_header(("Authorization", bearer.as_str()))
            .set_json(json!({
                "groupId": group_id,
                "titleId": "tt0111161",
                "comment": "never added"
            }))
            .to_request()
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/titles")
            .insert_header(("Authorization", bearer.as_str()))
            .to_request()
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    db.drop_database().await.unwrap();
}
