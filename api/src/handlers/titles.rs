use actix_web::{HttpResponse, Responder, delete, get, post, web};
use brunan_core::services::{Services, titles::AddTitleRequest};

use super::ratings::title_ratings;
use crate::{
    error::ErrorResponse,
    models::{AdminToken, PageQuery}
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/titles")
            .service(list_titles)
            .service(add_title)
            .service(delete_title)
            .service(title_ratings)
    );
}

#[get("")]
async fn list_titles(
    services: web::Data<Services>,
    query: web::Query<PageQuery>,
    _token: AdminToken
) -> Result<impl Responder, ErrorResponse> {
    let page = services
        .titles
        .get_page_of_titles(&query.titles())
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[post("")]
async fn add_title(
    services: web::Data<Services>,
    body: web::Json<AddTitleRequest>,
    _token: AdminToken
) -> Result<impl Responder, ErrorResponse> {
    let title = services.titles.add_from_url(body.into_inner()).await?;

    Ok(HttpResponse::Created().json(title))
}

#[delete("/{title_id}")]
async fn delete_title(
    services: web::Data<Services>,
    path: web::Path<String>,
    _token: AdminToken
) -> Result<impl Responder, ErrorResponse> {
    let report = services
        .titles
        .cascade_delete_title(&path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(report))
}
