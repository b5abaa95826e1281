use actix_web::{HttpResponse, Responder, delete, get, patch, post, web};
use brunan_core::services::{
    Services,
    ratings::{NewRating, RatingUpdate, RatingsBatchRequest}
};

use crate::{
    error::ErrorResponse,
    models::{GroupQuery, Token}
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/ratings")
            .service(add_rating)
            .service(ratings_batch)
            .service(get_rating)
            .service(update_rating)
            .service(delete_rating)
            .service(delete_rating_season)
    );
}

// ? mounted under /titles
#[get("/{title_id}/ratings")]
pub(super) async fn title_ratings(
    services: web::Data<Services>,
    path: web::Path<String>,
    query: web::Query<GroupQuery>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let ratings = services
        .ratings
        .get_by_title(&token.user.id, &query.group_id, &path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(ratings))
}

#[post("")]
async fn add_rating(
    services: web::Data<Services>,
    body: web::Json<NewRating>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let rating = services
        .ratings
        .add(&token.user.id, body.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(rating))
}

#[post("/batch")]
async fn ratings_batch(
    services: web::Data<Services>,
    body: web::Json<RatingsBatchRequest>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let batch = services
        .ratings
        .get_batch(&token.user.id, body.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(batch))
}

#[get("/{rating_id}")]
async fn get_rating(
    services: web::Data<Services>,
    path: web::Path<String>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let rating = services
        .ratings
        .get_by_id(&token.user.id, &path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(rating))
}

#[patch("/{rating_id}")]
async fn update_rating(
    services: web::Data<Services>,
    path: web::Path<String>,
    body: web::Json<RatingUpdate>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let rating = services
        .ratings
        .update(&token.user.id, &path.into_inner(), body.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(rating))
}

#[delete("/{rating_id}")]
async fn delete_rating(
    services: web::Data<Services>,
    path: web::Path<String>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    services
        .ratings
        .delete(&token.user.id, &path.into_inner())
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[delete("/{rating_id}/seasons/{season}")]
async fn delete_rating_season(
    services: web::Data<Services>,
    path: web::Path<(String, i64)>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let (rating_id, season) = path.into_inner();

    // ? removing the last season removes the whole rating
    Ok(
        match services
            .ratings
            .delete_season(&token.user.id, &rating_id, season)
            .await?
        {
            Some(rating) => HttpResponse::Ok().json(rating),
            None => HttpResponse::NoContent().finish()
        }
    )
}
