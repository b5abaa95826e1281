use actix_web::{HttpResponse, Responder, delete, get, patch, post, web};
use brunan_core::services::{
    Services,
    comments::{CommentUpdate, NewComment}
};

use crate::{
    error::ErrorResponse,
    models::{GroupQuery, Token}
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/comments")
            .service(add_comment)
            .service(title_comments)
            .service(update_comment)
            .service(delete_comment)
            .service(delete_comment_season)
    );
}

#[post("")]
async fn add_comment(
    services: web::Data<Services>,
    body: web::Json<NewComment>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let comment = services
        .comments
        .add(&token.user.id, body.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(comment))
}

#[get("/{title_id}")]
async fn title_comments(
    services: web::Data<Services>,
    path: web::Path<String>,
    query: web::Query<GroupQuery>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let comments = services
        .comments
        .get_by_title(&token.user.id, &query.group_id, &path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(comments))
}

#[patch("/{comment_id}")]
async fn update_comment(
    services: web::Data<Services>,
    path: web::Path<String>,
    body: web::Json<CommentUpdate>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let comment = services
        .comments
        .update(&token.user.id, &path.into_inner(), body.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(comment))
}

#[delete("/{comment_id}")]
async fn delete_comment(
    services: web::Data<Services>,
    path: web::Path<String>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    services
        .comments
        .delete(&token.user.id, &path.into_inner())
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[delete("/{comment_id}/seasons/{season}")]
async fn delete_comment_season(
    services: web::Data<Services>,
    path: web::Path<(String, i64)>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let (comment_id, season) = path.into_inner();

    Ok(
        match services
            .comments
            .delete_season(&token.user.id, &comment_id, season)
            .await?
        {
            Some(comment) => HttpResponse::Ok().json(comment),
            None => HttpResponse::NoContent().finish()
        }
    )
}
