use actix_web::{HttpResponse, Responder, delete, get, patch, post, web};
use brunan_core::services::{
    Services,
    groups::{
        AddGroupTitleRequest,
        AddUserRequest,
        CreateGroupRequest,
        WatchedUpdate
    }
};

use crate::{
    error::ErrorResponse,
    models::{PageQuery, Token}
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/groups")
            .service(create_group)
            .service(add_group_title)
            .service(get_group)
            .service(add_group_user)
            .service(list_group_users)
            .service(list_group_titles)
            .service(update_watched)
            .service(remove_group_title)
    );
}

#[post("")]
async fn create_group(
    services: web::Data<Services>,
    body: web::Json<CreateGroupRequest>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let group = services
        .groups
        .create_group(&token.user.id, body.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(group))
}

#[post("/titles")]
async fn add_group_title(
    services: web::Data<Services>,
    body: web::Json<AddGroupTitleRequest>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let entry = services
        .groups
        .add_title(&token.user.id, body.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(entry))
}

#[get("/{group_id}")]
async fn get_group(
    services: web::Data<Services>,
    path: web::Path<String>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let group = services
        .groups
        .get_group(&token.user.id, &path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(group))
}

#[post("/{group_id}/users")]
async fn add_group_user(
    services: web::Data<Services>,
    path: web::Path<String>,
    body: web::Json<AddUserRequest>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let group = services
        .groups
        .add_user(&token.user.id, &path.into_inner(), body.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(group))
}

#[get("/{group_id}/users")]
async fn list_group_users(
    services: web::Data<Services>,
    path: web::Path<String>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let users = services
        .groups
        .list_users(&token.user.id, &path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(users))
}

#[get("/{group_id}/titles")]
async fn list_group_titles(
    services: web::Data<Services>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let page = services
        .groups
        .list_titles(&token.user.id, &path.into_inner(), query.group_titles())
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[patch("/{group_id}/titles")]
async fn update_watched(
    services: web::Data<Services>,
    path: web::Path<String>,
    body: web::Json<WatchedUpdate>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let entry = services
        .groups
        .update_watched(&token.user.id, &path.into_inner(), body.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(entry))
}

#[delete("/{group_id}/titles/{title_id}")]
async fn remove_group_title(
    services: web::Data<Services>,
    path: web::Path<(String, String)>,
    token: Token
) -> Result<impl Responder, ErrorResponse> {
    let (group_id, title_id) = path.into_inner();

    services
        .groups
        .remove_title(&token.user.id, &group_id, &title_id)
        .await?;

    Ok(HttpResponse::NoContent().finish())
}
