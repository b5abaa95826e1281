use actix_web::{HttpResponse, Responder, delete, get, post, web};
use brunan_core::{
    db::Role,
    services::{
        Services,
        users::{LoginRequest, NewUserRequest}
    }
};

use crate::{
    error::ErrorResponse,
    models::AdminToken
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(login).service(
        web::scope("/users")
            .service(create_user)
            .service(list_users)
            .service(delete_user)
    );
}

#[post("/login")]
async fn login(
    services: web::Data<Services>,
    body: web::Json<LoginRequest>
) -> Result<impl Responder, ErrorResponse> {
    let response = services.users.login(body.into_inner()).await?;

    Ok(HttpResponse::Ok().json(response))
}

#[post("")]
async fn create_user(
    services: web::Data<Services>,
    body: web::Json<NewUserRequest>
) -> Result<impl Responder, ErrorResponse> {
    let user = services
        .users
        .create_user(body.into_inner(), Role::User)
        .await?;

    Ok(HttpResponse::Created().json(user))
}

#[get("")]
async fn list_users(
    services: web::Data<Services>,
    _token: AdminToken
) -> Result<impl Responder, ErrorResponse> {
    Ok(HttpResponse::Ok().json(services.users.list_users().await?))
}

#[delete("/{user_id}")]
async fn delete_user(
    services: web::Data<Services>,
    path: web::Path<String>,
    token: AdminToken
) -> Result<impl Responder, ErrorResponse> {
    let user_id = path.into_inner();

    services.users.delete_user(&user_id).await?;

    tracing::info!(user_id, admin_id = %token.user.id, "user deleted");

    Ok(HttpResponse::NoContent().finish())
}
