pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use actix_web::web;

use crate::error::{json_error_handler, query_error_handler};

/// Every route of the api, plus the extractor configs that shape its
/// error bodies. Callers still have to provide `web::Data<Services>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(handlers::healthcheck)
        .configure(handlers::users)
        .configure(handlers::titles)
        .configure(handlers::ratings)
        .configure(handlers::comments)
        .configure(handlers::groups);
}
