mod comments;
mod groups;
mod ratings;
mod titles;
mod users;

use actix_web::{HttpResponse, Responder, get};

pub use comments::config as comments;
pub use groups::config as groups;
pub use ratings::config as ratings;
pub use titles::config as titles;
pub use users::config as users;

#[get("/healthcheck")]
pub async fn healthcheck() -> impl Responder {
    HttpResponse::NoContent().finish()
}
