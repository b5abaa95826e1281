#![forbid(unsafe_code)]

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::from_fn, web};
use brunan_api::{configure, middleware};
use brunan_core::{
    db::Db,
    env,
    imdb::{ImdbClient, RetryPolicy},
    init_logging,
    init_otel,
    services::Services,
    shutdown_otel
};
use tracing::info;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    init_logging();

    init_otel("api")?;

    let env = env();

    let db = Db::connect(&env.mongo_url, &env.mongo_db, true).await?;

    let services = web::Data::new(Services::new(
        db,
        Arc::new(ImdbClient::new(&env.imdb_api_url)),
        // ? no cooldown sleeps while a request is waiting
        RetryPolicy::once()
    ));

    info!(host = %env.api_host, port = env.api_port, "starting api");

    HttpServer::new(move || {
        App::new()
            .app_data(services.clone())
            .wrap(from_fn(middleware::request_id))
            .wrap(from_fn(middleware::otel))
            .configure(configure)
    })
    .bind((env.api_host.as_str(), env.api_port))?
    .run()
    .await?;

    shutdown_otel()
}
