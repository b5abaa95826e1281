#![forbid(unsafe_code)]

use std::sync::Arc;

use brunan_core::{
    db::Db,
    env,
    imdb::ImdbClient,
    init_logging,
    init_otel,
    shutdown_otel,
    sync::{SyncConfig, run_sync}
};
use opentelemetry::{
    KeyValue,
    global,
    trace::{FutureExt, TraceContextExt, Tracer}
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    init_logging();

    init_otel("routines")?;

    let env = env();

    let db = Db::connect(&env.mongo_url, &env.mongo_db, true).await?;

    let config = SyncConfig::from_env(env);

    info!(
        batch_size = config.batch_size,
        workers = config.workers,
        "running title sync"
    );

    let tracer = global::tracer("");

    let report = tracer
        .in_span("title sync", |cx| {
            let span_cx = cx.clone();

            async move {
                let report = run_sync(
                    db,
                    Arc::new(ImdbClient::new(&env.imdb_api_url)),
                    config
                )
                .await?;

                let span = span_cx.span();
                span.set_attribute(KeyValue::new(
                    "sync.updated",
                    report.updated as i64
                ));
                span.set_attribute(KeyValue::new(
                    "sync.failed_batches",
                    report.failed_batches as i64
                ));

                Ok::<_, brunan_core::db::DbError>(report)
            }
            .with_context(cx)
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    shutdown_otel()
}
