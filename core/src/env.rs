use std::{env::var, sync::OnceLock};


static ENV: OnceLock<Env> = OnceLock::new();

#[derive(Debug)]
pub struct Env {
    pub mongo_url:          String,
    pub mongo_db:           String,
    pub imdb_api_url:       String,
    pub api_host:           String,
    pub api_port:           u16,
    pub dev:                bool,
    pub sync_batch_size:    usize,
    pub sync_workers:       usize,
    pub sync_cooldown_secs: u64,
    pub sync_max_retries:   u32
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

// ? MONGO_URL wins, otherwise the url is assembled from its parts
fn mongo_url() -> String {
    if let Ok(url) = var("MONGO_URL") {
        return url;
    }

    let host = var("MONGO_HOST").unwrap_or("localhost".to_string());
    let port = var("MONGO_PORT").unwrap_or("27017".to_string());

    match (var("MONGO_USER"), var("MONGO_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => format!(
            "mongodb://{user}:{password}@{host}:{port}/?authSource=admin"
        ),
        _ => format!("mongodb://{host}:{port}")
    }
}

impl Default for Env {
    fn default() -> Self {
        Self {
            mongo_url:          mongo_url(),
            mongo_db:           var("MONGODB_DB")
                .unwrap_or("brunan".to_string()),
            imdb_api_url:       var("IMDB_API_URL")
                .unwrap_or("https://api.imdbapi.dev".to_string()),
            api_host:           var("API_HOST")
                .unwrap_or("0.0.0.0".to_string()),
            api_port:           parsed("API_PORT", 8000),
            dev:                var("DEV")
                .map(|dev| dev != "false" && dev != "0")
                .unwrap_or(cfg!(debug_assertions)),
            sync_batch_size:    parsed("SYNC_BATCH_SIZE", 5),
            sync_workers:       parsed("SYNC_WORKERS", 5),
            sync_cooldown_secs: parsed("SYNC_RATE_LIMIT_COOLDOWN_SECS", 60),
            sync_max_retries:   parsed("SYNC_MAX_RETRIES", 3)
        }
    }
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn env() -> &'static Env {
    ENV.get_or_init(Env::new)
}
