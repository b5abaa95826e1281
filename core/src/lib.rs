pub mod db;
pub mod imdb;
pub mod migrations;
pub mod services;
pub mod sync;

mod env;
pub use env::{Env, env};

mod logging;
pub use logging::init_logging;

#[cfg(feature = "otel")]
mod otel;
#[cfg(feature = "otel")]
pub use otel::{init_otel, shutdown_otel};
