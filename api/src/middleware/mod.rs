mod otel;
mod request_id;

pub use otel::otel_middleware as otel;
pub use request_id::request_id_middleware as request_id;
