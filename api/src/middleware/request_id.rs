use std::time::Instant;

use actix_web::{
    Error,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header::{HeaderName, HeaderValue},
    middleware::Next
};
use brunan_core::db::new_id;
use tracing::{info, warn};

const REQUEST_ID: &str = "x-request-id";

/// Tags every response with an `x-request-id` (the caller's, when it sent
/// a usable one) and logs its outcome.
pub async fn request_id_middleware(
    request: ServiceRequest,
    next: Next<impl MessageBody>
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 64)
        .map(str::to_string)
        .unwrap_or_else(new_id);

    let method = request.method().to_string();
    let path = request.path().to_string();
    let started = Instant::now();

    let response = next.call(request).await;

    let elapsed_ms = started.elapsed().as_millis() as u64;

    match response {
        Ok(mut response) => {
            info!(
                request_id = %id,
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed_ms,
                "request completed"
            );

            if let Ok(value) = HeaderValue::from_str(&id) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(REQUEST_ID), value);
            }

            Ok(response)
        }
        Err(e) => {
            warn!(
                request_id = %id,
                method = %method,
                path = %path,
                elapsed_ms,
                error = %e,
                "request failed"
            );
            Err(e)
        }
    }
}
