use std::{collections::HashMap, str::FromStr};

use actix_web::{
    Error,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next
};
use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::{
    KeyValue,
    global,
    trace::{Span, SpanKind, Tracer}
};
use opentelemetry_http::HeaderExtractor;

lazy_static::lazy_static! {
    static ref ROUTE_MAP: HashMap<String, String> = {
        HashMap::from([
            ("/login", "/login"),
            ("/users", "/users"),
            ("/users/{user_id}", "/users/:id"),
            ("/titles", "/titles"),
            ("/titles/{title_id}", "/titles/:id"),
            ("/titles/{title_id}/ratings", "/titles/:id/ratings"),
            ("/ratings", "/ratings"),
            ("/ratings/batch", "/ratings/batch"),
            ("/ratings/{rating_id}", "/ratings/:id"),
            ("/ratings/{rating_id}/seasons/{season}", "/ratings/:id/seasons/:season"),
            ("/comments", "/comments"),
            ("/comments/{title_id}", "/comments/:id"),
            ("/comments/{comment_id}", "/comments/:id"),
            ("/comments/{comment_id}/seasons/{season}", "/comments/:id/seasons/:season"),
            ("/groups", "/groups"),
            ("/groups/titles", "/groups/titles"),
            ("/groups/{group_id}", "/groups/:id"),
            ("/groups/{group_id}/users", "/groups/:id/users"),
            ("/groups/{group_id}/titles", "/groups/:id/titles"),
            ("/groups/{group_id}/titles/{title_id}", "/groups/:id/titles/:id")
        ].map(|(k, v)| (k.to_string(), v.to_string())))
    };
}

pub async fn otel_middleware(
    request: ServiceRequest,
    next: Next<impl MessageBody>
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let Some(route) = request
        .match_pattern()
        .and_then(|route| ROUTE_MAP.get(&route))
    else {
        return next.call(request).await;
    };

    let tracer = global::tracer("");

    let span = tracer
        .span_builder(format!("{} {}", request.method(), route))
        .with_kind(SpanKind::Server)
        .with_attributes(vec![
            KeyValue::new("http.method", request.method().to_string()),
            KeyValue::new("http.route", route.clone()),
            KeyValue::new("http.path", request.uri().path().to_string()),
            KeyValue::new(
                "http.query",
                request.uri().query().unwrap_or_default().to_string()
            ),
        ]);

    // ? continue the caller's trace when it sent one
    let mut span = if request.headers().contains_key("traceparent") {
        span.start_with_context(
            &tracer,
            &global::get_text_map_propagator(|propagator| {
                propagator.extract(&HeaderExtractor(&HeaderMap::from_iter(
                    request.headers().iter().filter_map(|(k, v)| {
                        Some((
                            HeaderName::from_str(k.as_str()).ok()?,
                            HeaderValue::from_bytes(v.as_bytes()).ok()?
                        ))
                    })
                )))
            })
        )
    } else {
        span.start(&tracer)
    };

    let response = next.call(request).await;

    span.set_attribute(KeyValue::new(
        "http.status_code",
        match response {
            Ok(ref res) => res.status().as_u16().to_string(),
            Err(_) => "500".to_string()
        }
    ));

    response
}
