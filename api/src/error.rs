use actix_web::{
    HttpRequest,
    HttpResponse,
    ResponseError,
    error::{JsonPayloadError, QueryPayloadError},
    http::{
        StatusCode,
        header::{HeaderMap, HeaderValue, WWW_AUTHENTICATE}
    }
};
use brunan_core::services::{
    CommentError,
    ErrorStatus,
    GroupError,
    RatingError,
    TitleError,
    UserError
};
use derive_more::Display;
use serde_json::json;
use tracing::error;

#[derive(Debug, Display)]
#[display("status: {status}, detail: {detail}")]
pub struct ErrorResponse {
    pub status:  u16,
    pub detail:  String,
    pub headers: HeaderMap
}

impl Default for ErrorResponse {
    fn default() -> Self {
        ErrorResponse {
            status:  500,
            detail:  "Internal Server Error".to_string(),
            headers: HeaderMap::new()
        }
    }
}

impl ErrorResponse {
    pub fn new(status: u16, detail: &str) -> Self {
        let mut response = ErrorResponse {
            status,
            detail: capitalize(detail),
            ..Default::default()
        };

        if status == 401 {
            response
                .headers
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }

    pub fn unauthorized() -> Self {
        Self::new(401, "Not authenticated")
    }

    pub fn forbidden() -> Self {
        Self::new(403, "Admin privileges required")
    }
}

impl ResponseError for ErrorResponse {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        let mut response =
            HttpResponse::build(self.status_code()).json(json!({
                "detail": self.detail
            }));

        for (key, value) in self.headers.iter() {
            response.headers_mut().insert(key.clone(), value.clone());
        }

        response
    }
}

pub fn capitalize(detail: &str) -> String {
    let mut chars = detail.chars();

    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new()
    }
}

fn from_service_error<E: ErrorStatus>(error: E) -> ErrorResponse {
    match error.status() {
        Some(status) => ErrorResponse::new(status, &error.to_string()),
        None => {
            error!(error = %error, "unexpected service error");
            ErrorResponse::default()
        }
    }
}

macro_rules! service_errors {
    ($($error:ty),+) => {
        $(
            impl From<$error> for ErrorResponse {
                fn from(error: $error) -> Self {
                    from_service_error(error)
                }
            }
        )+
    };
}

service_errors!(CommentError, GroupError, RatingError, TitleError, UserError);

pub fn json_error_handler(
    error: JsonPayloadError,
    _request: &HttpRequest
) -> actix_web::Error {
    tracing::debug!(error = %error, "rejected request body");

    ErrorResponse::new(400, "Invalid JSON in request body").into()
}

pub fn query_error_handler(
    error: QueryPayloadError,
    _request: &HttpRequest
) -> actix_web::Error {
    tracing::debug!(error = %error, "rejected query string");

    ErrorResponse::new(400, "Invalid query parameters").into()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("title not found"), "Title not found");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("élan"), "Élan");
    }

    #[test]
    fn test_known_status_keeps_message() {
        let response = ErrorResponse::from(RatingError::InvalidNote);

        assert_eq!(response.status, 400);
        assert!(response.detail.starts_with(char::is_uppercase));
    }

    #[test]
    fn test_internal_errors_are_generic() {
        let response = ErrorResponse::from(UserError::Db(
            brunan_core::db::DbError::NotFound
        ));

        assert_eq!(response.status, 500);
        assert_eq!(response.detail, "Internal Server Error");
    }

    #[test]
    fn test_unauthorized_sets_challenge() {
        let response = ErrorResponse::unauthorized();

        assert_eq!(response.headers.get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    }
}
