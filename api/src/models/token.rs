use std::pin::Pin;

use actix_web::{FromRequest, HttpRequest, http::header::AUTHORIZATION, web};
use brunan_core::services::{Services, users::AuthUser};

use crate::error::ErrorResponse;

/// The caller of an authenticated route.
#[derive(Debug)]
pub struct Token {
    pub user: AuthUser
}

/// Same as [`Token`] but only admins get through.
#[derive(Debug)]
pub struct AdminToken {
    pub user: AuthUser
}

pub fn bearer_token(request: &HttpRequest) -> Option<String> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;

    let (scheme, token) = header.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return None;
    }

    Some(token.trim().to_string())
}

impl FromRequest for Token {
    type Error = ErrorResponse;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(
        request: &HttpRequest,
        _payload: &mut actix_web::dev::Payload
    ) -> Self::Future {
        let Some(token) = bearer_token(request) else {
            return Box::pin(async { Err(ErrorResponse::unauthorized()) });
        };

        let Some(services) = request.app_data::<web::Data<Services>>().cloned()
        else {
            tracing::error!("services missing from app data");
            return Box::pin(async { Err(ErrorResponse::default()) });
        };

        Box::pin(async move {
            Ok(Token {
                user: services.users.authenticate(&token).await?
            })
        })
    }
}

impl FromRequest for AdminToken {
    type Error = ErrorResponse;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(
        request: &HttpRequest,
        payload: &mut actix_web::dev::Payload
    ) -> Self::Future {
        let token = Token::from_request(request, payload);

        Box::pin(async move {
            let Token { user } = token.await?;

            if !user.is_admin() {
                return Err(ErrorResponse::forbidden());
            }

            Ok(AdminToken { user })
        })
    }
}


#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn test_bearer_token() {
        let request = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer abc.def"))
            .to_http_request();
        assert_eq!(bearer_token(&request).as_deref(), Some("abc.def"));

        let request = TestRequest::default()
            .insert_header((AUTHORIZATION, "bearer   abc.def "))
            .to_http_request();
        assert_eq!(bearer_token(&request).as_deref(), Some("abc.def"));

        let request = TestRequest::default()
            .insert_header((AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert_eq!(bearer_token(&request), None);

        let request = TestRequest::default().to_http_request();
        assert_eq!(bearer_token(&request), None);
    }
}
