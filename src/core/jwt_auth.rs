use actix_web::{dev::Payload, web, Error as ActixWebError};
use actix_web::{error::ErrorUnauthorized, http, FromRequest, HttpMessage, HttpRequest};
use core::fmt;
use jsonwebtoken::{decode, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::core::config::JwtAuthConfig;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{\"success\":{},\"message\":\"{}\"}}", self.success, self.message)
    }
}

fn unauthorized(message: &str) -> ActixWebError {
    ErrorUnauthorized(ErrorResponse {
        success: false,
        message: message.to_string(),
    })
}

/// Claims of tokens issued by the management auth service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String, // researcher user id
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: usize,
}

#[derive(Debug)]
pub struct JwtMiddleware {
    pub user_id: String,
    pub claims: JwtClaims,
}

impl FromRequest for JwtMiddleware {
    type Error = ActixWebError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let auth_config = match req.app_data::<web::Data<JwtAuthConfig>>() {
            Some(config) => config,
            None => {
                tracing::error!("jwt auth config is not registered");
                return ready(Err(unauthorized("Invalid login credentials")));
            }
        };

        let token = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string);

        let token = match token {
            Some(token) => token,
            None => return ready(Err(unauthorized("Invalid login credentials"))),
        };

        let claims = match decode::<JwtClaims>(
            &token,
            &DecodingKey::from_secret(auth_config.secret.expose_secret().as_bytes()),
            &Validation::default(),
        ) {
            Ok(c) => c.claims,
            Err(_) => return ready(Err(unauthorized("Invalid token"))),
        };

        if claims.sub.is_empty() {
            return ready(Err(unauthorized("Invalid user ID in token")));
        }

        req.extensions_mut().insert(claims.clone());

        ready(Ok(JwtMiddleware {
            user_id: claims.sub.clone(),
            claims,
        }))
    }
}
