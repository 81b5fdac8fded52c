//! Bearer tokens and the request guards built on them.
//!
//! Tokens are HS256 JWTs. A user token carries `userId`, an administrator
//! token carries `adminId` and `isAdmin: true`. Guards are plain extractors:
//! a handler that takes [`AuthUser`] or [`AuthAdmin`] only runs once the
//! token in the `Authorization` header has been verified.

use std::{
    collections::HashSet,
    future::{ready, Ready},
    time::Duration,
};

use actix_web::{dev::Payload, http::header::AUTHORIZATION, web::Data, FromRequest, HttpRequest};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{errors::AppError, AppState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<i64>,
    pub username: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_admin: bool,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    pub fn for_user(user_id: i64, username: &str) -> Self {
        Claims {
            user_id: Some(user_id),
            admin_id: None,
            username: username.to_owned(),
            is_admin: false,
            iat: chrono::Utc::now().timestamp(),
            exp: None,
        }
    }

    pub fn for_admin(admin_id: i64, username: &str) -> Self {
        Claims {
            user_id: None,
            admin_id: Some(admin_id),
            username: username.to_owned(),
            is_admin: true,
            iat: chrono::Utc::now().timestamp(),
            exp: None,
        }
    }
}

/// Signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Option<Duration>,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Option<Duration>) -> Self {
        TokenKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, mut claims: Claims) -> Result<String, AppError> {
        if let Some(ttl) = self.ttl {
            let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
            claims.exp = Some(claims.iat.saturating_add(ttl));
        }
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Checks signature and shape. `exp` is enforced whenever present and is
    /// mandatory once a TTL is configured.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.required_spec_claims = if self.ttl.is_some() {
            HashSet::from(["exp".to_owned()])
        } else {
            HashSet::new()
        };
        decode::<Claims>(token, &self.decoding, &validation).map(|data| data.claims)
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn token_keys(req: &HttpRequest) -> Result<&TokenKeys, AppError> {
    req.app_data::<Data<AppState>>()
        .map(|state| &state.tokens)
        .ok_or_else(|| AppError::ConfigError("application state is not registered".to_owned()))
}

/// An authenticated regular user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
}

impl AuthUser {
    fn from_request_sync(req: &HttpRequest) -> Result<Self, AppError> {
        let token = bearer_token(req).ok_or_else(|| AppError::unauthorized("token required"))?;
        let claims = token_keys(req)?.verify(token).map_err(|e| {
            log::debug!("Rejected user token: {}", e);
            AppError::forbidden("invalid token")
        })?;
        match claims.user_id {
            Some(user_id) => Ok(AuthUser {
                user_id,
                username: claims.username,
            }),
            None => Err(AppError::forbidden("invalid token")),
        }
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(AuthUser::from_request_sync(req))
    }
}

/// An authenticated administrator.
#[derive(Debug, Clone)]
pub struct AuthAdmin {
    pub admin_id: i64,
    pub username: String,
}

impl AuthAdmin {
    fn from_request_sync(req: &HttpRequest) -> Result<Self, AppError> {
        let token =
            bearer_token(req).ok_or_else(|| AppError::unauthorized("admin token required"))?;
        let claims = token_keys(req)?.verify(token).map_err(|e| {
            log::debug!("Rejected admin token: {}", e);
            AppError::forbidden("invalid admin token")
        })?;
        match (claims.is_admin, claims.admin_id) {
            (true, Some(admin_id)) => Ok(AuthAdmin {
                admin_id,
                username: claims.username,
            }),
            _ => {
                log::warn!("Non-admin token presented to admin route by {}", claims.username);
                Err(AppError::forbidden("admin privileges required"))
            }
        }
    }
}

impl FromRequest for AuthAdmin {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(AuthAdmin::from_request_sync(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use actix_web::{http::StatusCode, test as actix_test, web, App, HttpResponse};

    #[test]
    fn issued_user_token_verifies() {
        let keys = TokenKeys::new("secret", None);
        let token = keys.issue(Claims::for_user(7, "alice")).expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.user_id, Some(7));
        assert_eq!(claims.username, "alice");
        assert!(!claims.is_admin);
        assert!(claims.exp.is_none());
    }

    #[test]
    fn admin_claims_use_camel_case_names() {
        let claims = Claims::for_admin(1, "admin");
        let value = serde_json::to_value(&claims).expect("json");
        assert_eq!(value["adminId"], 1);
        assert_eq!(value["isAdmin"], true);
        assert!(value.get("userId").is_none());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let ours = TokenKeys::new("secret", None);
        let theirs = TokenKeys::new("other-secret", None);
        let token = theirs.issue(Claims::for_user(1, "mallory")).expect("issue");
        assert!(ours.verify(&token).is_err());
        assert!(ours.verify("not.a.jwt").is_err());
    }

    #[test]
    fn ttl_adds_and_enforces_expiry() {
        let keys = TokenKeys::new("secret", Some(Duration::from_secs(3600)));
        let claims = keys
            .verify(&keys.issue(Claims::for_user(1, "alice")).expect("issue"))
            .expect("verify");
        assert_eq!(claims.exp, Some(claims.iat + 3600));

        let mut stale = Claims::for_user(1, "alice");
        stale.iat -= 7200;
        stale.exp = Some(stale.iat + 3600);
        let token = TokenKeys::new("secret", None).issue(stale).expect("issue");
        assert!(keys.verify(&token).is_err());

        // tokens minted before a TTL was configured carry no exp
        let legacy = TokenKeys::new("secret", None)
            .issue(Claims::for_user(1, "alice"))
            .expect("issue");
        assert!(keys.verify(&legacy).is_err());
    }

    async fn call(
        path: &str,
        auth: Option<String>,
    ) -> (StatusCode, serde_json::Value) {
        let state = test_state().await;
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route(
                    "/user",
                    web::get().to(|user: AuthUser| async move {
                        HttpResponse::Ok().json(serde_json::json!({ "id": user.user_id }))
                    }),
                )
                .route(
                    "/admin",
                    web::get().to(|admin: AuthAdmin| async move {
                        HttpResponse::Ok().json(serde_json::json!({ "id": admin.admin_id }))
                    }),
                ),
        )
        .await;
        let mut req = actix_test::TestRequest::get().uri(path);
        if let Some(value) = auth {
            req = req.insert_header((AUTHORIZATION, value));
        }
        let res = actix_test::call_service(&app, req.to_request()).await;
        let status = res.status();
        (status, actix_test::read_body_json(res).await)
    }

    fn bearer(claims: Claims) -> Option<String> {
        let token = crate::test_support::test_keys().issue(claims).expect("issue");
        Some(format!("Bearer {token}"))
    }

    #[actix_web::test]
    async fn user_guard_outcomes() {
        let (status, body) = call("/user", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token required");

        let (status, body) = call("/user", Some("Bearer garbage".into())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "invalid token");

        let (status, body) = call("/user", Some("Basic dXNlcjpwdw==".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token required");

        let (status, body) = call("/user", bearer(Claims::for_admin(1, "admin"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "invalid token");

        let (status, body) = call("/user", bearer(Claims::for_user(42, "alice"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 42);
    }

    #[actix_web::test]
    async fn admin_guard_outcomes() {
        let (status, body) = call("/admin", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "admin token required");

        let (status, body) = call("/admin", Some("Bearer garbage".into())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "invalid admin token");

        let (status, body) = call("/admin", bearer(Claims::for_user(42, "alice"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "admin privileges required");

        // isAdmin without an admin id is not an administrator
        let mut forged = Claims::for_user(42, "alice");
        forged.is_admin = true;
        let (status, _) = call("/admin", bearer(forged)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call("/admin", bearer(Claims::for_admin(1, "admin"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);
    }
}
