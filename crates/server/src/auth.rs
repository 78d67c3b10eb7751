use std::net::SocketAddr;

use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{PasswordHash, SaltString, rand_core::OsRng},
};
use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    error::{AppError, redirect_with_flash},
    models::{FlashParams, User},
};

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: i64,
}

pub fn issue_token(keys: &JwtKeys, user: &User) -> Result<String, AppError> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    encode(&Header::default(), &claims, &keys.encoding)
        .map_err(|_| AppError::BadRequest("could not issue a token".into()))
}

/// Identity of the request, read from the `Authorization: Bearer` header.
pub fn bearer_claims(keys: &JwtKeys, headers: &HeaderMap) -> Result<Claims, AppError> {
    let auth_header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    decode::<Claims>(token, &keys.decoding, &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized)
}

pub fn maybe_claims(keys: &JwtKeys, headers: &HeaderMap) -> Option<Claims> {
    bearer_claims(keys, headers).ok()
}

// ===== Passwords =====

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AppError::BadRequest("could not hash the password".into()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

// ===== Handlers =====

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
struct LoginPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Login entry point; failed logins and unauthenticated requests land here.
async fn login_page(Query(params): Query<FlashParams>) -> Json<LoginPage> {
    Json(LoginPage {
        message: params.flash,
    })
}

async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let user: Option<User> = sqlx::query_as(
        "SELECT id, username, display_name, password_hash FROM users WHERE username = $1",
    )
    .bind(&req.username)
    .fetch_optional(&state.db)
    .await?;

    let Some(user) = user.filter(|u| verify_password(&req.password, &u.password_hash)) else {
        tracing::warn!(username = %req.username, ip = %addr.ip(), "login failed");
        return Ok(redirect_with_flash(
            "/auth/login",
            "Invalid username or password",
        ));
    };

    let token = issue_token(&state.jwt, &user)?;
    tracing::info!(username = %user.username, ip = %addr.ip(), "login succeeded");

    Ok(Json(LoginResponse {
        token,
        username: user.username,
        display_name: user.display_name,
    })
    .into_response())
}

/// Tokens are stateless, so logout only records the signal. Works for
/// anonymous callers too.
async fn logout(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    match maybe_claims(&state.jwt, &headers) {
        Some(claims) => {
            tracing::info!(username = %claims.username, ip = %addr.ip(), "logout");
        }
        None => {
            tracing::info!(username = "anonymous", ip = %addr.ip(), "logout");
        }
    }
    Json(serde_json::json!({ "status": "logged out" }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login_page).post(login))
        .route("/auth/logout", post(logout))
}
