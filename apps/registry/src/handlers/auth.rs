//! `/auth/token` and `/auth/api-key` (SPEC_FULL.md §6 supplements,
//! recovered from the source's authentication routes). Password
//! verification itself is delegated to `PasswordVerifier` — hashing
//! primitives are out of this crate's scope (spec.md §1).

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use libsql::params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::state::AppState;

pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, plaintext: &str, stored_hash: &str) -> bool;
}

/// Stand-in verifier: compares a SHA-256 digest of the plaintext against
/// the stored hash. Real deployments inject a bcrypt/argon2 verifier at
/// this same seam.
pub struct Sha256PasswordVerifier;

impl PasswordVerifier for Sha256PasswordVerifier {
    fn verify(&self, plaintext: &str, stored_hash: &str) -> bool {
        let digest = Sha256::digest(plaintext.as_bytes());
        hex::encode(digest) == stored_hash
    }
}

#[derive(Debug, Serialize)]
struct Claims {
    sub: String,
    is_admin: bool,
    iat: usize,
    exp: usize,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in_seconds: u64,
}

struct UserRow {
    id: i64,
    password_hash: String,
    is_admin: bool,
}

async fn fetch_user_by_username(state: &AppState, username: &str) -> Result<Option<UserRow>, ApiError> {
    let conn = state.read_store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut rows = conn
        .query(
            "SELECT id, password_hash, is_admin FROM users WHERE username = ?1 AND is_deleted = 0",
            params![username.to_string()],
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    match rows.next().await.map_err(|e| ApiError::Internal(e.to_string()))? {
        Some(row) => Ok(Some(UserRow {
            id: row.get::<i64>(0).map_err(|e| ApiError::Internal(e.to_string()))?,
            password_hash: row.get::<String>(1).map_err(|e| ApiError::Internal(e.to_string()))?,
            is_admin: row.get::<i64>(2).map_err(|e| ApiError::Internal(e.to_string()))? != 0,
        })),
        None => Ok(None),
    }
}

pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = fetch_user_by_username(&state, &request.username)
        .await?
        .ok_or_else(|| ApiError::Authorization("invalid username or password".into()))?;

    let verifier = Sha256PasswordVerifier;
    if !verifier.verify(&request.password, &user.password_hash) {
        return Err(ApiError::Authorization("invalid username or password".into()));
    }

    let now = Utc::now();
    let ttl = Duration::from_std(state.settings.access_token_ttl()).unwrap_or(Duration::minutes(30));
    let expires_at = now + ttl;

    let claims = Claims {
        sub: user.id.to_string(),
        is_admin: user.is_admin,
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.settings.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in_seconds: ttl.num_seconds().max(0) as u64,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    pub description: Option<String>,
    pub expire_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: i64,
    pub raw_key: String,
    pub expiry_datetime: chrono::DateTime<Utc>,
}

pub async fn issue_api_key(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthContext>,
    Json(request): Json<ApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyResponse>), ApiError> {
    let requested_days = request.expire_days.unwrap_or(state.settings.api_key_expire_days);
    if requested_days <= 0 || requested_days > state.settings.api_key_max_expire_days {
        return Err(ApiError::Validation(format!(
            "expire_days must be in (0, {}]",
            state.settings.api_key_max_expire_days
        )));
    }

    let raw_key = uuid::Uuid::new_v4().to_string();
    let key_hash = hex::encode(Sha256::digest(raw_key.as_bytes()));
    let expiry = Utc::now() + Duration::days(requested_days);

    let write_conn = state.write_store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
    write_conn
        .execute(
            "INSERT INTO api_keys (user_id, key_hash, description, expiry_datetime) VALUES (?1, ?2, ?3, ?4)",
            params![actor.user_id, key_hash.clone(), request.description.clone(), expiry.to_rfc3339()],
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let id = write_conn.last_insert_rowid();

    let read_conn = state.read_store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
    read_conn
        .execute(
            "INSERT INTO api_keys (id, user_id, key_hash, description, expiry_datetime) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, actor.user_id, key_hash, request.description.clone(), expiry.to_rfc3339()],
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse {
            id,
            raw_key,
            expiry_datetime: expiry,
        }),
    ))
}
