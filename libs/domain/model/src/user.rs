use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// Identity entity. Password hashing itself is an external collaborator's
/// concern (spec.md §1, Out of scope) — this crate only stores the opaque
/// hash and the flag the role gate consults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// A long-lived credential alternative to a bearer token. The raw key is
/// never stored, only `key_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: EntityId,
    pub user_id: EntityId,
    pub key_hash: String,
    pub description: Option<String>,
    pub expiry_datetime: DateTime<Utc>,
    pub is_deleted: bool,
}

impl ApiKey {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_datetime
    }
}

/// A decoded, short-lived bearer token's claims, reconstructed by the
/// auth middleware boundary (spec.md §1: JWT primitives are out of
/// scope, but the record they decode into is part of the core contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: EntityId,
    pub is_admin: bool,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
