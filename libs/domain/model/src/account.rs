use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// Per-account role of a linked user, ordered low to high so that
/// `role >= Role::TradingUser` reads as "may trade".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    StorageValidator,
    AuditUser,
    TradingUser,
    ProductionUser,
    Admin,
}

/// Case-insensitive unique holder of devices and certificate bundles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: EntityId,
    pub account_name: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Case-insensitive comparison, matching the uniqueness invariant on
    /// `account_name` in spec.md §3.
    pub fn name_matches(&self, candidate: &str) -> bool {
        self.account_name.eq_ignore_ascii_case(candidate)
    }
}

/// Many-to-many link between `User` and `Account`, resolving the cyclic
/// ownership DESIGN NOTES §9 calls out, plus the per-account role used by
/// the Action Processor's role gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUserLink {
    pub id: EntityId,
    pub account_id: EntityId,
    pub user_id: EntityId,
    pub role: Role,
    pub is_deleted: bool,
}

/// Directed admission edge `source_account -> target_account`. A transfer
/// may only move bundles in that direction while the edge is live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountWhitelistLink {
    pub id: EntityId,
    pub source_account_id: EntityId,
    pub target_account_id: EntityId,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}
