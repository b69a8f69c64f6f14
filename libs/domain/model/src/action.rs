use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Transfer,
    Cancel,
    Claim,
    Withdraw,
    Lock,
    Reserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResponseStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Every action attempt — successful or not — is recorded as one of
/// these, per spec.md §4.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranularCertificateAction {
    pub id: EntityId,
    pub action_type: ActionType,
    pub source_account_id: EntityId,
    pub actor_user_id: EntityId,
    pub granular_certificate_bundle_ids: Vec<EntityId>,
    pub certificate_quantity: Option<i64>,
    pub certificate_bundle_percentage: Option<f64>,
    pub beneficiary: Option<String>,
    pub target_account_id: Option<EntityId>,
    pub action_request_datetime: DateTime<Utc>,
    pub action_completed_datetime: Option<DateTime<Utc>>,
    pub action_response_status: ActionResponseStatus,
    pub rejection_reason: Option<String>,
}
