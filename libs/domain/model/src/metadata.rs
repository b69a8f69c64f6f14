use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// Jurisdiction / issuing-body / market-zone attributes shared by one or
/// more bundles. De-duplicated by value at import time (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuanceMetaData {
    pub id: EntityId,
    pub country_of_issuance: String,
    pub connection_registration_identifier: String,
    pub issuing_body: String,
    pub legal_status: Option<String>,
    pub issuance_purpose: Option<String>,
    pub support_received: Option<String>,
    pub quality_scheme_reference: Option<String>,
    pub dissemination_level: Option<String>,
}
