use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyCarrierType {
    Electricity,
    NaturalGas,
    Hydrogen,
    Heat,
    Other,
}

/// Lifecycle states from spec.md §3. `WithdrawN` and `BundleSplit` are
/// terminal; `BundleSplit` has no forward transitions (spec.md §9, Open
/// Question — treated as terminal and audit-only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Active,
    Cancelled,
    Claimed,
    Reserved,
    Locked,
    Withdrawn,
    Expired,
    BundleSplit,
}

impl CertificateStatus {
    /// Legal successor states, independent of which action drives the
    /// transition (the Action Processor additionally checks role and
    /// whitelist preconditions per action).
    pub fn allowed_transitions(self) -> &'static [CertificateStatus] {
        use CertificateStatus::*;
        match self {
            Active => &[Cancelled, Reserved, Locked, Withdrawn, Expired, BundleSplit],
            Reserved => &[Cancelled, Withdrawn, BundleSplit],
            Cancelled => &[Claimed, Withdrawn],
            Locked | Claimed | Withdrawn | Expired | BundleSplit => &[],
        }
    }

    pub fn can_transition_to(self, target: CertificateStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }
}

/// The central entity: a contiguous integer range `[range_start,
/// range_end]` of unit certificates produced by one device over one
/// production interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranularCertificateBundle {
    pub id: EntityId,
    /// Stable across splits; shared by every descendant of a parent.
    pub issuance_id: String,
    /// `SHA256(canonical_non_mutable_fields || parent_nonce)`.
    pub hash: String,
    pub range_start: i64,
    pub range_end: i64,
    pub certificate_bundle_status: CertificateStatus,
    pub account_id: EntityId,
    pub device_id: EntityId,
    pub metadata_id: Option<EntityId>,
    pub production_starting_interval: DateTime<Utc>,
    pub production_ending_interval: DateTime<Utc>,
    pub issuance_datestamp: NaiveDate,
    pub expiry_datestamp: NaiveDate,
    pub energy_carrier: EnergyCarrierType,
    pub energy_source: crate::device::EnergySourceType,
    /// Wh represented by each unit certificate in the range.
    pub face_value: i64,
    pub is_storage: bool,
    pub allocated_storage_record_id: Option<EntityId>,
    pub storage_efficiency_factor: Option<f64>,
    /// Set by CANCEL; who may CLAIM the cancelled attributes.
    pub beneficiary: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields excluded from the lineage hash because they change across the
/// bundle's lifecycle or across a split without affecting its lineage.
/// Mirrors `mutable_gc_attributes` in the original Python implementation.
pub const MUTABLE_BUNDLE_FIELDS: &[&str] = &[
    "certificate_bundle_status",
    "account_id",
    "allocated_storage_record_id",
    "storage_efficiency_factor",
    "is_deleted",
    "range_start",
    "range_end",
];

impl GranularCertificateBundle {
    pub fn bundle_quantity(&self) -> i64 {
        self.range_end - self.range_start + 1
    }

    /// The JSON value fed into `gc_core_ids::bundle_hash`: every field
    /// except `id`, `created_at`, `hash`, and the mutable fields above.
    pub fn canonical_value(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).expect("bundle is always serializable");
        if let serde_json::Value::Object(fields) = &mut value {
            fields.remove("id");
            fields.remove("created_at");
            fields.remove("hash");
            for mutable_field in MUTABLE_BUNDLE_FIELDS {
                fields.remove(*mutable_field);
            }
        }
        value
    }
}
