use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// One contiguous flow interval for a storage device: either charging
/// (SCR) or discharging (SDR), distinguished by `is_charging`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRecord {
    pub id: EntityId,
    pub device_id: EntityId,
    pub is_charging: bool,
    pub flow_start_datetime: DateTime<Utc>,
    pub flow_end_datetime: DateTime<Utc>,
    /// Wh, always non-negative regardless of charge/discharge direction.
    pub flow_energy: f64,
    pub validator_id: Option<String>,
    pub is_deleted: bool,
}

/// A ternary match linking one SCR, one SDR, and one cancelled
/// production-GC bundle to the SD-GC minted from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatedStorageRecord {
    pub id: EntityId,
    pub scr_id: EntityId,
    pub sdr_id: EntityId,
    pub gc_allocation_id: Option<EntityId>,
    pub sdgc_allocation_id: Option<EntityId>,
    pub sdr_proportion: f64,
    pub storage_efficiency_factor: f64,
    pub scr_allocation_methodology: String,
    pub efficiency_interval_start: DateTime<Utc>,
    pub efficiency_interval_end: DateTime<Utc>,
    pub is_deleted: bool,
}
