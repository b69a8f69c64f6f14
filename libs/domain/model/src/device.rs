use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergySourceType {
    SolarPv,
    Wind,
    Hydro,
    Biomass,
    Nuclear,
    Electrolysis,
    Geothermal,
    BatteryStorage,
    Chp,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnologyType {
    SolarPv,
    WindTurbine,
    Hydro,
    BatteryStorage,
    OtherStorage,
    Chp,
    Other,
}

/// A production, consumption, or storage unit bound to exactly one
/// Account. `is_storage` gates the `energy_mwh` invariant from spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: EntityId,
    pub account_id: EntityId,
    pub local_device_identifier: String,
    pub energy_source: EnergySourceType,
    pub technology_type: TechnologyType,
    pub power_mw: f64,
    pub energy_mwh: Option<f64>,
    pub operational_date: DateTime<Utc>,
    pub is_storage: bool,
    pub is_deleted: bool,
}

impl Device {
    /// `is_storage` devices must carry a storage capacity (spec.md §3).
    pub fn has_required_storage_capacity(&self) -> bool {
        !self.is_storage || self.energy_mwh.is_some()
    }

    /// Per-interval capacity ceiling used by the Bundle Validator:
    /// `power_mw * 1e6 * hours * CAPACITY_MARGIN`.
    pub fn interval_capacity_wh(&self, hours: f64, capacity_margin: f64) -> f64 {
        self.power_mw * 1_000_000.0 * hours * capacity_margin
    }
}
