//! Bundle <-> SQL row value mapping, shared by the CQRS coordinator and
//! the bundle repository's read path.

use chrono::{DateTime, NaiveDate, Utc};
use gc_domain_model::{
    CertificateStatus, EnergyCarrierType, EnergySourceType, GranularCertificateBundle,
};
use libsql::Value;

use crate::errors::DbError;

/// Column order matches the `INSERT`/`UPDATE` statements in `cqrs.rs`,
/// excluding `id`.
pub fn bundle_to_params(bundle: &GranularCertificateBundle) -> Vec<Value> {
    vec![
        Value::Text(bundle.issuance_id.clone()),
        Value::Text(bundle.hash.clone()),
        Value::Integer(bundle.range_start),
        Value::Integer(bundle.range_end),
        Value::Text(status_to_str(bundle.certificate_bundle_status).to_string()),
        Value::Integer(bundle.account_id),
        Value::Integer(bundle.device_id),
        bundle.metadata_id.map(Value::Integer).unwrap_or(Value::Null),
        Value::Text(bundle.production_starting_interval.to_rfc3339()),
        Value::Text(bundle.production_ending_interval.to_rfc3339()),
        Value::Text(bundle.issuance_datestamp.to_string()),
        Value::Text(bundle.expiry_datestamp.to_string()),
        Value::Text(carrier_to_str(bundle.energy_carrier).to_string()),
        Value::Text(source_to_str(bundle.energy_source).to_string()),
        Value::Integer(bundle.face_value),
        Value::Integer(bundle.is_storage as i64),
        bundle
            .allocated_storage_record_id
            .map(Value::Integer)
            .unwrap_or(Value::Null),
        bundle
            .storage_efficiency_factor
            .map(Value::Real)
            .unwrap_or(Value::Null),
        bundle.beneficiary.clone().map(Value::Text).unwrap_or(Value::Null),
        Value::Integer(bundle.is_deleted as i64),
        Value::Text(bundle.created_at.to_rfc3339()),
    ]
}

pub fn status_to_str(status: CertificateStatus) -> &'static str {
    use CertificateStatus::*;
    match status {
        Active => "ACTIVE",
        Cancelled => "CANCELLED",
        Claimed => "CLAIMED",
        Reserved => "RESERVED",
        Locked => "LOCKED",
        Withdrawn => "WITHDRAWN",
        Expired => "EXPIRED",
        BundleSplit => "BUNDLE_SPLIT",
    }
}

pub fn status_from_str(value: &str) -> Result<CertificateStatus, DbError> {
    use CertificateStatus::*;
    Ok(match value {
        "ACTIVE" => Active,
        "CANCELLED" => Cancelled,
        "CLAIMED" => Claimed,
        "RESERVED" => Reserved,
        "LOCKED" => Locked,
        "WITHDRAWN" => Withdrawn,
        "EXPIRED" => Expired,
        "BUNDLE_SPLIT" => BundleSplit,
        other => return Err(DbError::Mapping(format!("unknown certificate_bundle_status {other}"))),
    })
}

pub fn carrier_to_str(carrier: EnergyCarrierType) -> &'static str {
    use EnergyCarrierType::*;
    match carrier {
        Electricity => "electricity",
        NaturalGas => "natural_gas",
        Hydrogen => "hydrogen",
        Heat => "heat",
        Other => "other",
    }
}

pub fn carrier_from_str(value: &str) -> Result<EnergyCarrierType, DbError> {
    use EnergyCarrierType::*;
    Ok(match value {
        "electricity" => Electricity,
        "natural_gas" => NaturalGas,
        "hydrogen" => Hydrogen,
        "heat" => Heat,
        "other" => Other,
        other => return Err(DbError::Mapping(format!("unknown energy_carrier {other}"))),
    })
}

pub fn source_to_str(source: EnergySourceType) -> &'static str {
    use EnergySourceType::*;
    match source {
        SolarPv => "solar_pv",
        Wind => "wind",
        Hydro => "hydro",
        Biomass => "biomass",
        Nuclear => "nuclear",
        Electrolysis => "electrolysis",
        Geothermal => "geothermal",
        BatteryStorage => "battery_storage",
        Chp => "chp",
        Other => "other",
    }
}

pub fn source_from_str(value: &str) -> Result<EnergySourceType, DbError> {
    use EnergySourceType::*;
    Ok(match value {
        "solar_pv" => SolarPv,
        "wind" => Wind,
        "hydro" => Hydro,
        "biomass" => Biomass,
        "nuclear" => Nuclear,
        "electrolysis" => Electrolysis,
        "geothermal" => Geothermal,
        "battery_storage" => BatteryStorage,
        "chp" => Chp,
        "other" => Other,
        other => return Err(DbError::Mapping(format!("unknown energy_source {other}"))),
    })
}

pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Mapping(format!("invalid datetime {value}: {e}")))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| DbError::Mapping(format!("invalid date {value}: {e}")))
}
