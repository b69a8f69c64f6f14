use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IssuanceIdError {
    #[error("INVALID_ISSUANCE_ID: {0}")]
    Malformed(String),
}

/// `issuance_id = "{device_id}-{ISO8601 production_starting_interval}"`.
///
/// The ID is deliberately not globally unique across splits — every child
/// of a split inherits the parent's issuance ID.
pub fn create_issuance_id(device_id: i64, production_starting_interval: DateTime<Utc>) -> String {
    format!("{device_id}-{}", production_starting_interval.to_rfc3339())
}

/// Splits on the first `-` only, so the ISO-8601 remainder (which itself
/// contains `-` in its date component) is parsed whole.
pub fn issuance_id_to_device_and_interval(
    issuance_id: &str,
) -> Result<(i64, DateTime<Utc>), IssuanceIdError> {
    let (device_part, interval_part) = issuance_id
        .split_once('-')
        .ok_or_else(|| IssuanceIdError::Malformed(issuance_id.to_string()))?;

    let device_id: i64 = device_part
        .parse()
        .map_err(|_| IssuanceIdError::Malformed(issuance_id.to_string()))?;

    let interval = DateTime::parse_from_rfc3339(interval_part)
        .map_err(|_| IssuanceIdError::Malformed(issuance_id.to_string()))?
        .with_timezone(&Utc);

    Ok((device_id, interval))
}
