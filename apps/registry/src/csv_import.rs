//! Streaming CSV import (spec.md §6 "Import CSV schema", §9 Design
//! Notes: a schema-validated row iterator, not a whole-file parse, so a
//! malformed row fails without buffering the entire upload).

use chrono::{DateTime, NaiveDate, Utc};
use gc_domain_engine::ports::{AccountRepository, CqrsStore, StagedChange};
use gc_domain_model::{CertificateStatus, Event, EventType, GranularCertificateBundle};
use libsql::params;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CertificateImportRow {
    country_of_issuance: String,
    connection_registration_identifier: String,
    issuing_body: String,
    legal_status: Option<String>,
    issuance_purpose: Option<String>,
    support_received: Option<String>,
    quality_scheme_reference: Option<String>,
    dissemination_level: Option<String>,

    range_start: i64,
    range_end: i64,
    production_starting_interval: DateTime<Utc>,
    production_ending_interval: DateTime<Utc>,
    face_value: i64,
}

#[derive(Debug, serde::Serialize)]
pub struct ImportSummary {
    pub rows_processed: usize,
    pub bundles_created: usize,
    pub metadata_records_created: usize,
}

fn metadata_key(row: &CertificateImportRow) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        row.country_of_issuance,
        row.connection_registration_identifier,
        row.issuing_body,
        row.legal_status.as_deref().unwrap_or(""),
        row.issuance_purpose.as_deref().unwrap_or(""),
        row.support_received.as_deref().unwrap_or(""),
        row.quality_scheme_reference.as_deref().unwrap_or(""),
        row.dissemination_level.as_deref().unwrap_or(""),
    )
}

async fn materialize_metadata(state: &AppState, row: &CertificateImportRow) -> Result<i64, ApiError> {
    let write_conn = state.write_store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
    write_conn
        .execute(
            r#"INSERT INTO issuance_metadata
                (country_of_issuance, connection_registration_identifier, issuing_body,
                 legal_status, issuance_purpose, support_received, quality_scheme_reference,
                 dissemination_level)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                row.country_of_issuance.clone(),
                row.connection_registration_identifier.clone(),
                row.issuing_body.clone(),
                row.legal_status.clone(),
                row.issuance_purpose.clone(),
                row.support_received.clone(),
                row.quality_scheme_reference.clone(),
                row.dissemination_level.clone()
            ],
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let id = write_conn.last_insert_rowid();

    // Mirror into the read store so the materialized view stays consistent
    // with what the write store just accepted.
    let read_conn = state.read_store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
    read_conn
        .execute(
            r#"INSERT INTO issuance_metadata
                (id, country_of_issuance, connection_registration_identifier, issuing_body,
                 legal_status, issuance_purpose, support_received, quality_scheme_reference,
                 dissemination_level)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                id,
                row.country_of_issuance.clone(),
                row.connection_registration_identifier.clone(),
                row.issuing_body.clone(),
                row.legal_status.clone(),
                row.issuance_purpose.clone(),
                row.support_received.clone(),
                row.quality_scheme_reference.clone(),
                row.dissemination_level.clone()
            ],
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(id)
}

pub async fn import_certificates(
    state: &AppState,
    account_id: i64,
    device_id: i64,
    csv_bytes: &[u8],
) -> Result<ImportSummary, ApiError> {
    let device = state
        .accounts
        .get_device(device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {device_id} not found")))?;

    let mut reader = csv::Reader::from_reader(csv_bytes);
    let mut metadata_cache: HashMap<String, i64> = HashMap::new();
    let mut changes = Vec::new();
    let mut events = Vec::new();
    let mut rows_processed = 0usize;
    let mut metadata_created = 0usize;

    for result in reader.deserialize::<CertificateImportRow>() {
        let row = result.map_err(|e| ApiError::Validation(format!("malformed import row: {e}")))?;
        rows_processed += 1;

        let key = metadata_key(&row);
        let metadata_id = match metadata_cache.get(&key) {
            Some(id) => *id,
            None => {
                let id = materialize_metadata(state, &row).await?;
                metadata_created += 1;
                metadata_cache.insert(key, id);
                id
            }
        };

        if row.range_end < row.range_start {
            return Err(ApiError::Integrity(format!(
                "row range_end {} precedes range_start {}",
                row.range_end, row.range_start
            )));
        }

        let issuance_id = gc_core_ids::create_issuance_id(device_id, row.production_starting_interval);
        let today = Utc::now().date_naive();
        let expiry = add_years(today, 2);

        let mut bundle = GranularCertificateBundle {
            id: 0,
            issuance_id,
            hash: String::new(),
            range_start: row.range_start,
            range_end: row.range_end,
            certificate_bundle_status: CertificateStatus::Active,
            account_id,
            device_id,
            metadata_id: Some(metadata_id),
            production_starting_interval: row.production_starting_interval,
            production_ending_interval: row.production_ending_interval,
            issuance_datestamp: today,
            expiry_datestamp: expiry,
            energy_carrier: gc_domain_model::EnergyCarrierType::Electricity,
            energy_source: device.energy_source,
            face_value: row.face_value,
            is_storage: device.is_storage,
            allocated_storage_record_id: None,
            storage_efficiency_factor: None,
            beneficiary: None,
            is_deleted: false,
            created_at: Utc::now(),
        };
        bundle.hash = gc_core_ids::bundle_hash(&bundle.canonical_value(), "");

        events.push(Event {
            id: 0,
            entity_id: 0,
            entity_name: "granular_certificate_bundle".into(),
            event_type: EventType::Create,
            attributes_before: None,
            attributes_after: Some(bundle.canonical_value()),
            timestamp: Utc::now(),
        });
        changes.push(StagedChange::UpsertBundle(Box::new(bundle)));
    }

    let bundles_created = changes.len();
    if !changes.is_empty() {
        state.store.commit(changes, events).await?;
    }

    Ok(ImportSummary {
        rows_processed,
        bundles_created,
        metadata_records_created: metadata_created,
    })
}

fn add_years(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_add_months(chrono::Months::new(years * 12)).unwrap_or(date)
}


#[derive(Debug, Deserialize)]
struct StorageRecordRow {
    device_id: i64,
    is_charging: bool,
    flow_start_datetime: DateTime<Utc>,
    flow_end_datetime: DateTime<Utc>,
    flow_energy: f64,
    validator_id: Option<String>,
}

pub async fn import_storage_records(state: &AppState, csv_bytes: &[u8]) -> Result<ImportSummary, ApiError> {
    let mut reader = csv::Reader::from_reader(csv_bytes);
    let mut rows_processed = 0usize;

    for result in reader.deserialize::<StorageRecordRow>() {
        let row = result.map_err(|e| ApiError::Validation(format!("malformed import row: {e}")))?;
        rows_processed += 1;

        for store in [&state.write_store, &state.read_store] {
            let conn = store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
            conn.execute(
                r#"INSERT INTO storage_records
                    (device_id, is_charging, flow_start_datetime, flow_end_datetime, flow_energy, validator_id)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    row.device_id,
                    row.is_charging,
                    row.flow_start_datetime.to_rfc3339(),
                    row.flow_end_datetime.to_rfc3339(),
                    row.flow_energy,
                    row.validator_id.clone()
                ],
            )
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        }
    }

    Ok(ImportSummary {
        rows_processed,
        bundles_created: 0,
        metadata_records_created: 0,
    })
}

#[derive(Debug, Deserialize)]
struct AllocatedStorageRecordRow {
    scr_validator_id: String,
    sdr_validator_id: String,
    gc_allocation_id: Option<i64>,
    sdr_proportion: f64,
    storage_efficiency_factor: f64,
    scr_allocation_methodology: String,
    efficiency_interval_start: DateTime<Utc>,
    efficiency_interval_end: DateTime<Utc>,
}

async fn resolve_storage_record_id(state: &AppState, validator_id: &str) -> Result<i64, ApiError> {
    let conn = state.read_store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut rows = conn
        .query(
            "SELECT id FROM storage_records WHERE validator_id = ?1 AND is_deleted = 0",
            params![validator_id.to_string()],
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut matches = Vec::new();
    while let Some(row) = rows.next().await.map_err(|e| ApiError::Internal(e.to_string()))? {
        matches.push(row.get::<i64>(0).map_err(|e| ApiError::Internal(e.to_string()))?);
    }

    match matches.len() {
        0 => Err(ApiError::NotFound(format!("no storage record with validator_id {validator_id}"))),
        1 => Ok(matches[0]),
        _ => Err(ApiError::Integrity(format!(
            "validator_id {validator_id} matches {} storage records, expected exactly one",
            matches.len()
        ))),
    }
}

pub async fn import_allocated_storage_records(state: &AppState, csv_bytes: &[u8]) -> Result<ImportSummary, ApiError> {
    let mut reader = csv::Reader::from_reader(csv_bytes);
    let mut rows_processed = 0usize;

    for result in reader.deserialize::<AllocatedStorageRecordRow>() {
        let row = result.map_err(|e| ApiError::Validation(format!("malformed import row: {e}")))?;
        rows_processed += 1;

        let scr_id = resolve_storage_record_id(state, &row.scr_validator_id).await?;
        let sdr_id = resolve_storage_record_id(state, &row.sdr_validator_id).await?;

        for store in [&state.write_store, &state.read_store] {
            let conn = store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
            conn.execute(
                r#"INSERT INTO allocated_storage_records
                    (scr_id, sdr_id, gc_allocation_id, sdr_proportion, storage_efficiency_factor,
                     scr_allocation_methodology, efficiency_interval_start, efficiency_interval_end)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                params![
                    scr_id,
                    sdr_id,
                    row.gc_allocation_id,
                    row.sdr_proportion,
                    row.storage_efficiency_factor,
                    row.scr_allocation_methodology.clone(),
                    row.efficiency_interval_start.to_rfc3339(),
                    row.efficiency_interval_end.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        }
    }

    Ok(ImportSummary {
        rows_processed,
        bundles_created: 0,
        metadata_records_created: 0,
    })
}
