use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use gc_domain_engine::ports::BundleRepository;
use gc_domain_engine::storage::StorageAllocator;
use gc_domain_model::{CertificateStatus, GranularCertificateBundle, StorageRecord};
use libsql::params;
use serde::Deserialize;

use crate::csv_import::{import_allocated_storage_records, import_storage_records, ImportSummary};
use crate::error::ApiError;
use crate::state::AppState;

async fn read_csv_field(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            return field
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| ApiError::Validation(format!("failed to read upload: {e}")));
        }
    }
    Err(ApiError::Validation("multipart body missing a `file` field".into()))
}

pub async fn upload_storage_records(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImportSummary>), ApiError> {
    let bytes = read_csv_field(multipart).await?;
    let summary = import_storage_records(&state, &bytes).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn upload_allocated_storage_records(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImportSummary>), ApiError> {
    let bytes = read_csv_field(multipart).await?;
    let summary = import_allocated_storage_records(&state, &bytes).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

struct AllocationRow {
    id: i64,
    scr_id: i64,
    sdr_id: i64,
    gc_allocation_id: Option<i64>,
    sdr_proportion: f64,
    storage_efficiency_factor: f64,
    scr_allocation_methodology: String,
}

async fn fetch_allocation(state: &AppState, id: i64) -> Result<AllocationRow, ApiError> {
    let conn = state.read_store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut rows = conn
        .query(
            r#"SELECT id, scr_id, sdr_id, gc_allocation_id, sdr_proportion, storage_efficiency_factor,
                scr_allocation_methodology
               FROM allocated_storage_records WHERE id = ?1 AND is_deleted = 0"#,
            params![id],
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let row = rows
        .next()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("no allocated_storage_record with id {id}")))?;
    Ok(AllocationRow {
        id: row.get::<i64>(0).map_err(|e| ApiError::Internal(e.to_string()))?,
        scr_id: row.get::<i64>(1).map_err(|e| ApiError::Internal(e.to_string()))?,
        sdr_id: row.get::<i64>(2).map_err(|e| ApiError::Internal(e.to_string()))?,
        gc_allocation_id: row.get::<Option<i64>>(3).map_err(|e| ApiError::Internal(e.to_string()))?,
        sdr_proportion: row.get::<f64>(4).map_err(|e| ApiError::Internal(e.to_string()))?,
        storage_efficiency_factor: row.get::<f64>(5).map_err(|e| ApiError::Internal(e.to_string()))?,
        scr_allocation_methodology: row.get::<String>(6).map_err(|e| ApiError::Internal(e.to_string()))?,
    })
}

async fn fetch_storage_record(state: &AppState, id: i64) -> Result<StorageRecord, ApiError> {
    let conn = state.read_store.get_connection().map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut rows = conn
        .query(
            r#"SELECT id, device_id, is_charging, flow_start_datetime, flow_end_datetime, flow_energy,
                validator_id, is_deleted
               FROM storage_records WHERE id = ?1"#,
            params![id],
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let row = rows
        .next()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("no storage_record with id {id}")))?;
    let parse_dt = |s: String| -> Result<DateTime<Utc>, ApiError> {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| ApiError::Internal(format!("invalid datetime {s}: {e}")))
    };
    Ok(StorageRecord {
        id: row.get::<i64>(0).map_err(|e| ApiError::Internal(e.to_string()))?,
        device_id: row.get::<i64>(1).map_err(|e| ApiError::Internal(e.to_string()))?,
        is_charging: row.get::<i64>(2).map_err(|e| ApiError::Internal(e.to_string()))? != 0,
        flow_start_datetime: parse_dt(row.get::<String>(3).map_err(|e| ApiError::Internal(e.to_string()))?)?,
        flow_end_datetime: parse_dt(row.get::<String>(4).map_err(|e| ApiError::Internal(e.to_string()))?)?,
        flow_energy: row.get::<f64>(5).map_err(|e| ApiError::Internal(e.to_string()))?,
        validator_id: row.get::<Option<String>>(6).map_err(|e| ApiError::Internal(e.to_string()))?,
        is_deleted: row.get::<i64>(7).map_err(|e| ApiError::Internal(e.to_string()))? != 0,
    })
}

#[derive(Debug, Deserialize)]
pub struct IssueSdgcsRequest {
    pub allocated_record_ids: Vec<i64>,
}

pub async fn issue_sdgcs(
    State(state): State<AppState>,
    Json(request): Json<IssueSdgcsRequest>,
) -> Result<(StatusCode, Json<Vec<GranularCertificateBundle>>), ApiError> {
    let allocator = StorageAllocator {
        bundles: state.bundles.as_ref(),
        store: state.store.as_ref(),
    };

    let mut issued = Vec::with_capacity(request.allocated_record_ids.len());
    for id in request.allocated_record_ids {
        let allocation = fetch_allocation(&state, id).await?;
        let scr = fetch_storage_record(&state, allocation.scr_id).await?;
        let sdr = fetch_storage_record(&state, allocation.sdr_id).await?;

        let cancelled_gc = match allocation.gc_allocation_id {
            Some(gc_id) => Some(
                state
                    .bundles
                    .get(gc_id)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(format!("no bundle with id {gc_id}")))?,
            ),
            None => None,
        };

        allocator.validate_allocation(
            &scr,
            &sdr,
            cancelled_gc.as_ref(),
            &gc_domain_engine::storage::AllocationRequest {
                scr_validator_id: scr.validator_id.clone().unwrap_or_default(),
                sdr_validator_id: sdr.validator_id.clone().unwrap_or_default(),
                gc_allocation_id: allocation.gc_allocation_id,
                sdr_proportion: allocation.sdr_proportion,
                storage_efficiency_factor: allocation.storage_efficiency_factor,
                scr_allocation_methodology: allocation.scr_allocation_methodology.clone(),
                storage_device_id: sdr.device_id,
            },
        )?;

        let cancelled_gc = cancelled_gc.ok_or_else(|| {
            ApiError::Validation("issue_sdgcs requires a cancelled gc_allocation_id per row".into())
        })?;
        if cancelled_gc.certificate_bundle_status != CertificateStatus::Cancelled {
            return Err(ApiError::State("referenced bundle is not CANCELLED".into()));
        }

        let sdgc = allocator
            .issue_sdgc(&cancelled_gc, &sdr, allocation.id, allocation.storage_efficiency_factor, sdr.device_id)
            .await?;
        issued.push(sdgc);
    }

    Ok((StatusCode::OK, Json(issued)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_domain_engine::ports::{AccountRepository, BundleRepository, CqrsStore, MeterDataClient, WhitelistRepository};
    use gc_infra_db::{AccountReadRepository, BundleReadRepository, CqrsCoordinator, StoreRole, TursoClient, WhitelistReadRepository};
    use gc_infra_meter::MockMeterDataClient;
    use std::sync::Arc;

    async fn empty_state() -> AppState {
        let write_store = TursoClient::connect(":memory:", None, StoreRole::Write).await.unwrap();
        let read_store = TursoClient::connect(":memory:", None, StoreRole::Read).await.unwrap();
        let event_store = TursoClient::connect(":memory:", None, StoreRole::Event).await.unwrap();

        let store: Arc<dyn CqrsStore> = Arc::new(CqrsCoordinator {
            write_store: write_store.clone(),
            read_store: read_store.clone(),
            event_store,
        });
        let bundles: Arc<dyn BundleRepository> = Arc::new(BundleReadRepository { read_store: read_store.clone() });
        let accounts: Arc<dyn AccountRepository> = Arc::new(AccountReadRepository { read_store: read_store.clone() });
        let whitelist: Arc<dyn WhitelistRepository> = Arc::new(WhitelistReadRepository { read_store: read_store.clone() });
        let meter_client: Arc<dyn MeterDataClient> = Arc::new(MockMeterDataClient::default());

        AppState {
            bundles,
            accounts,
            whitelist,
            meter_client,
            store,
            settings: Arc::new(crate::config::Settings {
                write_database_url: String::new(),
                write_database_token: None,
                read_database_url: String::new(),
                read_database_token: None,
                event_database_url: String::new(),
                event_database_token: None,
                certificate_granularity_hours: 1.0,
                capacity_margin: 1.1,
                certificate_expiry_years: 2,
                jwt_secret: "test-secret".into(),
                access_token_expire_minutes: 30,
                api_key_expire_days: 365,
                api_key_max_expire_days: 730,
                cors_allowed_origins: vec!["*".into()],
                log_level: "info".into(),
                port: 0,
                meter_base_url: "http://localhost".into(),
                meter_api_key: String::new(),
            }),
            write_store,
            read_store,
        }
    }

    #[tokio::test]
    async fn issue_sdgcs_rejects_unknown_allocation_id() {
        let state = empty_state().await;
        let err = issue_sdgcs(State(state), Json(IssueSdgcsRequest { allocated_record_ids: vec![1] }))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn issue_sdgcs_with_no_ids_issues_nothing() {
        let state = empty_state().await;
        let (status, Json(issued)) = issue_sdgcs(State(state), Json(IssueSdgcsRequest { allocated_record_ids: vec![] }))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(issued.is_empty());
    }
}
