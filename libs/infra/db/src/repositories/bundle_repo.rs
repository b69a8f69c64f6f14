use async_trait::async_trait;
use gc_domain_engine::error::EngineError;
use gc_domain_engine::ports::{BundleQuery, BundleRepository};
use gc_domain_model::GranularCertificateBundle;
use libsql::params;
use tracing::instrument;

use crate::client::TursoClient;
use crate::errors::DbError;
use crate::mapping::{carrier_from_str, parse_date, parse_datetime, source_from_str, status_from_str};

/// Reads against the read store — the materialized view the query
/// engine and `/certificate/{id}` serve from.
pub struct BundleReadRepository {
    pub read_store: TursoClient,
}

fn row_to_bundle(row: &libsql::Row) -> Result<GranularCertificateBundle, DbError> {
    Ok(GranularCertificateBundle {
        id: row.get::<i64>(0).map_err(DbError::Query)?,
        issuance_id: row.get::<String>(1).map_err(DbError::Query)?,
        hash: row.get::<String>(2).map_err(DbError::Query)?,
        range_start: row.get::<i64>(3).map_err(DbError::Query)?,
        range_end: row.get::<i64>(4).map_err(DbError::Query)?,
        certificate_bundle_status: status_from_str(&row.get::<String>(5).map_err(DbError::Query)?)?,
        account_id: row.get::<i64>(6).map_err(DbError::Query)?,
        device_id: row.get::<i64>(7).map_err(DbError::Query)?,
        metadata_id: row.get::<Option<i64>>(8).map_err(DbError::Query)?,
        production_starting_interval: parse_datetime(&row.get::<String>(9).map_err(DbError::Query)?)?,
        production_ending_interval: parse_datetime(&row.get::<String>(10).map_err(DbError::Query)?)?,
        issuance_datestamp: parse_date(&row.get::<String>(11).map_err(DbError::Query)?)?,
        expiry_datestamp: parse_date(&row.get::<String>(12).map_err(DbError::Query)?)?,
        energy_carrier: carrier_from_str(&row.get::<String>(13).map_err(DbError::Query)?)?,
        energy_source: source_from_str(&row.get::<String>(14).map_err(DbError::Query)?)?,
        face_value: row.get::<i64>(15).map_err(DbError::Query)?,
        is_storage: row.get::<i64>(16).map_err(DbError::Query)? != 0,
        allocated_storage_record_id: row.get::<Option<i64>>(17).map_err(DbError::Query)?,
        storage_efficiency_factor: row.get::<Option<f64>>(18).map_err(DbError::Query)?,
        beneficiary: row.get::<Option<String>>(19).map_err(DbError::Query)?,
        is_deleted: row.get::<i64>(20).map_err(DbError::Query)? != 0,
        created_at: parse_datetime(&row.get::<String>(21).map_err(DbError::Query)?)?,
    })
}

const SELECT_COLUMNS: &str = r#"id, issuance_id, hash, range_start, range_end, certificate_bundle_status,
    account_id, device_id, metadata_id, production_starting_interval, production_ending_interval,
    issuance_datestamp, expiry_datestamp, energy_carrier, energy_source, face_value, is_storage,
    allocated_storage_record_id, storage_efficiency_factor, beneficiary, is_deleted, created_at"#;

#[async_trait]
impl BundleRepository for BundleReadRepository {
    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<Option<GranularCertificateBundle>, EngineError> {
        let conn = self.read_store.get_connection()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM granular_certificate_bundles WHERE id = ?1 AND is_deleted = 0"
        );
        let mut rows = conn.query(&sql, params![id]).await.map_err(DbError::Query)?;
        match rows.next().await.map_err(DbError::Query)? {
            Some(row) => Ok(Some(row_to_bundle(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<GranularCertificateBundle>, EngineError> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bundle) = self.get(*id).await? {
                results.push(bundle);
            }
        }
        Ok(results)
    }

    #[instrument(skip(self, query))]
    async fn query(&self, query: &BundleQuery) -> Result<Vec<GranularCertificateBundle>, EngineError> {
        let conn = self.read_store.get_connection()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM granular_certificate_bundles WHERE account_id = ?1 AND is_deleted = 0"
        );
        let mut rows = conn
            .query(&sql, params![query.source_account_id])
            .await
            .map_err(DbError::Query)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(DbError::Query)? {
            results.push(row_to_bundle(&row)?);
        }
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn by_issuance_id(&self, issuance_id: &str) -> Result<Vec<GranularCertificateBundle>, EngineError> {
        let conn = self.read_store.get_connection()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM granular_certificate_bundles WHERE issuance_id = ?1 AND is_deleted = 0"
        );
        let mut rows = conn
            .query(&sql, params![issuance_id.to_string()])
            .await
            .map_err(DbError::Query)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(DbError::Query)? {
            results.push(row_to_bundle(&row)?);
        }
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn max_range_end_for_device_interval(
        &self,
        device_id: i64,
        _production_starting_interval: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<i64>, EngineError> {
        let conn = self.read_store.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT MAX(range_end) FROM granular_certificate_bundles
                 WHERE device_id = ?1 AND certificate_bundle_status != 'WITHDRAWN'",
                params![device_id],
            )
            .await
            .map_err(DbError::Query)?;
        match rows.next().await.map_err(DbError::Query)? {
            Some(row) => Ok(row.get::<Option<i64>>(0).map_err(DbError::Query)?),
            None => Ok(None),
        }
    }
}
