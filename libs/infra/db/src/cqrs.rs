//! The CQRS coordinator: every mutating call stages the same entities
//! into the write store and the read store and appends matching events,
//! committing all three as one unit (spec §4.4, §5 "Ordering").
//!
//! True two-phase commit across three separate libSQL connections isn't
//! available, so ordering substitutes for it: both data-store
//! transactions are staged and flushed, then the event is appended,
//! then the three commits run write → read → event. If any step before
//! the final commits fails, every transaction that was opened is rolled
//! back and nothing is written anywhere. If the event-store commit
//! itself fails after the write and read commits already landed — the
//! one window true 2PC would close — the event is instead recorded in
//! `event_outbox` on the write connection in the same transaction as the
//! data, so a reconciliation job can replay it into the event stream
//! without losing history.

use async_trait::async_trait;
use gc_domain_engine::error::EngineError;
use gc_domain_engine::ports::{CqrsStore, StagedChange};
use gc_domain_model::{Event, EventType};
use libsql::params;
use tracing::{error, instrument, warn};

use crate::client::TursoClient;
use crate::errors::DbError;
use crate::mapping::{bundle_to_params, source_to_str};

pub struct CqrsCoordinator {
    pub write_store: TursoClient,
    pub read_store: TursoClient,
    pub event_store: TursoClient,
}

#[async_trait]
impl CqrsStore for CqrsCoordinator {
    #[instrument(skip(self, changes, events))]
    async fn commit(&self, changes: Vec<StagedChange>, events: Vec<Event>) -> Result<(), EngineError> {
        if changes.is_empty() && events.is_empty() {
            return Ok(());
        }

        let write_conn = self.write_store.get_connection()?;
        let read_conn = self.read_store.get_connection()?;
        let event_conn = self.event_store.get_connection()?;

        let write_tx = write_conn
            .transaction()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        let read_tx = read_conn
            .transaction()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        for change in &changes {
            if let Err(e) = apply_change(&write_tx, change).await {
                error!(error = %e, "write-store stage failed, rolling back");
                return Err(e.into());
            }
            if let Err(e) = apply_change(&read_tx, change).await {
                error!(error = %e, "read-store stage failed, rolling back");
                return Err(e.into());
            }
        }

        let event_tx = event_conn
            .transaction()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        for event in &events {
            if let Err(e) = append_event(&event_tx, event).await {
                error!(error = %e, "event append failed before commit, rolling back");
                return Err(e.into());
            }
        }

        write_tx
            .commit()
            .await
            .map_err(|e| DbError::Transaction(format!("write store commit failed: {e}")))?;
        read_tx
            .commit()
            .await
            .map_err(|e| DbError::Transaction(format!("read store commit failed: {e}")))?;

        if let Err(e) = event_tx.commit().await {
            warn!(error = %e, "event store commit failed after data commits landed, staging outbox");
            stage_outbox(&self.write_store, &events).await?;
            return Err(DbError::Transaction(format!(
                "event store commit failed after write/read committed: {e}"
            ))
            .into());
        }

        Ok(())
    }
}

async fn apply_change(tx: &libsql::Transaction, change: &StagedChange) -> Result<(), DbError> {
    match change {
        StagedChange::UpsertBundle(bundle) => {
            let mut values = bundle_to_params(bundle);
            if bundle.id == 0 {
                tx.execute(
                    r#"INSERT INTO granular_certificate_bundles
                        (issuance_id, hash, range_start, range_end, certificate_bundle_status,
                         account_id, device_id, metadata_id, production_starting_interval,
                         production_ending_interval, issuance_datestamp, expiry_datestamp,
                         energy_carrier, energy_source, face_value, is_storage,
                         allocated_storage_record_id, storage_efficiency_factor, beneficiary,
                         is_deleted, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                               ?16, ?17, ?18, ?19, ?20, ?21)"#,
                    values,
                )
                .await
                .map_err(DbError::Query)?;
            } else {
                values.push(libsql::Value::Integer(bundle.id));
                tx.execute(
                    r#"UPDATE granular_certificate_bundles SET
                        issuance_id=?1, hash=?2, range_start=?3, range_end=?4,
                        certificate_bundle_status=?5, account_id=?6, device_id=?7, metadata_id=?8,
                        production_starting_interval=?9, production_ending_interval=?10,
                        issuance_datestamp=?11, expiry_datestamp=?12, energy_carrier=?13,
                        energy_source=?14, face_value=?15, is_storage=?16,
                        allocated_storage_record_id=?17, storage_efficiency_factor=?18,
                        beneficiary=?19, is_deleted=?20, created_at=?21
                       WHERE id = ?22"#,
                    values,
                )
                .await
                .map_err(DbError::Query)?;
            }
            Ok(())
        }
        StagedChange::UpsertAccount(account) => {
            tx.execute(
                "INSERT INTO accounts (id, account_name, is_deleted, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET account_name=excluded.account_name, is_deleted=excluded.is_deleted",
                params![
                    account.id,
                    account.account_name.clone(),
                    account.is_deleted,
                    account.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::Query)?;
            Ok(())
        }
        StagedChange::UpsertDevice(device) => {
            tx.execute(
                r#"INSERT INTO devices
                    (id, account_id, local_device_identifier, energy_source, technology_type,
                     power_mw, energy_mwh, operational_date, is_storage, is_deleted)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                   ON CONFLICT(id) DO UPDATE SET is_deleted=excluded.is_deleted"#,
                params![
                    device.id,
                    device.account_id,
                    device.local_device_identifier.clone(),
                    source_to_str(device.energy_source).to_string(),
                    format!("{:?}", device.technology_type),
                    device.power_mw,
                    device.energy_mwh,
                    device.operational_date.to_rfc3339(),
                    device.is_storage,
                    device.is_deleted
                ],
            )
            .await
            .map_err(DbError::Query)?;
            Ok(())
        }
        StagedChange::UpsertWhitelistLink(link) => {
            tx.execute(
                r#"INSERT INTO account_whitelist_links
                    (id, source_account_id, target_account_id, is_deleted, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5)
                   ON CONFLICT(id) DO UPDATE SET is_deleted=excluded.is_deleted"#,
                params![
                    link.id,
                    link.source_account_id,
                    link.target_account_id,
                    link.is_deleted,
                    link.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::Query)?;
            Ok(())
        }
        StagedChange::UpsertAction(action) => {
            let bundle_ids_json = serde_json::to_string(&action.granular_certificate_bundle_ids)
                .map_err(|e| DbError::Mapping(e.to_string()))?;
            tx.execute(
                r#"INSERT INTO granular_certificate_actions
                    (action_type, source_account_id, actor_user_id, granular_certificate_bundle_ids,
                     certificate_quantity, certificate_bundle_percentage, beneficiary,
                     target_account_id, action_request_datetime, action_completed_datetime,
                     action_response_status, rejection_reason)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
                params![
                    format!("{:?}", action.action_type),
                    action.source_account_id,
                    action.actor_user_id,
                    bundle_ids_json,
                    action.certificate_quantity,
                    action.certificate_bundle_percentage,
                    action.beneficiary.clone(),
                    action.target_account_id,
                    action.action_request_datetime.to_rfc3339(),
                    action.action_completed_datetime.map(|t| t.to_rfc3339()),
                    format!("{:?}", action.action_response_status),
                    action.rejection_reason.clone()
                ],
            )
            .await
            .map_err(DbError::Query)?;
            Ok(())
        }
    }
}

async fn append_event(tx: &libsql::Transaction, event: &Event) -> Result<(), DbError> {
    let event_type = match event.event_type {
        EventType::Create => "CREATE",
        EventType::Update => "UPDATE",
        EventType::Delete => "DELETE",
    };
    tx.execute(
        r#"INSERT INTO events
            (entity_id, entity_name, event_type, attributes_before, attributes_after, timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            event.entity_id,
            event.entity_name.clone(),
            event_type,
            event.attributes_before.as_ref().map(|v| v.to_string()),
            event.attributes_after.as_ref().map(|v| v.to_string()),
            event.timestamp.to_rfc3339()
        ],
    )
    .await
    .map_err(DbError::Query)?;
    Ok(())
}

async fn stage_outbox(write_store: &TursoClient, events: &[Event]) -> Result<(), DbError> {
    let conn = write_store.get_connection()?;
    for event in events {
        let payload = serde_json::to_string(event).map_err(|e| DbError::Mapping(e.to_string()))?;
        conn.execute(
            "INSERT INTO event_outbox (payload) VALUES (?1)",
            params![payload],
        )
        .await
        .map_err(DbError::Query)?;
    }
    Ok(())
}
