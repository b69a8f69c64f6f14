//! Idempotent schema application, run once per connected store at
//! startup. Tables are created with `IF NOT EXISTS`; later columns are
//! added with tolerant `ALTER TABLE` statements that ignore a
//! "duplicate column name" error, so the same schema file can run
//! against an already-migrated database.

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

const BASE_TABLES: &[(&str, &str)] = &[
    (
        "accounts",
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_name TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    ),
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    ),
    (
        "account_user_links",
        r#"
        CREATE TABLE IF NOT EXISTS account_user_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            role TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );
    "#,
    ),
    (
        "api_keys",
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            key_hash TEXT NOT NULL,
            description TEXT,
            expiry_datetime TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );
    "#,
    ),
    (
        "devices",
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            local_device_identifier TEXT NOT NULL,
            energy_source TEXT NOT NULL,
            technology_type TEXT NOT NULL,
            power_mw REAL NOT NULL,
            energy_mwh REAL,
            operational_date TEXT NOT NULL,
            is_storage INTEGER NOT NULL DEFAULT 0,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );
    "#,
    ),
    (
        "issuance_metadata",
        r#"
        CREATE TABLE IF NOT EXISTS issuance_metadata (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            country_of_issuance TEXT NOT NULL,
            connection_registration_identifier TEXT NOT NULL,
            issuing_body TEXT NOT NULL,
            legal_status TEXT,
            issuance_purpose TEXT,
            support_received TEXT,
            quality_scheme_reference TEXT,
            dissemination_level TEXT
        );
    "#,
    ),
    (
        "granular_certificate_bundles",
        r#"
        CREATE TABLE IF NOT EXISTS granular_certificate_bundles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            issuance_id TEXT NOT NULL,
            hash TEXT NOT NULL,
            range_start INTEGER NOT NULL,
            range_end INTEGER NOT NULL,
            certificate_bundle_status TEXT NOT NULL,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            device_id INTEGER NOT NULL REFERENCES devices(id),
            metadata_id INTEGER REFERENCES issuance_metadata(id),
            production_starting_interval TEXT NOT NULL,
            production_ending_interval TEXT NOT NULL,
            issuance_datestamp TEXT NOT NULL,
            expiry_datestamp TEXT NOT NULL,
            energy_carrier TEXT NOT NULL,
            energy_source TEXT NOT NULL,
            face_value INTEGER NOT NULL,
            is_storage INTEGER NOT NULL DEFAULT 0,
            allocated_storage_record_id INTEGER,
            storage_efficiency_factor REAL,
            beneficiary TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    ),
    (
        "account_whitelist_links",
        r#"
        CREATE TABLE IF NOT EXISTS account_whitelist_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_account_id INTEGER NOT NULL REFERENCES accounts(id),
            target_account_id INTEGER NOT NULL REFERENCES accounts(id),
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    ),
    (
        "storage_records",
        r#"
        CREATE TABLE IF NOT EXISTS storage_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id INTEGER NOT NULL REFERENCES devices(id),
            is_charging INTEGER NOT NULL,
            flow_start_datetime TEXT NOT NULL,
            flow_end_datetime TEXT NOT NULL,
            flow_energy REAL NOT NULL,
            validator_id TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );
    "#,
    ),
    (
        "allocated_storage_records",
        r#"
        CREATE TABLE IF NOT EXISTS allocated_storage_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scr_id INTEGER NOT NULL REFERENCES storage_records(id),
            sdr_id INTEGER NOT NULL REFERENCES storage_records(id),
            gc_allocation_id INTEGER REFERENCES granular_certificate_bundles(id),
            sdgc_allocation_id INTEGER REFERENCES granular_certificate_bundles(id),
            sdr_proportion REAL NOT NULL,
            storage_efficiency_factor REAL NOT NULL,
            scr_allocation_methodology TEXT NOT NULL,
            efficiency_interval_start TEXT NOT NULL,
            efficiency_interval_end TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );
    "#,
    ),
    (
        "granular_certificate_actions",
        r#"
        CREATE TABLE IF NOT EXISTS granular_certificate_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action_type TEXT NOT NULL,
            source_account_id INTEGER NOT NULL,
            actor_user_id INTEGER NOT NULL,
            granular_certificate_bundle_ids TEXT NOT NULL,
            certificate_quantity INTEGER,
            certificate_bundle_percentage REAL,
            beneficiary TEXT,
            target_account_id INTEGER,
            action_request_datetime TEXT NOT NULL,
            action_completed_datetime TEXT,
            action_response_status TEXT NOT NULL,
            rejection_reason TEXT
        );
    "#,
    ),
];

/// The event log is append-only and, per design, never loses a row even
/// if the write/read commit it was paired with later fails — the outbox
/// table is the reconciliation record for that case.
const EVENT_TABLES: &[(&str, &str)] = &[
    (
        "events",
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL,
            entity_name TEXT NOT NULL,
            event_type TEXT NOT NULL,
            attributes_before TEXT,
            attributes_after TEXT,
            timestamp TEXT NOT NULL
        );
    "#,
    ),
    (
        "event_outbox",
        r#"
        CREATE TABLE IF NOT EXISTS event_outbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            reconciled_at TEXT
        );
    "#,
    ),
];

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_bundles_device",
        "CREATE INDEX IF NOT EXISTS idx_bundles_device ON granular_certificate_bundles(device_id, range_start);",
    ),
    (
        "idx_bundles_account",
        "CREATE INDEX IF NOT EXISTS idx_bundles_account ON granular_certificate_bundles(account_id, is_deleted);",
    ),
    (
        "idx_bundles_issuance",
        "CREATE INDEX IF NOT EXISTS idx_bundles_issuance ON granular_certificate_bundles(issuance_id);",
    ),
    (
        "idx_devices_identifier",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_devices_identifier ON devices(local_device_identifier);",
    ),
    (
        "idx_whitelist_edge",
        "CREATE INDEX IF NOT EXISTS idx_whitelist_edge ON account_whitelist_links(source_account_id, target_account_id);",
    ),
    (
        "idx_storage_records_validator",
        "CREATE INDEX IF NOT EXISTS idx_storage_records_validator ON storage_records(validator_id);",
    ),
    (
        "idx_events_entity",
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_name, entity_id);",
    ),
];

#[instrument(skip(connection))]
pub async fn apply_write_read_schema(connection: &Connection) -> Result<()> {
    info!("applying write/read store schema");
    for (name, sql) in BASE_TABLES {
        debug!(table = name, "creating table");
        connection
            .execute(sql, ())
            .await
            .with_context(|| format!("failed to create table {name}"))?;
    }
    for (name, sql) in INDEXES {
        connection
            .execute(sql, ())
            .await
            .with_context(|| format!("failed to create index {name}"))?;
    }
    Ok(())
}

#[instrument(skip(connection))]
pub async fn apply_event_schema(connection: &Connection) -> Result<()> {
    info!("applying event store schema");
    for (name, sql) in EVENT_TABLES {
        connection
            .execute(sql, ())
            .await
            .with_context(|| format!("failed to create table {name}"))?;
    }
    Ok(())
}

/// Applies a best-effort `ALTER TABLE ADD COLUMN`, tolerating the
/// "duplicate column name" error libsql returns when it has already run.
#[allow(dead_code)]
async fn add_column_if_missing(db: &Connection, identifier: &str, sql: &str) -> Result<()> {
    match db.execute(sql, ()).await {
        Ok(_) => info!(column = identifier, "added column"),
        Err(e) => {
            let message = e.to_string();
            if message.contains("duplicate column name") {
                debug!(column = identifier, "already present");
            } else {
                warn!(column = identifier, error = %message, "column migration incomplete");
            }
        }
    }
    Ok(())
}
