use async_trait::async_trait;
use gc_domain_engine::error::EngineError;
use gc_domain_engine::ports::AccountRepository;
use gc_domain_model::{Account, AccountUserLink, Device, IssuanceMetaData, Role, TechnologyType};
use libsql::params;
use tracing::instrument;

use crate::client::TursoClient;
use crate::errors::DbError;
use crate::mapping::{parse_datetime, source_from_str};

pub struct AccountReadRepository {
    pub read_store: TursoClient,
}

fn role_from_str(value: &str) -> Result<Role, DbError> {
    use Role::*;
    Ok(match value {
        "storage_validator" => StorageValidator,
        "audit_user" => AuditUser,
        "trading_user" => TradingUser,
        "production_user" => ProductionUser,
        "admin" => Admin,
        other => return Err(DbError::Mapping(format!("unknown role {other}"))),
    })
}

fn technology_from_str(value: &str) -> Result<TechnologyType, DbError> {
    use TechnologyType::*;
    Ok(match value {
        "SolarPv" => SolarPv,
        "WindTurbine" => WindTurbine,
        "Hydro" => Hydro,
        "BatteryStorage" => BatteryStorage,
        "OtherStorage" => OtherStorage,
        "Chp" => Chp,
        "Other" => Other,
        other => return Err(DbError::Mapping(format!("unknown technology_type {other}"))),
    })
}

#[async_trait]
impl AccountRepository for AccountReadRepository {
    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<Option<Account>, EngineError> {
        let conn = self.read_store.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT id, account_name, is_deleted, created_at FROM accounts WHERE id = ?1 AND is_deleted = 0",
                params![id],
            )
            .await
            .map_err(DbError::Query)?;
        match rows.next().await.map_err(DbError::Query)? {
            Some(row) => Ok(Some(Account {
                id: row.get::<i64>(0).map_err(DbError::Query)?,
                account_name: row.get::<String>(1).map_err(DbError::Query)?,
                is_deleted: row.get::<i64>(2).map_err(DbError::Query)? != 0,
                created_at: parse_datetime(&row.get::<String>(3).map_err(DbError::Query)?)?,
            })),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn get_device(&self, id: i64) -> Result<Option<Device>, EngineError> {
        let conn = self.read_store.get_connection()?;
        let mut rows = conn
            .query(
                r#"SELECT id, account_id, local_device_identifier, energy_source, technology_type,
                    power_mw, energy_mwh, operational_date, is_storage, is_deleted
                   FROM devices WHERE id = ?1 AND is_deleted = 0"#,
                params![id],
            )
            .await
            .map_err(DbError::Query)?;
        match rows.next().await.map_err(DbError::Query)? {
            Some(row) => Ok(Some(Device {
                id: row.get::<i64>(0).map_err(DbError::Query)?,
                account_id: row.get::<i64>(1).map_err(DbError::Query)?,
                local_device_identifier: row.get::<String>(2).map_err(DbError::Query)?,
                energy_source: source_from_str(&row.get::<String>(3).map_err(DbError::Query)?)?,
                technology_type: technology_from_str(&row.get::<String>(4).map_err(DbError::Query)?)?,
                power_mw: row.get::<f64>(5).map_err(DbError::Query)?,
                energy_mwh: row.get::<Option<f64>>(6).map_err(DbError::Query)?,
                operational_date: parse_datetime(&row.get::<String>(7).map_err(DbError::Query)?)?,
                is_storage: row.get::<i64>(8).map_err(DbError::Query)? != 0,
                is_deleted: row.get::<i64>(9).map_err(DbError::Query)? != 0,
            })),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn get_metadata(&self, id: i64) -> Result<Option<IssuanceMetaData>, EngineError> {
        let conn = self.read_store.get_connection()?;
        let mut rows = conn
            .query(
                r#"SELECT id, country_of_issuance, connection_registration_identifier, issuing_body,
                    legal_status, issuance_purpose, support_received, quality_scheme_reference,
                    dissemination_level
                   FROM issuance_metadata WHERE id = ?1"#,
                params![id],
            )
            .await
            .map_err(DbError::Query)?;
        match rows.next().await.map_err(DbError::Query)? {
            Some(row) => Ok(Some(IssuanceMetaData {
                id: row.get::<i64>(0).map_err(DbError::Query)?,
                country_of_issuance: row.get::<String>(1).map_err(DbError::Query)?,
                connection_registration_identifier: row.get::<String>(2).map_err(DbError::Query)?,
                issuing_body: row.get::<String>(3).map_err(DbError::Query)?,
                legal_status: row.get::<Option<String>>(4).map_err(DbError::Query)?,
                issuance_purpose: row.get::<Option<String>>(5).map_err(DbError::Query)?,
                support_received: row.get::<Option<String>>(6).map_err(DbError::Query)?,
                quality_scheme_reference: row.get::<Option<String>>(7).map_err(DbError::Query)?,
                dissemination_level: row.get::<Option<String>>(8).map_err(DbError::Query)?,
            })),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn role_for_user_on_account(&self, user_id: i64, account_id: i64) -> Result<Option<Role>, EngineError> {
        let conn = self.read_store.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT role FROM account_user_links
                 WHERE user_id = ?1 AND account_id = ?2 AND is_deleted = 0",
                params![user_id, account_id],
            )
            .await
            .map_err(DbError::Query)?;
        match rows.next().await.map_err(DbError::Query)? {
            Some(row) => Ok(Some(role_from_str(&row.get::<String>(0).map_err(DbError::Query)?)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn links_for_account(&self, account_id: i64) -> Result<Vec<AccountUserLink>, EngineError> {
        let conn = self.read_store.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT id, account_id, user_id, role, is_deleted FROM account_user_links
                 WHERE account_id = ?1 AND is_deleted = 0",
                params![account_id],
            )
            .await
            .map_err(DbError::Query)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(DbError::Query)? {
            results.push(AccountUserLink {
                id: row.get::<i64>(0).map_err(DbError::Query)?,
                account_id: row.get::<i64>(1).map_err(DbError::Query)?,
                user_id: row.get::<i64>(2).map_err(DbError::Query)?,
                role: role_from_str(&row.get::<String>(3).map_err(DbError::Query)?)?,
                is_deleted: row.get::<i64>(4).map_err(DbError::Query)? != 0,
            });
        }
        Ok(results)
    }
}
