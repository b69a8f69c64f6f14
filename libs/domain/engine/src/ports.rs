//! Traits the storage and metering infrastructure implement. Kept here,
//! not in `gc-infra-db`, so the engine crate can be tested against fakes
//! without depending on libsql at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gc_domain_model::{
    Account, AccountUserLink, AccountWhitelistLink, Device, Event, GranularCertificateAction,
    GranularCertificateBundle, IssuanceMetaData, Role,
};

use crate::error::EngineError;

/// One already-validated write, ready to be committed atomically across
/// the write store, the read store, and the event log.
#[derive(Debug, Clone)]
pub enum StagedChange {
    UpsertBundle(Box<GranularCertificateBundle>),
    UpsertAccount(Box<Account>),
    UpsertDevice(Box<Device>),
    UpsertWhitelistLink(Box<AccountWhitelistLink>),
    UpsertAction(Box<GranularCertificateAction>),
}

/// The CQRS coordinator's contract: stage a batch of writes plus the
/// event(s) they imply, and commit all three stores as one unit.
#[async_trait]
pub trait CqrsStore: Send + Sync {
    async fn commit(
        &self,
        changes: Vec<StagedChange>,
        events: Vec<Event>,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct BundleQuery {
    pub source_account_id: i64,
    pub issuance_ids: Vec<String>,
    pub production_starting_after: Option<DateTime<Utc>>,
    pub production_starting_before: Option<DateTime<Utc>>,
    pub device_id: Option<i64>,
    pub energy_source: Option<gc_domain_model::EnergySourceType>,
    pub certificate_bundle_status: Option<gc_domain_model::CertificateStatus>,
}

#[async_trait]
pub trait BundleRepository: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<GranularCertificateBundle>, EngineError>;
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<GranularCertificateBundle>, EngineError>;
    async fn query(
        &self,
        query: &BundleQuery,
    ) -> Result<Vec<GranularCertificateBundle>, EngineError>;
    async fn by_issuance_id(
        &self,
        issuance_id: &str,
    ) -> Result<Vec<GranularCertificateBundle>, EngineError>;
    async fn max_range_end_for_device_interval(
        &self,
        device_id: i64,
        production_starting_interval: DateTime<Utc>,
    ) -> Result<Option<i64>, EngineError>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Account>, EngineError>;
    async fn get_device(&self, id: i64) -> Result<Option<Device>, EngineError>;
    async fn get_metadata(&self, id: i64) -> Result<Option<IssuanceMetaData>, EngineError>;
    async fn role_for_user_on_account(
        &self,
        user_id: i64,
        account_id: i64,
    ) -> Result<Option<Role>, EngineError>;
    async fn links_for_account(&self, account_id: i64) -> Result<Vec<AccountUserLink>, EngineError>;
}

#[async_trait]
pub trait WhitelistRepository: Send + Sync {
    async fn is_admitted(
        &self,
        source_account_id: i64,
        target_account_id: i64,
    ) -> Result<bool, EngineError>;
}

/// An external meter data source (Elexon-shaped). Out of the
/// implementation's scope to define the wire protocol; this crate only
/// needs the shape metered readings arrive in.
#[derive(Debug, Clone)]
pub struct MeteredReading {
    pub device_id: i64,
    pub production_starting_interval: DateTime<Utc>,
    pub production_ending_interval: DateTime<Utc>,
    pub metered_energy_wh: i64,
}

#[async_trait]
pub trait MeterDataClient: Send + Sync {
    async fn readings_since(
        &self,
        device_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<MeteredReading>, EngineError>;
}
