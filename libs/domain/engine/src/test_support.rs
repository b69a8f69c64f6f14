//! In-memory fakes for the `ports` traits, shared by the processor test
//! modules so each one isn't rebuilding its own bundle/account/whitelist
//! store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gc_domain_model::{Account, AccountUserLink, Device, Event, GranularCertificateAction, GranularCertificateBundle, IssuanceMetaData, Role};

use crate::error::EngineError;
use crate::ports::{
    AccountRepository, BundleQuery, BundleRepository, CqrsStore, MeterDataClient, MeteredReading,
    StagedChange, WhitelistRepository,
};

/// Backs both `BundleRepository` and `CqrsStore`: committing an
/// `UpsertBundle` change assigns a real id (when the staged bundle's id
/// is still 0) and writes it back, so a test can observe the effect of a
/// commit through the same handle it queries with.
#[derive(Default)]
pub struct InMemoryStore {
    bundles: Mutex<HashMap<i64, GranularCertificateBundle>>,
    actions: Mutex<Vec<GranularCertificateAction>>,
    events: Mutex<Vec<Event>>,
    next_bundle_id: Mutex<i64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_bundle(&self, mut bundle: GranularCertificateBundle) -> i64 {
        let mut bundles = self.bundles.lock().unwrap();
        let mut next = self.next_bundle_id.lock().unwrap();
        *next += 1;
        let id = if bundle.id != 0 { bundle.id } else { *next };
        *next = (*next).max(id);
        bundle.id = id;
        bundles.insert(id, bundle);
        id
    }

    pub fn bundle(&self, id: i64) -> Option<GranularCertificateBundle> {
        self.bundles.lock().unwrap().get(&id).cloned()
    }

    pub fn all_bundles(&self) -> Vec<GranularCertificateBundle> {
        self.bundles.lock().unwrap().values().cloned().collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<GranularCertificateAction> {
        self.actions.lock().unwrap().clone()
    }
}

#[async_trait]
impl CqrsStore for InMemoryStore {
    async fn commit(&self, changes: Vec<StagedChange>, events: Vec<Event>) -> Result<(), EngineError> {
        for change in changes {
            match change {
                StagedChange::UpsertBundle(bundle) => {
                    self.seed_bundle(*bundle);
                }
                StagedChange::UpsertAction(action) => {
                    self.actions.lock().unwrap().push(*action);
                }
                StagedChange::UpsertAccount(_) | StagedChange::UpsertDevice(_) | StagedChange::UpsertWhitelistLink(_) => {}
            }
        }
        self.events.lock().unwrap().extend(events);
        Ok(())
    }
}

#[async_trait]
impl BundleRepository for InMemoryStore {
    async fn get(&self, id: i64) -> Result<Option<GranularCertificateBundle>, EngineError> {
        Ok(self.bundle(id))
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<GranularCertificateBundle>, EngineError> {
        let bundles = self.bundles.lock().unwrap();
        Ok(ids.iter().filter_map(|id| bundles.get(id).cloned()).collect())
    }

    async fn query(&self, query: &BundleQuery) -> Result<Vec<GranularCertificateBundle>, EngineError> {
        // Mirrors `BundleReadRepository::query`: account_id is the only
        // SQL-level filter, the rest run in memory at the call site.
        Ok(self
            .all_bundles()
            .into_iter()
            .filter(|b| b.account_id == query.source_account_id)
            .collect())
    }

    async fn by_issuance_id(&self, issuance_id: &str) -> Result<Vec<GranularCertificateBundle>, EngineError> {
        Ok(self
            .all_bundles()
            .into_iter()
            .filter(|b| b.issuance_id == issuance_id)
            .collect())
    }

    async fn max_range_end_for_device_interval(
        &self,
        device_id: i64,
        _production_starting_interval: DateTime<Utc>,
    ) -> Result<Option<i64>, EngineError> {
        Ok(self
            .all_bundles()
            .into_iter()
            .filter(|b| b.device_id == device_id)
            .filter(|b| b.certificate_bundle_status != gc_domain_model::CertificateStatus::Withdrawn)
            .map(|b| b.range_end)
            .max())
    }
}

#[derive(Default)]
pub struct FakeAccountRepository {
    pub accounts: Mutex<HashMap<i64, Account>>,
    pub devices: Mutex<HashMap<i64, Device>>,
    pub roles: Mutex<HashMap<(i64, i64), Role>>,
}

impl FakeAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, account: Account) -> Self {
        self.accounts.lock().unwrap().insert(account.id, account);
        self
    }

    pub fn with_device(self, device: Device) -> Self {
        self.devices.lock().unwrap().insert(device.id, device);
        self
    }

    pub fn with_role(self, user_id: i64, account_id: i64, role: Role) -> Self {
        self.roles.lock().unwrap().insert((user_id, account_id), role);
        self
    }
}

#[async_trait]
impl AccountRepository for FakeAccountRepository {
    async fn get(&self, id: i64) -> Result<Option<Account>, EngineError> {
        Ok(self.accounts.lock().unwrap().get(&id).cloned())
    }

    async fn get_device(&self, id: i64) -> Result<Option<Device>, EngineError> {
        Ok(self.devices.lock().unwrap().get(&id).cloned())
    }

    async fn get_metadata(&self, _id: i64) -> Result<Option<IssuanceMetaData>, EngineError> {
        Ok(None)
    }

    async fn role_for_user_on_account(&self, user_id: i64, account_id: i64) -> Result<Option<Role>, EngineError> {
        Ok(self.roles.lock().unwrap().get(&(user_id, account_id)).copied())
    }

    async fn links_for_account(&self, _account_id: i64) -> Result<Vec<AccountUserLink>, EngineError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct FakeWhitelistRepository {
    pub admitted: Mutex<Vec<(i64, i64)>>,
}

impl FakeWhitelistRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(self, source: i64, target: i64) -> Self {
        self.admitted.lock().unwrap().push((source, target));
        self
    }
}

#[async_trait]
impl WhitelistRepository for FakeWhitelistRepository {
    async fn is_admitted(&self, source_account_id: i64, target_account_id: i64) -> Result<bool, EngineError> {
        Ok(self
            .admitted
            .lock()
            .unwrap()
            .contains(&(source_account_id, target_account_id)))
    }
}

#[derive(Default)]
pub struct FakeMeterDataClient {
    pub readings: Mutex<HashMap<i64, Vec<MeteredReading>>>,
}

impl FakeMeterDataClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(self, device_id: i64, readings: Vec<MeteredReading>) -> Self {
        self.readings.lock().unwrap().insert(device_id, readings);
        self
    }
}

#[async_trait]
impl MeterDataClient for FakeMeterDataClient {
    async fn readings_since(&self, device_id: i64, since: DateTime<Utc>) -> Result<Vec<MeteredReading>, EngineError> {
        Ok(self
            .readings
            .lock()
            .unwrap()
            .get(&device_id)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| r.production_starting_interval >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
