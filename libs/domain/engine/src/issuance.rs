use chrono::{DateTime, Utc};
use gc_domain_model::{CertificateStatus, EnergyCarrierType, GranularCertificateBundle};

use crate::error::EngineError;
use crate::ports::{AccountRepository, BundleRepository, CqrsStore, MeterDataClient, StagedChange};
use crate::validator::BundleValidator;

/// Meter client → mapping → validation → batch commit, per device and
/// interval (§4.8).
pub struct IssuancePipeline<'a> {
    pub bundles: &'a dyn BundleRepository,
    pub accounts: &'a dyn AccountRepository,
    pub meter_client: &'a dyn MeterDataClient,
    pub store: &'a dyn CqrsStore,
    pub validator: BundleValidator,
    pub certificate_expiry_years: i32,
}

impl<'a> IssuancePipeline<'a> {
    pub async fn issue_for_device(
        &self,
        device_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<GranularCertificateBundle>, EngineError> {
        if to <= from {
            return Err(EngineError::Validation("INVALID_TIMEZONE: to must be after from".into()));
        }

        let device = self
            .accounts
            .get_device(device_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("device not found".into()))?;

        let last_issued_end = self
            .bundles
            .query(&crate::ports::BundleQuery {
                source_account_id: device.account_id,
                device_id: Some(device_id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|b| b.certificate_bundle_status != CertificateStatus::Withdrawn)
            .map(|b| b.production_ending_interval)
            .max();

        if let Some(last_end) = last_issued_end {
            if last_end >= to {
                return Ok(Vec::new());
            }
        }
        let effective_from = last_issued_end.map(|end| end.max(from)).unwrap_or(from);

        let readings = self
            .meter_client
            .readings_since(device_id, effective_from)
            .await?;

        let mut max_range_end = self
            .bundles
            .max_range_end_for_device_interval(device_id, effective_from)
            .await?;

        let mut candidates = Vec::new();
        let mut changes = Vec::new();
        let mut events = Vec::new();

        for reading in readings
            .into_iter()
            .filter(|r| r.production_starting_interval >= effective_from && r.production_ending_interval <= to)
        {
            let range_start = max_range_end.map(|end| end + 1).unwrap_or(0);
            let range_end = range_start + reading.metered_energy_wh.max(1) - 1;

            let issuance_id = gc_core_ids::create_issuance_id(device_id, reading.production_starting_interval);

            let mut candidate = GranularCertificateBundle {
                id: 0,
                issuance_id,
                hash: String::new(),
                range_start,
                range_end,
                certificate_bundle_status: CertificateStatus::Active,
                account_id: device.account_id,
                device_id,
                metadata_id: None,
                production_starting_interval: reading.production_starting_interval,
                production_ending_interval: reading.production_ending_interval,
                issuance_datestamp: Utc::now().date_naive(),
                expiry_datestamp: Utc::now()
                    .date_naive()
                    .checked_add_months(chrono::Months::new((self.certificate_expiry_years * 12) as u32))
                    .unwrap_or_else(|| Utc::now().date_naive()),
                energy_carrier: EnergyCarrierType::Electricity,
                energy_source: device.energy_source,
                face_value: 1,
                is_storage: device.is_storage,
                allocated_storage_record_id: None,
                storage_efficiency_factor: None,
                beneficiary: None,
                is_deleted: false,
                created_at: Utc::now(),
            };

            self.validator
                .validate_new_bundle(&candidate, &device, max_range_end, true)?;

            candidate.hash = gc_core_ids::bundle_hash(&candidate.canonical_value(), "");

            events.push(gc_domain_model::Event {
                id: 0,
                entity_id: 0,
                entity_name: "granular_certificate_bundle".into(),
                event_type: gc_domain_model::EventType::Create,
                attributes_before: None,
                attributes_after: Some(candidate.canonical_value()),
                timestamp: Utc::now(),
            });

            max_range_end = Some(range_end);
            changes.push(StagedChange::UpsertBundle(Box::new(candidate.clone())));
            candidates.push(candidate);
        }

        if !changes.is_empty() {
            self.store.commit(changes, events).await?;
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_domain_model::{EnergySourceType, TechnologyType};

    use crate::test_support::{FakeAccountRepository, FakeMeterDataClient, InMemoryStore};

    const DEVICE: i64 = 1;
    const ACCOUNT: i64 = 1;

    fn device() -> gc_domain_model::Device {
        gc_domain_model::Device {
            id: DEVICE,
            account_id: ACCOUNT,
            local_device_identifier: "D1".into(),
            energy_source: EnergySourceType::SolarPv,
            technology_type: TechnologyType::SolarPv,
            power_mw: 1.0,
            energy_mwh: None,
            operational_date: Utc::now(),
            is_storage: false,
            is_deleted: false,
        }
    }

    fn reading(start: DateTime<Utc>, end: DateTime<Utc>, wh: i64) -> crate::ports::MeteredReading {
        crate::ports::MeteredReading {
            device_id: DEVICE,
            production_starting_interval: start,
            production_ending_interval: end,
            metered_energy_wh: wh,
        }
    }

    fn pipeline<'a>(
        bundles: &'a InMemoryStore,
        accounts: &'a FakeAccountRepository,
        meter_client: &'a FakeMeterDataClient,
    ) -> IssuancePipeline<'a> {
        IssuancePipeline {
            bundles,
            accounts,
            meter_client,
            store: bundles,
            validator: crate::validator::BundleValidator::default(),
            certificate_expiry_years: 2,
        }
    }

    #[tokio::test]
    async fn rejects_an_inverted_range() {
        let bundles = InMemoryStore::new();
        let accounts = FakeAccountRepository::new().with_device(device());
        let meter_client = FakeMeterDataClient::new();
        let now = Utc::now();

        let err = pipeline(&bundles, &accounts, &meter_client)
            .issue_for_device(DEVICE, now, now - chrono::Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_an_unknown_device() {
        let bundles = InMemoryStore::new();
        let accounts = FakeAccountRepository::new();
        let meter_client = FakeMeterDataClient::new();
        let now = Utc::now();

        let err = pipeline(&bundles, &accounts, &meter_client)
            .issue_for_device(DEVICE, now, now + chrono::Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn issues_one_bundle_per_reading_in_the_requested_window() {
        let bundles = InMemoryStore::new();
        let accounts = FakeAccountRepository::new().with_device(device());
        let from = Utc::now() - chrono::Duration::hours(2);
        let to = Utc::now();
        let meter_client = FakeMeterDataClient::new().seed(
            DEVICE,
            vec![reading(from, from + chrono::Duration::hours(1), 500)],
        );

        let issued = pipeline(&bundles, &accounts, &meter_client)
            .issue_for_device(DEVICE, from, to)
            .await
            .unwrap();
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].range_start, 0);
        assert_eq!(issued[0].range_end, 499);
        assert_eq!(bundles.events().len(), 1);
        assert_eq!(bundles.all_bundles().len(), 1);
    }

    #[tokio::test]
    async fn does_not_reissue_past_the_last_issued_end() {
        let bundles = InMemoryStore::new();
        let accounts = FakeAccountRepository::new().with_device(device());
        let from = Utc::now() - chrono::Duration::hours(2);
        let to = Utc::now();
        bundles.seed_bundle(GranularCertificateBundle {
            id: 0,
            issuance_id: "seed".into(),
            hash: "seed".into(),
            range_start: 0,
            range_end: 1,
            certificate_bundle_status: CertificateStatus::Active,
            account_id: ACCOUNT,
            device_id: DEVICE,
            metadata_id: None,
            production_starting_interval: from,
            production_ending_interval: to,
            issuance_datestamp: Utc::now().date_naive(),
            expiry_datestamp: Utc::now().date_naive(),
            energy_carrier: EnergyCarrierType::Electricity,
            energy_source: EnergySourceType::SolarPv,
            face_value: 1,
            is_storage: false,
            allocated_storage_record_id: None,
            storage_efficiency_factor: None,
            beneficiary: None,
            is_deleted: false,
            created_at: Utc::now(),
        });

        let meter_client = FakeMeterDataClient::new().seed(
            DEVICE,
            vec![reading(from, from + chrono::Duration::hours(1), 500)],
        );
        let issued = pipeline(&bundles, &accounts, &meter_client)
            .issue_for_device(DEVICE, from, to)
            .await
            .unwrap();
        assert!(issued.is_empty());
    }
}
