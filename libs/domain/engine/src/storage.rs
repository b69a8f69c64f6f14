use chrono::Utc;
use gc_domain_model::{CertificateStatus, EnergyCarrierType, GranularCertificateBundle, StorageRecord};

use crate::error::EngineError;
use crate::ports::{BundleRepository, CqrsStore, StagedChange};

/// One submitted allocation row, referencing storage records by
/// validator id rather than internal primary key (§4.9).
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub scr_validator_id: String,
    pub sdr_validator_id: String,
    pub gc_allocation_id: Option<i64>,
    pub sdr_proportion: f64,
    pub storage_efficiency_factor: f64,
    pub scr_allocation_methodology: String,
    pub storage_device_id: i64,
}

pub struct StorageAllocator<'a> {
    pub bundles: &'a dyn BundleRepository,
    pub store: &'a dyn CqrsStore,
}

impl<'a> StorageAllocator<'a> {
    /// Validates one allocation row against already-resolved SCR/SDR
    /// records and the optional cancelled production GC they reference.
    pub fn validate_allocation(
        &self,
        scr: &StorageRecord,
        sdr: &StorageRecord,
        cancelled_gc: Option<&GranularCertificateBundle>,
        request: &AllocationRequest,
    ) -> Result<(), EngineError> {
        if !(request.sdr_proportion > 0.0 && request.sdr_proportion <= 1.0) {
            return Err(EngineError::Validation(
                "sdr_proportion must be in (0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&request.storage_efficiency_factor) {
            return Err(EngineError::Validation(
                "storage_efficiency_factor must be in [0, 1]".into(),
            ));
        }
        if sdr.is_charging || !scr.is_charging {
            return Err(EngineError::Validation(
                "scr must be charging and sdr must be discharging".into(),
            ));
        }
        if sdr.flow_start_datetime < scr.flow_end_datetime {
            return Err(EngineError::State(
                "discharge interval must start after the charge interval ends".into(),
            ));
        }
        if let Some(gc) = cancelled_gc {
            if gc.certificate_bundle_status != CertificateStatus::Cancelled {
                return Err(EngineError::State(
                    "gc_allocation_id must reference a CANCELLED bundle".into(),
                ));
            }
            let expected_quantity = (request.sdr_proportion * scr.flow_energy) as i64;
            if gc.bundle_quantity() != expected_quantity {
                return Err(EngineError::Integrity(
                    "bundle_quantity disagrees with sdr_proportion * scr.flow_energy".into(),
                ));
            }
            if gc.production_starting_interval < scr.flow_start_datetime
                || gc.production_ending_interval > scr.flow_end_datetime
            {
                return Err(EngineError::Integrity(
                    "cancelled gc production interval falls outside the charge interval".into(),
                ));
            }
        }
        Ok(())
    }

    /// Mints the SD-GC from a validated allocation: clones the cancelled
    /// GC's attributes, marks it storage-backed, and continues the
    /// storage device's own monotonic range counter.
    pub async fn issue_sdgc(
        &self,
        cancelled_gc: &GranularCertificateBundle,
        sdr: &StorageRecord,
        allocated_storage_record_id: i64,
        storage_efficiency_factor: f64,
        storage_device_id: i64,
    ) -> Result<GranularCertificateBundle, EngineError> {
        let max_range_end = self
            .bundles
            .max_range_end_for_device_interval(storage_device_id, sdr.flow_start_datetime)
            .await?;
        let range_start = max_range_end.map(|end| end + 1).unwrap_or(0);
        let range_end = range_start + cancelled_gc.bundle_quantity() - 1;

        let issuance_id = gc_core_ids::create_issuance_id(storage_device_id, sdr.flow_start_datetime);

        let mut sdgc = cancelled_gc.clone();
        sdgc.id = 0;
        sdgc.issuance_id = issuance_id;
        sdgc.hash = String::new();
        sdgc.range_start = range_start;
        sdgc.range_end = range_end;
        sdgc.certificate_bundle_status = CertificateStatus::Active;
        sdgc.device_id = storage_device_id;
        sdgc.production_starting_interval = sdr.flow_start_datetime;
        sdgc.production_ending_interval = sdr.flow_end_datetime;
        sdgc.energy_carrier = EnergyCarrierType::Electricity;
        sdgc.is_storage = true;
        sdgc.allocated_storage_record_id = Some(allocated_storage_record_id);
        sdgc.storage_efficiency_factor = Some(storage_efficiency_factor);
        sdgc.beneficiary = None;
        sdgc.is_deleted = false;
        sdgc.created_at = Utc::now();
        sdgc.hash = gc_core_ids::bundle_hash(&sdgc.canonical_value(), &cancelled_gc.hash);

        let event = gc_domain_model::Event {
            id: 0,
            entity_id: 0,
            entity_name: "granular_certificate_bundle".into(),
            event_type: gc_domain_model::EventType::Create,
            attributes_before: None,
            attributes_after: Some(sdgc.canonical_value()),
            timestamp: Utc::now(),
        };

        self.store
            .commit(vec![StagedChange::UpsertBundle(Box::new(sdgc.clone()))], vec![event])
            .await?;

        Ok(sdgc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};
    use gc_domain_model::EnergySourceType;

    use crate::test_support::InMemoryStore;

    fn scr() -> StorageRecord {
        StorageRecord {
            id: 1,
            device_id: 1,
            is_charging: true,
            flow_start_datetime: Utc::now() - Duration::hours(2),
            flow_end_datetime: Utc::now() - Duration::hours(1),
            flow_energy: 1000.0,
            validator_id: Some("SCR-1".into()),
            is_deleted: false,
        }
    }

    fn sdr() -> StorageRecord {
        StorageRecord {
            id: 2,
            device_id: 1,
            is_charging: false,
            flow_start_datetime: Utc::now(),
            flow_end_datetime: Utc::now() + Duration::hours(1),
            flow_energy: 900.0,
            validator_id: Some("SDR-1".into()),
            is_deleted: false,
        }
    }

    fn request() -> AllocationRequest {
        AllocationRequest {
            scr_validator_id: "SCR-1".into(),
            sdr_validator_id: "SDR-1".into(),
            gc_allocation_id: None,
            sdr_proportion: 0.9,
            storage_efficiency_factor: 0.9,
            scr_allocation_methodology: "pro-rata".into(),
            storage_device_id: 1,
        }
    }

    fn cancelled_gc(quantity: i64) -> GranularCertificateBundle {
        GranularCertificateBundle {
            id: 5,
            issuance_id: "1-2024-01-01T00:00:00Z".into(),
            hash: "parenthash".into(),
            range_start: 0,
            range_end: quantity - 1,
            certificate_bundle_status: CertificateStatus::Cancelled,
            account_id: 1,
            device_id: 1,
            metadata_id: None,
            production_starting_interval: scr().flow_start_datetime,
            production_ending_interval: scr().flow_end_datetime,
            issuance_datestamp: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            expiry_datestamp: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            energy_carrier: EnergyCarrierType::Electricity,
            energy_source: EnergySourceType::BatteryStorage,
            face_value: 1,
            is_storage: false,
            allocated_storage_record_id: None,
            storage_efficiency_factor: None,
            beneficiary: None,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    fn allocator(store: &InMemoryStore) -> StorageAllocator<'_> {
        StorageAllocator {
            bundles: store,
            store,
        }
    }

    #[test]
    fn rejects_sdr_proportion_outside_zero_to_one() {
        let store = InMemoryStore::new();
        let mut req = request();
        req.sdr_proportion = 0.0;
        let err = allocator(&store)
            .validate_allocation(&scr(), &sdr(), None, &req)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut req = request();
        req.sdr_proportion = 1.5;
        let err = allocator(&store)
            .validate_allocation(&scr(), &sdr(), None, &req)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn rejects_storage_efficiency_factor_outside_zero_to_one() {
        let store = InMemoryStore::new();
        let mut req = request();
        req.storage_efficiency_factor = -0.1;
        let err = allocator(&store)
            .validate_allocation(&scr(), &sdr(), None, &req)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut req = request();
        req.storage_efficiency_factor = 1.1;
        let err = allocator(&store)
            .validate_allocation(&scr(), &sdr(), None, &req)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn accepts_a_well_formed_allocation_with_no_cancelled_gc() {
        let store = InMemoryStore::new();
        assert!(allocator(&store)
            .validate_allocation(&scr(), &sdr(), None, &request())
            .is_ok());
    }

    #[test]
    fn rejects_a_cancelled_gc_that_is_not_actually_cancelled() {
        let store = InMemoryStore::new();
        let mut gc = cancelled_gc(900);
        gc.certificate_bundle_status = CertificateStatus::Active;
        let err = allocator(&store)
            .validate_allocation(&scr(), &sdr(), Some(&gc), &request())
            .unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
    }

    #[test]
    fn rejects_a_cancelled_gc_whose_quantity_disagrees_with_sdr_proportion() {
        let store = InMemoryStore::new();
        let gc = cancelled_gc(1);
        let err = allocator(&store)
            .validate_allocation(&scr(), &sdr(), Some(&gc), &request())
            .unwrap_err();
        assert!(matches!(err, EngineError::Integrity(_)));
    }

    #[tokio::test]
    async fn issue_sdgc_mints_an_active_bundle_and_commits_a_create_event() {
        let store = InMemoryStore::new();
        let gc = cancelled_gc(900);
        let sdgc = allocator(&store)
            .issue_sdgc(&gc, &sdr(), 42, 0.9, 1)
            .await
            .unwrap();

        assert_eq!(sdgc.certificate_bundle_status, CertificateStatus::Active);
        assert!(sdgc.is_storage);
        assert_eq!(sdgc.allocated_storage_record_id, Some(42));
        assert_eq!(sdgc.storage_efficiency_factor, Some(0.9));
        assert_eq!(sdgc.range_start, 0);
        assert_eq!(sdgc.range_end, gc.bundle_quantity() - 1);

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, gc_domain_model::EventType::Create);
    }

    #[tokio::test]
    async fn issue_sdgc_continues_the_storage_devices_own_range_counter() {
        let store = InMemoryStore::new();
        store.seed_bundle(cancelled_gc(900));
        let gc = cancelled_gc(900);
        let sdgc = allocator(&store)
            .issue_sdgc(&gc, &sdr(), 42, 0.9, 1)
            .await
            .unwrap();
        assert_eq!(sdgc.range_start, 900);
        assert_eq!(sdgc.range_end, 1799);
    }
}
