use gc_domain_model::{CertificateStatus, GranularCertificateBundle};

use crate::error::EngineError;

/// Splits one `ACTIVE` bundle into two children that together cover the
/// same range, each re-hashed from the parent's hash as nonce (§4.6).
pub struct SplitEngine;

pub struct SplitResult {
    pub parent_split: GranularCertificateBundle,
    pub child_one: GranularCertificateBundle,
    pub child_two: GranularCertificateBundle,
}

impl SplitEngine {
    /// `k` is the size of `child_one`, taken from the start of the range.
    pub fn split(parent: &GranularCertificateBundle, k: i64) -> Result<SplitResult, EngineError> {
        let quantity = parent.bundle_quantity();
        if k <= 0 || k >= quantity {
            return Err(EngineError::Validation(format!(
                "split point {k} must satisfy 0 < k < {quantity}"
            )));
        }

        let mut child_one = parent.clone();
        child_one.id = 0;
        child_one.range_start = parent.range_start;
        child_one.range_end = parent.range_start + k - 1;
        child_one.certificate_bundle_status = CertificateStatus::Active;
        child_one.is_deleted = false;
        child_one.hash = gc_core_ids::bundle_hash(&child_one.canonical_value(), &parent.hash);

        let mut child_two = parent.clone();
        child_two.id = 0;
        child_two.range_start = parent.range_start + k;
        child_two.range_end = parent.range_end;
        child_two.certificate_bundle_status = CertificateStatus::Active;
        child_two.is_deleted = false;
        child_two.hash = gc_core_ids::bundle_hash(&child_two.canonical_value(), &parent.hash);

        let mut parent_split = parent.clone();
        parent_split.certificate_bundle_status = CertificateStatus::BundleSplit;
        parent_split.is_deleted = true;

        Ok(SplitResult {
            parent_split,
            child_one,
            child_two,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use gc_domain_model::{EnergyCarrierType, EnergySourceType};

    fn parent() -> GranularCertificateBundle {
        GranularCertificateBundle {
            id: 7,
            issuance_id: "1-2024-01-01T00:00:00Z".into(),
            hash: "parenthash".into(),
            range_start: 0,
            range_end: 999,
            certificate_bundle_status: CertificateStatus::Active,
            account_id: 1,
            device_id: 1,
            metadata_id: None,
            production_starting_interval: Utc::now(),
            production_ending_interval: Utc::now(),
            issuance_datestamp: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            expiry_datestamp: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            energy_carrier: EnergyCarrierType::Electricity,
            energy_source: EnergySourceType::SolarPv,
            face_value: 1,
            is_storage: false,
            allocated_storage_record_id: None,
            storage_efficiency_factor: None,
            beneficiary: None,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn children_cover_the_parent_range_exactly() {
        let result = SplitEngine::split(&parent(), 250).unwrap();
        assert_eq!(result.child_one.range_start, 0);
        assert_eq!(result.child_one.range_end, 249);
        assert_eq!(result.child_two.range_start, 250);
        assert_eq!(result.child_two.range_end, 999);
        assert_eq!(result.child_one.bundle_quantity() + result.child_two.bundle_quantity(), 1000);
    }

    #[test]
    fn children_share_the_parent_issuance_id() {
        let result = SplitEngine::split(&parent(), 250).unwrap();
        assert_eq!(result.child_one.issuance_id, parent().issuance_id);
        assert_eq!(result.child_two.issuance_id, parent().issuance_id);
    }

    #[test]
    fn parent_becomes_bundle_split_and_soft_deleted() {
        let result = SplitEngine::split(&parent(), 250).unwrap();
        assert_eq!(result.parent_split.certificate_bundle_status, CertificateStatus::BundleSplit);
        assert!(result.parent_split.is_deleted);
    }

    #[test]
    fn rejects_split_point_outside_range() {
        assert!(SplitEngine::split(&parent(), 0).is_err());
        assert!(SplitEngine::split(&parent(), 1000).is_err());
    }

    proptest::proptest! {
        /// Whatever `k` the caller picks (within bounds), the two
        /// children's quantities must sum back to the parent's and
        /// neither may collide with the other's hash.
        #[test]
        fn split_always_conserves_the_parent_quantity(quantity in 2i64..100_000, k in 1i64..quantity) {
            let mut p = parent();
            p.range_start = 0;
            p.range_end = quantity - 1;
            let result = SplitEngine::split(&p, k).unwrap();

            proptest::prop_assert_eq!(
                result.child_one.bundle_quantity() + result.child_two.bundle_quantity(),
                quantity
            );
            proptest::prop_assert_eq!(result.child_one.range_start, p.range_start);
            proptest::prop_assert_eq!(result.child_two.range_end, p.range_end);
            proptest::prop_assert_eq!(result.child_one.range_end + 1, result.child_two.range_start);
            proptest::prop_assert_ne!(result.child_one.hash, result.child_two.hash);
            proptest::prop_assert_eq!(result.parent_split.certificate_bundle_status, CertificateStatus::BundleSplit);
        }
    }
}
