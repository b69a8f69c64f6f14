use gc_domain_model::{Device, GranularCertificateBundle};

use crate::error::EngineError;

/// Checks a candidate bundle against the invariants from spec §3/§4.5
/// before it is ever handed to the hasher or the CQRS coordinator.
pub struct BundleValidator {
    pub certificate_granularity_hours: f64,
    pub capacity_margin: f64,
}

impl Default for BundleValidator {
    fn default() -> Self {
        Self {
            certificate_granularity_hours: 1.0,
            capacity_margin: 1.1,
        }
    }
}

impl BundleValidator {
    /// `max_existing_range_end` is `None` only for a device's very first
    /// bundle. Pass `allow_overlap_only` for imports, where continuity is
    /// waived but overlap is still forbidden (§4.5, "On import").
    pub fn validate_new_bundle(
        &self,
        candidate: &GranularCertificateBundle,
        device: &Device,
        max_existing_range_end: Option<i64>,
        require_strict_continuity: bool,
    ) -> Result<(), EngineError> {
        let quantity = candidate.range_end - candidate.range_start + 1;
        if quantity != candidate.bundle_quantity() {
            return Err(EngineError::Integrity(
                "bundle_quantity disagrees with range_start/range_end".into(),
            ));
        }
        if quantity <= 0 {
            return Err(EngineError::Validation(
                "bundle_quantity must be positive".into(),
            ));
        }

        let capacity = device.interval_capacity_wh(self.certificate_granularity_hours, self.capacity_margin);
        if (quantity as f64) >= capacity {
            return Err(EngineError::Validation(format!(
                "bundle_quantity {quantity} exceeds device capacity {capacity}"
            )));
        }

        if require_strict_continuity {
            let expected_start = max_existing_range_end.map(|end| end + 1).unwrap_or(0);
            if candidate.range_start != expected_start {
                return Err(EngineError::Integrity(format!(
                    "range_start {} is not the next contiguous id (expected {})",
                    candidate.range_start, expected_start
                )));
            }
        } else if let Some(max_end) = max_existing_range_end {
            if candidate.range_start <= max_end {
                return Err(EngineError::Integrity(
                    "imported range overlaps an existing range for this device".into(),
                ));
            }
        }

        Ok(())
    }
}
