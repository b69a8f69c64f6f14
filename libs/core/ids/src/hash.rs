use sha2::{Digest, Sha256};

/// Computes a child bundle's lineage hash from its canonical (non-mutable)
/// fields and the parent bundle's hash, used as a nonce.
///
/// `canonical` must already have every mutable field stripped by the
/// caller (status, account_id, range bounds, etc. — see
/// `gc_domain_model::MUTABLE_BUNDLE_FIELDS`); this crate only owns the
/// hashing, not the notion of which fields are mutable.
///
/// `serde_json::Value` serializes object keys in sorted order by default
/// (the `Map` type is a `BTreeMap` unless the `preserve_order` feature is
/// enabled, which this workspace does not enable), so `to_string` below is
/// already canonical JSON without an extra normalization pass.
pub fn bundle_hash(canonical: &serde_json::Value, parent_nonce: &str) -> String {
    let canonical_json = canonical.to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical_json.as_bytes());
    hasher.update(parent_nonce.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_input_produces_same_hash() {
        let value = json!({"device_id": 1, "range_start": 0});
        assert_eq!(bundle_hash(&value, "parent"), bundle_hash(&value, "parent"));
    }

    #[test]
    fn different_nonce_changes_hash() {
        let value = json!({"device_id": 1});
        assert_ne!(bundle_hash(&value, "a"), bundle_hash(&value, "b"));
    }

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(bundle_hash(&a, ""), bundle_hash(&b, ""));
    }
}
