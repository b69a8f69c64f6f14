/// Surrogate primary key type used by every entity in the registry.
///
/// Server-assigned and monotonically increasing at the store level; never
/// reused, per the open question in spec.md §9 about the source's PK churn.
pub type EntityId = i64;
