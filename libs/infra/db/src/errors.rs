use thiserror::Error;

/// Storage-layer error catalog. Mapped onto `gc_domain_engine::EngineError`
/// at the repository boundary so callers above this crate never see a
/// `libsql::Error` directly.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("DB_CONNECTION: {0}")]
    Connection(String),

    #[error("DB_CONFIG: {0}")]
    Configuration(String),

    #[error("DB_QUERY: {0}")]
    Query(#[from] libsql::Error),

    #[error("DB_MAPPING: {0}")]
    Mapping(String),

    #[error("DB_NOT_FOUND: {0}")]
    NotFound(String),

    #[error("DB_TRANSACTION: {0}")]
    Transaction(String),
}

impl From<DbError> for gc_domain_engine::EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => gc_domain_engine::EngineError::NotFound(msg),
            DbError::Mapping(msg) => gc_domain_engine::EngineError::Integrity(msg),
            other => gc_domain_engine::EngineError::Internal(other.to_string()),
        }
    }
}
