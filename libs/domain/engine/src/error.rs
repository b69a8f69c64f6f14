use thiserror::Error;

/// Maps onto the `{kind, message, details?}` envelope from the error
/// handling design: each variant names the `kind` the HTTP layer reports.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("VALIDATION: {0}")]
    Validation(String),

    #[error("AUTHORIZATION: {0}")]
    Authorization(String),

    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    #[error("STATE: {0}")]
    State(String),

    #[error("INTEGRITY: {0}")]
    Integrity(String),

    #[error("UPSTREAM: {0}")]
    Upstream(String),

    #[error("INTERNAL: {0}")]
    Internal(String),
}
