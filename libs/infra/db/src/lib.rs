//! libSQL-backed storage: the three-store CQRS coordinator, the schema
//! each store bootstraps on connect, and the read-side repositories the
//! domain engine's ports expect.

pub mod client;
pub mod cqrs;
pub mod errors;
pub mod mapping;
pub mod repositories;
pub mod schema;

pub use client::{StoreRole, TursoClient};
pub use cqrs::CqrsCoordinator;
pub use errors::DbError;
pub use repositories::{AccountReadRepository, BundleReadRepository, WhitelistReadRepository};
