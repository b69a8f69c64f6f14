//! HTTP surface for the Granular Certificate Registry: config loading,
//! the auth guard, route wiring, and the CSV import adapters that sit
//! in front of `gc_domain_engine`.

pub mod config;
pub mod csv_import;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
