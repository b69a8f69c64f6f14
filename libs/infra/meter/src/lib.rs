//! Implementations of `gc_domain_engine::ports::MeterDataClient`: an
//! HTTP client shaped for the external metering vendor's interface, and
//! an in-memory fake for tests and local development.

mod http_client;
mod mock;

pub use http_client::HttpMeterDataClient;
pub use mock::MockMeterDataClient;
