use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gc_domain_engine::error::EngineError;
use gc_domain_engine::ports::{MeterDataClient, MeteredReading};

/// An in-memory meter client for tests: readings are seeded up front and
/// returned unfiltered by `since` except for the interval bound itself.
#[derive(Default)]
pub struct MockMeterDataClient {
    readings: Mutex<HashMap<i64, Vec<MeteredReading>>>,
}

impl MockMeterDataClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, device_id: i64, readings: Vec<MeteredReading>) {
        self.readings.lock().unwrap().insert(device_id, readings);
    }
}

#[async_trait]
impl MeterDataClient for MockMeterDataClient {
    async fn readings_since(
        &self,
        device_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<MeteredReading>, EngineError> {
        let readings = self.readings.lock().unwrap();
        Ok(readings
            .get(&device_id)
            .map(|rs| {
                rs.iter()
                    .filter(|r| r.production_starting_interval >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
