use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gc_domain_engine::error::EngineError;
use gc_domain_engine::ports::{MeterDataClient, MeteredReading};
use serde::Deserialize;
use tracing::instrument;

/// The wire shape the external metering vendor's API returns. Only the
/// fields the issuance pipeline needs are modeled — the full vendor
/// contract is out of scope (spec §1, Out of scope).
#[derive(Debug, Deserialize)]
struct RemoteReading {
    device_id: i64,
    settlement_period_start: DateTime<Utc>,
    settlement_period_end: DateTime<Utc>,
    metered_volume_wh: i64,
}

impl From<RemoteReading> for MeteredReading {
    fn from(remote: RemoteReading) -> Self {
        MeteredReading {
            device_id: remote.device_id,
            production_starting_interval: remote.settlement_period_start,
            production_ending_interval: remote.settlement_period_end,
            metered_energy_wh: remote.metered_volume_wh,
        }
    }
}

pub struct HttpMeterDataClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpMeterDataClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MeterDataClient for HttpMeterDataClient {
    #[instrument(skip(self))]
    async fn readings_since(
        &self,
        device_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<MeteredReading>, EngineError> {
        let url = format!("{}/devices/{device_id}/readings", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("since", since.to_rfc3339())])
            .send()
            .await
            .map_err(|e| EngineError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Upstream(format!(
                "meter data vendor returned status {}",
                response.status()
            )));
        }

        let remote: Vec<RemoteReading> = response
            .json()
            .await
            .map_err(|e| EngineError::Upstream(format!("malformed meter response: {e}")))?;

        Ok(remote.into_iter().map(MeteredReading::from).collect())
    }
}
