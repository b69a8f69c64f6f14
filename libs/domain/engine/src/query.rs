use chrono::{DateTime, Duration, Utc};
use gc_domain_model::{CertificateStatus, EnergySourceType, GranularCertificateBundle};

use crate::error::EngineError;
use crate::ports::{BundleQuery, BundleRepository};

const MAX_QUERY_WINDOW: Duration = Duration::days(30);

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub source_account_id: i64,
    pub issuance_ids: Vec<String>,
    pub certificate_period_start: Option<DateTime<Utc>>,
    pub certificate_period_end: Option<DateTime<Utc>>,
    pub device_id: Option<i64>,
    pub energy_source: Option<EnergySourceType>,
    pub certificate_bundle_status: Option<CertificateStatus>,
    pub limit: Option<usize>,
}

/// Validates and runs a filtered bundle query (§4.11): issuance-id
/// matches are mutually exclusive with a time range, and any time range
/// may span at most 30 days.
pub struct QueryEngine<'a> {
    pub bundles: &'a dyn BundleRepository,
}

impl<'a> QueryEngine<'a> {
    pub async fn run(
        &self,
        request: QueryRequest,
    ) -> Result<Vec<GranularCertificateBundle>, EngineError> {
        let has_issuance_filter = !request.issuance_ids.is_empty();
        let has_time_filter =
            request.certificate_period_start.is_some() || request.certificate_period_end.is_some();

        if has_issuance_filter && has_time_filter {
            return Err(EngineError::Validation(
                "issuance_ids and a time range are mutually exclusive".into(),
            ));
        }

        if has_time_filter {
            let start = request.certificate_period_start.ok_or_else(|| {
                EngineError::Validation("certificate_period_start is required with an end bound".into())
            })?;
            let end = request.certificate_period_end.ok_or_else(|| {
                EngineError::Validation("certificate_period_end is required with a start bound".into())
            })?;
            if end < start {
                return Err(EngineError::Validation("certificate_period_end precedes start".into()));
            }
            if end - start > MAX_QUERY_WINDOW {
                return Err(EngineError::Validation(
                    "certificate period range may not exceed 30 days".into(),
                ));
            }
        }

        let mut results = if has_issuance_filter {
            let mut matches = Vec::new();
            for issuance_id in &request.issuance_ids {
                matches.extend(self.bundles.by_issuance_id(issuance_id).await?);
            }
            matches
        } else {
            self.bundles
                .query(&BundleQuery {
                    source_account_id: request.source_account_id,
                    issuance_ids: Vec::new(),
                    production_starting_after: request.certificate_period_start,
                    production_starting_before: request.certificate_period_end,
                    device_id: request.device_id,
                    energy_source: request.energy_source,
                    certificate_bundle_status: request.certificate_bundle_status,
                })
                .await?
        };

        results.retain(|bundle| {
            bundle.account_id == request.source_account_id
                && request.device_id.map_or(true, |id| bundle.device_id == id)
                && request
                    .energy_source
                    .map_or(true, |source| bundle.energy_source == source)
                && request
                    .certificate_bundle_status
                    .map_or(true, |status| bundle.certificate_bundle_status == status)
        });

        results.sort_by(|a, b| b.production_starting_interval.cmp(&a.production_starting_interval));

        if let Some(limit) = request.limit {
            results.truncate(limit);
        }

        Ok(results)
    }
}
