use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use gc_domain_engine::action::{ActionProcessor, ActionRequest};
use gc_domain_engine::issuance::IssuancePipeline;
use gc_domain_engine::ports::BundleRepository;
use gc_domain_engine::query::{QueryEngine, QueryRequest};
use gc_domain_engine::validator::BundleValidator;
use gc_domain_model::{ActionType, CertificateStatus, EnergySourceType, GranularCertificateAction, GranularCertificateBundle};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCertificateRequest {
    pub device_id: i64,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CreateCertificateResponse {
    pub bundles: Vec<GranularCertificateBundle>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateCertificateRequest>,
) -> Result<(StatusCode, Json<CreateCertificateResponse>), ApiError> {
    let pipeline = IssuancePipeline {
        bundles: state.bundles.as_ref(),
        accounts: state.accounts.as_ref(),
        meter_client: state.meter_client.as_ref(),
        store: state.store.as_ref(),
        validator: BundleValidator {
            certificate_granularity_hours: state.settings.certificate_granularity_hours,
            capacity_margin: state.settings.capacity_margin,
        },
        certificate_expiry_years: state.settings.certificate_expiry_years,
    };

    let bundles = pipeline
        .issue_for_device(request.device_id, request.from, request.to)
        .await?;

    Ok((StatusCode::CREATED, Json(CreateCertificateResponse { bundles })))
}

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub source_id: i64,
    pub bundle_ids: Vec<i64>,
    pub certificate_quantity: Option<i64>,
    pub certificate_bundle_percentage: Option<f64>,
    pub beneficiary: Option<String>,
    pub target_account_id: Option<i64>,
}

async fn run_action(
    state: AppState,
    actor: AuthContext,
    action_type: ActionType,
    body: ActionBody,
) -> Result<GranularCertificateAction, ApiError> {
    let processor = ActionProcessor {
        bundles: state.bundles.as_ref(),
        accounts: state.accounts.as_ref(),
        whitelist: state.whitelist.as_ref(),
        store: state.store.as_ref(),
    };
    let action = processor
        .process(ActionRequest {
            action_type,
            source_account_id: body.source_id,
            actor_user_id: actor.user_id,
            bundle_ids: body.bundle_ids,
            certificate_quantity: body.certificate_quantity,
            certificate_bundle_percentage: body.certificate_bundle_percentage,
            beneficiary: body.beneficiary,
            target_account_id: body.target_account_id,
        })
        .await?;
    Ok(action)
}

macro_rules! action_handler {
    ($name:ident, $action_type:expr) => {
        pub async fn $name(
            State(state): State<AppState>,
            Extension(actor): Extension<AuthContext>,
            Json(body): Json<ActionBody>,
        ) -> Result<(StatusCode, Json<GranularCertificateAction>), ApiError> {
            let action = run_action(state, actor, $action_type, body).await?;
            Ok((StatusCode::ACCEPTED, Json(action)))
        }
    };
}

action_handler!(transfer, ActionType::Transfer);
action_handler!(cancel, ActionType::Cancel);
action_handler!(claim, ActionType::Claim);
action_handler!(withdraw, ActionType::Withdraw);
action_handler!(reserve, ActionType::Reserve);
action_handler!(lock, ActionType::Lock);

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub source_id: i64,
    #[serde(default)]
    pub issuance_ids: Vec<String>,
    pub certificate_period_start: Option<DateTime<Utc>>,
    pub certificate_period_end: Option<DateTime<Utc>>,
    pub device_id: Option<i64>,
    pub energy_source: Option<EnergySourceType>,
    pub certificate_bundle_status: Option<CertificateStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub bundles: Vec<GranularCertificateBundle>,
    pub total: usize,
}

pub async fn query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<(StatusCode, Json<QueryResponse>), ApiError> {
    let engine = QueryEngine {
        bundles: state.bundles.as_ref(),
    };
    let bundles = engine
        .run(QueryRequest {
            source_account_id: body.source_id,
            issuance_ids: body.issuance_ids,
            certificate_period_start: body.certificate_period_start,
            certificate_period_end: body.certificate_period_end,
            device_id: body.device_id,
            energy_source: body.energy_source,
            certificate_bundle_status: body.certificate_bundle_status,
            limit: body.limit,
        })
        .await?;
    let total = bundles.len();
    Ok((StatusCode::ACCEPTED, Json(QueryResponse { bundles, total })))
}

pub async fn import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<crate::csv_import::ImportSummary>), ApiError> {
    let mut account_id: Option<i64> = None;
    let mut device_id: Option<i64> = None;
    let mut csv_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("account_id") => {
                let text = field.text().await.map_err(|e| ApiError::Validation(e.to_string()))?;
                account_id = Some(
                    text.parse()
                        .map_err(|_| ApiError::Validation("account_id must be an integer".into()))?,
                );
            }
            Some("device_id") => {
                let text = field.text().await.map_err(|e| ApiError::Validation(e.to_string()))?;
                device_id = Some(
                    text.parse()
                        .map_err(|_| ApiError::Validation("device_id must be an integer".into()))?,
                );
            }
            Some("file") => {
                csv_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::Validation(format!("failed to read upload: {e}")))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let account_id = account_id.ok_or_else(|| ApiError::Validation("missing account_id field".into()))?;
    let device_id = device_id.ok_or_else(|| ApiError::Validation("missing device_id field".into()))?;
    let csv_bytes = csv_bytes.ok_or_else(|| ApiError::Validation("missing file field".into()))?;

    let summary = crate::csv_import::import_certificates(&state, account_id, device_id, &csv_bytes).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<GranularCertificateBundle>, ApiError> {
    let bundle = state
        .bundles
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no bundle with id {id}")))?;
    Ok(Json(bundle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_domain_engine::ports::{AccountRepository, CqrsStore, MeterDataClient, WhitelistRepository};
    use gc_infra_db::{AccountReadRepository, BundleReadRepository, CqrsCoordinator, StoreRole, TursoClient, WhitelistReadRepository};
    use gc_infra_meter::MockMeterDataClient;
    use std::sync::Arc;

    async fn empty_state() -> AppState {
        let write_store = TursoClient::connect(":memory:", None, StoreRole::Write).await.unwrap();
        let read_store = TursoClient::connect(":memory:", None, StoreRole::Read).await.unwrap();
        let event_store = TursoClient::connect(":memory:", None, StoreRole::Event).await.unwrap();

        let store: Arc<dyn CqrsStore> = Arc::new(CqrsCoordinator {
            write_store: write_store.clone(),
            read_store: read_store.clone(),
            event_store,
        });
        let bundles: Arc<dyn BundleRepository> = Arc::new(BundleReadRepository { read_store: read_store.clone() });
        let accounts: Arc<dyn AccountRepository> = Arc::new(AccountReadRepository { read_store: read_store.clone() });
        let whitelist: Arc<dyn WhitelistRepository> = Arc::new(WhitelistReadRepository { read_store: read_store.clone() });
        let meter_client: Arc<dyn MeterDataClient> = Arc::new(MockMeterDataClient::default());

        AppState {
            bundles,
            accounts,
            whitelist,
            meter_client,
            store,
            settings: Arc::new(crate::config::Settings {
                write_database_url: String::new(),
                write_database_token: None,
                read_database_url: String::new(),
                read_database_token: None,
                event_database_url: String::new(),
                event_database_token: None,
                certificate_granularity_hours: 1.0,
                capacity_margin: 1.1,
                certificate_expiry_years: 2,
                jwt_secret: "test-secret".into(),
                access_token_expire_minutes: 30,
                api_key_expire_days: 365,
                api_key_max_expire_days: 730,
                cors_allowed_origins: vec!["*".into()],
                log_level: "info".into(),
                port: 0,
                meter_base_url: "http://localhost".into(),
                meter_api_key: String::new(),
            }),
            write_store,
            read_store,
        }
    }

    #[tokio::test]
    async fn get_by_id_returns_not_found_for_missing_bundle() {
        let state = empty_state().await;
        let err = get_by_id(State(state), Path(1)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn query_on_an_empty_store_returns_no_bundles() {
        let state = empty_state().await;
        let (status, Json(response)) = query(
            State(state),
            Json(QueryBody {
                source_id: 1,
                issuance_ids: vec![],
                certificate_period_start: None,
                certificate_period_end: None,
                device_id: None,
                energy_source: None,
                certificate_bundle_status: None,
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(response.total, 0);
        assert!(response.bundles.is_empty());
    }

    #[tokio::test]
    async fn create_with_an_unknown_device_is_rejected() {
        let state = empty_state().await;
        let err = create(
            State(state),
            Json(CreateCertificateRequest {
                device_id: 999,
                from: Utc::now() - chrono::Duration::hours(1),
                to: Utc::now(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
