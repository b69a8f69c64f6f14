use chrono::Utc;
use gc_domain_model::{
    ActionResponseStatus, ActionType, CertificateStatus, GranularCertificateAction,
    GranularCertificateBundle, Role,
};

use crate::error::EngineError;
use crate::ports::{AccountRepository, BundleRepository, CqrsStore, StagedChange, WhitelistRepository};
use crate::split::SplitEngine;

#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action_type: ActionType,
    pub source_account_id: i64,
    pub actor_user_id: i64,
    pub bundle_ids: Vec<i64>,
    pub certificate_quantity: Option<i64>,
    pub certificate_bundle_percentage: Option<f64>,
    pub beneficiary: Option<String>,
    pub target_account_id: Option<i64>,
}

/// Dispatches TRANSFER/CANCEL/CLAIM/WITHDRAW/LOCK/RESERVE, applying the
/// partial-selection split and the role gate from §4.7 before handing the
/// mutated bundles to the CQRS coordinator.
pub struct ActionProcessor<'a> {
    pub bundles: &'a dyn BundleRepository,
    pub accounts: &'a dyn AccountRepository,
    pub whitelist: &'a dyn WhitelistRepository,
    pub store: &'a dyn CqrsStore,
}

fn required_role(action_type: ActionType) -> Role {
    match action_type {
        ActionType::Withdraw => Role::Admin,
        _ => Role::TradingUser,
    }
}

impl<'a> ActionProcessor<'a> {
    pub async fn process(
        &self,
        request: ActionRequest,
    ) -> Result<GranularCertificateAction, EngineError> {
        if request.certificate_quantity.is_some() && request.certificate_bundle_percentage.is_some()
        {
            return Err(EngineError::Validation(
                "certificate_quantity and certificate_bundle_percentage are mutually exclusive"
                    .into(),
            ));
        }
        if let Some(pct) = request.certificate_bundle_percentage {
            if !(pct > 0.0 && pct <= 1.0) {
                return Err(EngineError::Validation(
                    "certificate_bundle_percentage must be in (0, 1]".into(),
                ));
            }
        }

        let now = Utc::now();
        let mut action = GranularCertificateAction {
            id: 0,
            action_type: request.action_type,
            source_account_id: request.source_account_id,
            actor_user_id: request.actor_user_id,
            granular_certificate_bundle_ids: request.bundle_ids.clone(),
            certificate_quantity: request.certificate_quantity,
            certificate_bundle_percentage: request.certificate_bundle_percentage,
            beneficiary: request.beneficiary.clone(),
            target_account_id: request.target_account_id,
            action_request_datetime: now,
            action_completed_datetime: None,
            action_response_status: ActionResponseStatus::Pending,
            rejection_reason: None,
        };

        match self.try_apply(&request).await {
            Ok((changes, events)) => {
                action.action_response_status = ActionResponseStatus::Accepted;
                action.action_completed_datetime = Some(Utc::now());
                let mut all_changes = changes;
                all_changes.push(StagedChange::UpsertAction(Box::new(action.clone())));
                self.store.commit(all_changes, events).await?;
                Ok(action)
            }
            Err(err) => {
                action.action_response_status = ActionResponseStatus::Rejected;
                action.action_completed_datetime = Some(Utc::now());
                action.rejection_reason = Some(err.to_string());
                // A rejected action is still persisted for audit, but in
                // isolation: nothing else about this call may be staged.
                self.store
                    .commit(vec![StagedChange::UpsertAction(Box::new(action))], vec![])
                    .await
                    .ok();
                Err(err)
            }
        }
    }

    async fn try_apply(
        &self,
        request: &ActionRequest,
    ) -> Result<(Vec<StagedChange>, Vec<gc_domain_model::Event>), EngineError> {
        let role = self
            .accounts
            .role_for_user_on_account(request.actor_user_id, request.source_account_id)
            .await?
            .ok_or_else(|| {
                EngineError::Authorization("actor is not linked to source account".into())
            })?;

        let source_account = self
            .accounts
            .get(request.source_account_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("source account does not exist".into()))?;

        if role < required_role(request.action_type) {
            return Err(EngineError::Authorization(format!(
                "role {role:?} is below the threshold required for {:?}",
                request.action_type
            )));
        }

        if request.action_type == ActionType::Transfer {
            let target = request
                .target_account_id
                .ok_or_else(|| EngineError::Validation("transfer requires target_account_id".into()))?;
            if self.accounts.get(target).await?.is_none() {
                return Err(EngineError::NotFound("target account does not exist".into()));
            }
            if !self
                .whitelist
                .is_admitted(request.source_account_id, target)
                .await?
            {
                return Err(EngineError::State(
                    "no whitelist edge admits this transfer".into(),
                ));
            }
        }

        let bundles = self.bundles.get_many(&request.bundle_ids).await?;
        if bundles.len() != request.bundle_ids.len() {
            return Err(EngineError::NotFound(
                "one or more target bundle ids do not exist".into(),
            ));
        }

        let mut changes = Vec::new();
        let mut events = Vec::new();

        for bundle in bundles {
            self.check_precondition(request.action_type, &bundle)?;
            let (mutated, extra_changes, extra_events) =
                self.apply_to_bundle(request, bundle, &source_account.account_name)?;
            changes.push(StagedChange::UpsertBundle(Box::new(mutated)));
            changes.extend(extra_changes);
            events.extend(extra_events);
        }

        Ok((changes, events))
    }

    fn check_precondition(
        &self,
        action_type: ActionType,
        bundle: &GranularCertificateBundle,
    ) -> Result<(), EngineError> {
        use CertificateStatus::*;
        let ok = match action_type {
            ActionType::Transfer => bundle.certificate_bundle_status == Active,
            ActionType::Cancel => {
                matches!(bundle.certificate_bundle_status, Active | Reserved)
            }
            ActionType::Claim => bundle.certificate_bundle_status == Cancelled,
            ActionType::Withdraw | ActionType::Lock | ActionType::Reserve => true,
        };
        if ok {
            Ok(())
        } else {
            Err(EngineError::State(format!(
                "{action_type:?} not permitted from status {:?}",
                bundle.certificate_bundle_status
            )))
        }
    }

    /// Applies the partial-selection split (§4.7) if the bundle exceeds
    /// the requested selector, then mutates the (possibly split-off)
    /// child in place.
    fn apply_to_bundle(
        &self,
        request: &ActionRequest,
        bundle: GranularCertificateBundle,
        source_account_name: &str,
    ) -> Result<
        (
            GranularCertificateBundle,
            Vec<StagedChange>,
            Vec<gc_domain_model::Event>,
        ),
        EngineError,
    > {
        let selector = request
            .certificate_quantity
            .or_else(|| {
                request
                    .certificate_bundle_percentage
                    .map(|pct| (bundle.bundle_quantity() as f64 * pct).floor() as i64)
            });

        let (mut target, mut changes, mut events, target_is_split_child) = match selector {
            Some(k) if k < bundle.bundle_quantity() && k > 0 => {
                let split = SplitEngine::split(&bundle, k)?;
                let parent_event = gc_domain_model::Event {
                    id: 0,
                    entity_id: bundle.id,
                    entity_name: "granular_certificate_bundle".into(),
                    event_type: gc_domain_model::EventType::Update,
                    attributes_before: Some(bundle.canonical_value()),
                    attributes_after: Some(split.parent_split.canonical_value()),
                    timestamp: Utc::now(),
                };
                let child_two_event = gc_domain_model::Event {
                    id: 0,
                    entity_id: 0,
                    entity_name: "granular_certificate_bundle".into(),
                    event_type: gc_domain_model::EventType::Create,
                    attributes_before: None,
                    attributes_after: Some(split.child_two.canonical_value()),
                    timestamp: Utc::now(),
                };
                (
                    split.child_one,
                    vec![
                        StagedChange::UpsertBundle(Box::new(split.parent_split)),
                        StagedChange::UpsertBundle(Box::new(split.child_two)),
                    ],
                    vec![parent_event, child_two_event],
                    true,
                )
            }
            _ => (bundle, Vec::new(), Vec::new(), false),
        };

        let before = target.canonical_value();
        match request.action_type {
            ActionType::Transfer => {
                target.account_id = request.target_account_id.expect("checked above");
            }
            ActionType::Cancel => {
                target.certificate_bundle_status = CertificateStatus::Cancelled;
                target.beneficiary = request
                    .beneficiary
                    .clone()
                    .or_else(|| Some(source_account_name.to_string()));
            }
            ActionType::Claim => target.certificate_bundle_status = CertificateStatus::Claimed,
            ActionType::Withdraw => target.certificate_bundle_status = CertificateStatus::Withdrawn,
            ActionType::Lock => target.certificate_bundle_status = CertificateStatus::Locked,
            ActionType::Reserve => target.certificate_bundle_status = CertificateStatus::Reserved,
        }

        // A split-off child is a brand-new entity (id == 0 until the CQRS
        // coordinator assigns one): its first event is a CREATE, not an
        // UPDATE, same as child_two above.
        events.push(gc_domain_model::Event {
            id: 0,
            entity_id: target.id,
            entity_name: "granular_certificate_bundle".into(),
            event_type: if target_is_split_child {
                gc_domain_model::EventType::Create
            } else {
                gc_domain_model::EventType::Update
            },
            attributes_before: if target_is_split_child { None } else { Some(before) },
            attributes_after: Some(target.canonical_value()),
            timestamp: Utc::now(),
        });

        Ok((target, changes, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use gc_domain_model::{Account, EnergyCarrierType, EnergySourceType, EventType};

    use crate::test_support::{FakeAccountRepository, FakeWhitelistRepository, InMemoryStore};

    const SOURCE: i64 = 1;
    const TARGET: i64 = 2;
    const USER: i64 = 10;

    fn account(id: i64) -> Account {
        Account {
            id,
            account_name: format!("account-{id}"),
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    fn bundle(id: i64, account_id: i64, status: CertificateStatus, range_end: i64) -> GranularCertificateBundle {
        GranularCertificateBundle {
            id,
            issuance_id: "1-2024-01-01T00:00:00Z".into(),
            hash: "hash".into(),
            range_start: 0,
            range_end,
            certificate_bundle_status: status,
            account_id,
            device_id: 1,
            metadata_id: None,
            production_starting_interval: Utc::now(),
            production_ending_interval: Utc::now(),
            issuance_datestamp: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            expiry_datestamp: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            energy_carrier: EnergyCarrierType::Electricity,
            energy_source: EnergySourceType::SolarPv,
            face_value: 1,
            is_storage: false,
            allocated_storage_record_id: None,
            storage_efficiency_factor: None,
            beneficiary: None,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    fn accounts_with_both(role: Role) -> FakeAccountRepository {
        FakeAccountRepository::new()
            .with_account(account(SOURCE))
            .with_account(account(TARGET))
            .with_role(USER, SOURCE, role)
    }

    #[tokio::test]
    async fn transfer_with_partial_selection_splits_and_only_moves_the_selected_child() {
        let store = InMemoryStore::new();
        let source_id = store.seed_bundle(bundle(0, SOURCE, CertificateStatus::Active, 999));
        let accounts = accounts_with_both(Role::TradingUser);
        let whitelist = FakeWhitelistRepository::new().admit(SOURCE, TARGET);
        let processor = ActionProcessor {
            bundles: &store,
            accounts: &accounts,
            whitelist: &whitelist,
            store: &store,
        };

        let action = processor
            .process(ActionRequest {
                action_type: ActionType::Transfer,
                source_account_id: SOURCE,
                actor_user_id: USER,
                bundle_ids: vec![source_id],
                certificate_quantity: Some(250),
                certificate_bundle_percentage: None,
                beneficiary: None,
                target_account_id: Some(TARGET),
            })
            .await
            .unwrap();
        assert_eq!(action.action_response_status, ActionResponseStatus::Accepted);

        let bundles = store.all_bundles();
        let parent = bundles.iter().find(|b| b.id == source_id).unwrap();
        assert_eq!(parent.certificate_bundle_status, CertificateStatus::BundleSplit);
        assert!(parent.is_deleted);

        let children: Vec<_> = bundles.iter().filter(|b| b.id != source_id).collect();
        assert_eq!(children.len(), 2);
        let moved = children
            .iter()
            .find(|b| b.account_id == TARGET)
            .expect("selected child moved to target account");
        assert_eq!(moved.bundle_quantity(), 250);
        let kept = children.iter().find(|b| b.account_id == SOURCE).unwrap();
        assert_eq!(kept.bundle_quantity(), 750);

        let events = store.events();
        let creates = events.iter().filter(|e| e.event_type == EventType::Create).count();
        let updates = events.iter().filter(|e| e.event_type == EventType::Update).count();
        assert_eq!(creates, 2, "both split children must be CREATE events");
        assert_eq!(updates, 1, "only the split parent is an UPDATE event");
    }

    #[tokio::test]
    async fn transfer_without_a_whitelist_edge_is_rejected() {
        let store = InMemoryStore::new();
        let bundle_id = store.seed_bundle(bundle(0, SOURCE, CertificateStatus::Active, 99));
        let accounts = accounts_with_both(Role::TradingUser);
        let whitelist = FakeWhitelistRepository::new();
        let processor = ActionProcessor {
            bundles: &store,
            accounts: &accounts,
            whitelist: &whitelist,
            store: &store,
        };

        let err = processor
            .process(ActionRequest {
                action_type: ActionType::Transfer,
                source_account_id: SOURCE,
                actor_user_id: USER,
                bundle_ids: vec![bundle_id],
                certificate_quantity: None,
                certificate_bundle_percentage: None,
                beneficiary: None,
                target_account_id: Some(TARGET),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::State(_)));

        // The rejected attempt is still recorded for audit.
        assert_eq!(store.actions().len(), 1);
        assert_eq!(
            store.actions()[0].action_response_status,
            ActionResponseStatus::Rejected
        );
    }

    #[tokio::test]
    async fn claim_is_rejected_unless_the_bundle_is_cancelled() {
        let store = InMemoryStore::new();
        let bundle_id = store.seed_bundle(bundle(0, SOURCE, CertificateStatus::Active, 99));
        let accounts = accounts_with_both(Role::TradingUser);
        let whitelist = FakeWhitelistRepository::new();
        let processor = ActionProcessor {
            bundles: &store,
            accounts: &accounts,
            whitelist: &whitelist,
            store: &store,
        };

        let err = processor
            .process(ActionRequest {
                action_type: ActionType::Claim,
                source_account_id: SOURCE,
                actor_user_id: USER,
                bundle_ids: vec![bundle_id],
                certificate_quantity: None,
                certificate_bundle_percentage: None,
                beneficiary: None,
                target_account_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
    }

    #[tokio::test]
    async fn cancel_is_rejected_once_already_claimed() {
        let store = InMemoryStore::new();
        let bundle_id = store.seed_bundle(bundle(0, SOURCE, CertificateStatus::Claimed, 99));
        let accounts = accounts_with_both(Role::TradingUser);
        let whitelist = FakeWhitelistRepository::new();
        let processor = ActionProcessor {
            bundles: &store,
            accounts: &accounts,
            whitelist: &whitelist,
            store: &store,
        };

        let err = processor
            .process(ActionRequest {
                action_type: ActionType::Cancel,
                source_account_id: SOURCE,
                actor_user_id: USER,
                bundle_ids: vec![bundle_id],
                certificate_quantity: None,
                certificate_bundle_percentage: None,
                beneficiary: None,
                target_account_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
    }

    #[tokio::test]
    async fn cancel_defaults_beneficiary_to_the_source_account_name_when_omitted() {
        let store = InMemoryStore::new();
        let bundle_id = store.seed_bundle(bundle(0, SOURCE, CertificateStatus::Active, 99));
        let accounts = accounts_with_both(Role::TradingUser);
        let whitelist = FakeWhitelistRepository::new();
        let processor = ActionProcessor {
            bundles: &store,
            accounts: &accounts,
            whitelist: &whitelist,
            store: &store,
        };

        processor
            .process(ActionRequest {
                action_type: ActionType::Cancel,
                source_account_id: SOURCE,
                actor_user_id: USER,
                bundle_ids: vec![bundle_id],
                certificate_quantity: None,
                certificate_bundle_percentage: None,
                beneficiary: None,
                target_account_id: None,
            })
            .await
            .unwrap();

        let cancelled = store.bundle(bundle_id).unwrap();
        assert_eq!(cancelled.beneficiary.as_deref(), Some(account(SOURCE).account_name.as_str()));
    }

    #[tokio::test]
    async fn cancel_keeps_an_explicitly_provided_beneficiary() {
        let store = InMemoryStore::new();
        let bundle_id = store.seed_bundle(bundle(0, SOURCE, CertificateStatus::Active, 99));
        let accounts = accounts_with_both(Role::TradingUser);
        let whitelist = FakeWhitelistRepository::new();
        let processor = ActionProcessor {
            bundles: &store,
            accounts: &accounts,
            whitelist: &whitelist,
            store: &store,
        };

        processor
            .process(ActionRequest {
                action_type: ActionType::Cancel,
                source_account_id: SOURCE,
                actor_user_id: USER,
                bundle_ids: vec![bundle_id],
                certificate_quantity: None,
                certificate_bundle_percentage: None,
                beneficiary: Some("someone else".into()),
                target_account_id: None,
            })
            .await
            .unwrap();

        let cancelled = store.bundle(bundle_id).unwrap();
        assert_eq!(cancelled.beneficiary.as_deref(), Some("someone else"));
    }

    #[tokio::test]
    async fn withdraw_below_admin_role_is_rejected() {
        let store = InMemoryStore::new();
        let bundle_id = store.seed_bundle(bundle(0, SOURCE, CertificateStatus::Active, 99));
        let accounts = accounts_with_both(Role::TradingUser);
        let whitelist = FakeWhitelistRepository::new();
        let processor = ActionProcessor {
            bundles: &store,
            accounts: &accounts,
            whitelist: &whitelist,
            store: &store,
        };

        let err = processor
            .process(ActionRequest {
                action_type: ActionType::Withdraw,
                source_account_id: SOURCE,
                actor_user_id: USER,
                bundle_ids: vec![bundle_id],
                certificate_quantity: None,
                certificate_bundle_percentage: None,
                beneficiary: None,
                target_account_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));
    }
}
