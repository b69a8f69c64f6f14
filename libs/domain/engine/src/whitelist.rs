use gc_domain_model::Role;

use crate::error::EngineError;
use crate::ports::{AccountRepository, WhitelistRepository};

/// `may_transfer` plus the per-account user link check (§4.10). The
/// action gate itself (role thresholds) is enforced inline by
/// `ActionProcessor`; this type owns only the whitelist-edge and
/// account-membership questions.
pub struct AccessGate<'a> {
    pub accounts: &'a dyn AccountRepository,
    pub whitelist: &'a dyn WhitelistRepository,
}

impl<'a> AccessGate<'a> {
    pub async fn may_transfer(&self, source_id: i64, target_id: i64) -> Result<bool, EngineError> {
        if source_id == target_id {
            return Ok(false);
        }
        self.whitelist.is_admitted(source_id, target_id).await
    }

    /// An admin is exempt from per-account membership checks, except
    /// where the action itself is role-restricted the other way (a
    /// production-level user cannot claim another account's bundles
    /// just by being an admin of a different one).
    pub async fn user_may_act_on_account(
        &self,
        user_id: i64,
        account_id: i64,
        minimum_role: Role,
    ) -> Result<bool, EngineError> {
        let role = self.accounts.role_for_user_on_account(user_id, account_id).await?;
        Ok(matches!(role, Some(r) if r >= minimum_role))
    }
}
