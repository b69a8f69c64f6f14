use async_trait::async_trait;
use gc_domain_engine::error::EngineError;
use gc_domain_engine::ports::WhitelistRepository;
use libsql::params;
use tracing::instrument;

use crate::client::TursoClient;
use crate::errors::DbError;

pub struct WhitelistReadRepository {
    pub read_store: TursoClient,
}

#[async_trait]
impl WhitelistRepository for WhitelistReadRepository {
    #[instrument(skip(self))]
    async fn is_admitted(&self, source_account_id: i64, target_account_id: i64) -> Result<bool, EngineError> {
        if source_account_id == target_account_id {
            return Ok(false);
        }
        let conn = self.read_store.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM account_whitelist_links
                 WHERE source_account_id = ?1 AND target_account_id = ?2 AND is_deleted = 0",
                params![source_account_id, target_account_id],
            )
            .await
            .map_err(DbError::Query)?;
        Ok(rows.next().await.map_err(DbError::Query)?.is_some())
    }
}
