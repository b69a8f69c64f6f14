use std::sync::Arc;

use libsql::{Builder, Connection, Database};
use tracing::{info, instrument};

use crate::errors::DbError;
use crate::schema::{apply_event_schema, apply_write_read_schema};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreRole {
    Write,
    Read,
    Event,
}

/// A connected libSQL database plus an anchor connection kept alive for
/// in-memory URLs, where SQLite otherwise drops the schema the instant
/// the bootstrap connection closes.
#[derive(Clone)]
pub struct TursoClient {
    database: Arc<Database>,
    _memory_anchor: Option<Arc<Connection>>,
}

impl TursoClient {
    #[instrument(skip(access_token))]
    pub async fn connect(
        url: &str,
        access_token: Option<String>,
        role: StoreRole,
    ) -> Result<Self, DbError> {
        if url.is_empty() {
            return Err(DbError::Configuration("database url is empty".into()));
        }

        let is_remote = url.starts_with("libsql://") || url.starts_with("https://");
        let is_memory = url.contains(":memory:") || url.contains("mode=memory");

        info!(%url, ?role, "connecting to store");

        let database = if is_remote {
            let token = access_token
                .ok_or_else(|| DbError::Configuration("remote url requires an access token".into()))?;
            Builder::new_remote(url.to_string(), token).build().await
        } else {
            Builder::new_local(url).build().await
        }
        .map_err(|e| DbError::Connection(e.to_string()))?;

        let database = Arc::new(database);
        let mut anchor = None;

        if is_memory {
            let anchor_conn = database.connect().map_err(|e| DbError::Connection(e.to_string()))?;
            Self::apply_schema(&anchor_conn, role).await?;
            anchor = Some(Arc::new(anchor_conn));
        } else {
            let bootstrap_conn = database.connect().map_err(|e| DbError::Connection(e.to_string()))?;
            Self::apply_schema(&bootstrap_conn, role).await?;
        }

        Ok(Self {
            database,
            _memory_anchor: anchor,
        })
    }

    async fn apply_schema(connection: &Connection, role: StoreRole) -> Result<(), DbError> {
        match role {
            StoreRole::Write | StoreRole::Read => apply_write_read_schema(connection).await,
            StoreRole::Event => apply_event_schema(connection).await,
        }
        .map_err(|e| DbError::Connection(e.to_string()))
    }

    pub fn get_connection(&self) -> Result<Connection, DbError> {
        self.database.connect().map_err(|e| DbError::Connection(e.to_string()))
    }
}
