use std::fmt;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::{
    error::RouterError,
    query::{BindVars, QueryResult, SafeSession, TabletType},
};

/// The executor that dials shards, runs rewritten SQL under the session, and
/// merges per-shard results. Fan-out concurrency and result merging live
/// behind this trait; the router only selects shards and shapes bind vars.
#[async_trait]
pub trait ScatterConn: Send + Sync + fmt::Debug {
    /// Runs `sql` with one shared bind-var map on every listed shard.
    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        token: &CancellationToken,
        sql: &str,
        bind_vars: &BindVars,
        keyspace: &str,
        shards: &[String],
        tablet_type: TabletType,
        session: &SafeSession,
    ) -> Result<QueryResult, RouterError>;

    /// Runs `sql` once per entry, each shard with its own bind-var map.
    async fn execute_multi(
        &self,
        token: &CancellationToken,
        sql: &str,
        keyspace: &str,
        shard_bind_vars: IndexMap<String, BindVars>,
        tablet_type: TabletType,
        session: &SafeSession,
    ) -> Result<QueryResult, RouterError>;
}
