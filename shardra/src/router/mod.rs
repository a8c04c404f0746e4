use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{instrument, Level};

use crate::{
    error::RouterError,
    plan::{CachingPlanner, Plan, PlanKind, Planner, DEFAULT_PLAN_CACHE_CAPACITY},
    query::{Query, QueryResult},
    scatter::ScatterConn,
    topo::{Shard, SrvTopo},
};

mod context;
mod dml;
mod read;
mod resolve;

pub use context::RequestContext;
pub use resolve::RoutingMap;

/// The sharded-query router: turns a plan into a set of
/// `(keyspace, shard, rewritten SQL, bind vars)` dispatches and keeps owned
/// vindex tables in lockstep with base-table DML.
///
/// Configuration is immutable after construction; statements are routed
/// concurrently. The plan cache inside [`CachingPlanner`] is the only
/// mutable state.
#[derive(Debug)]
pub struct Router {
    cell: String,
    topo: Arc<dyn SrvTopo>,
    scatter: Arc<dyn ScatterConn>,
    planner: CachingPlanner,
}

impl Router {
    pub fn new(
        cell: impl Into<String>,
        topo: Arc<dyn SrvTopo>,
        scatter: Arc<dyn ScatterConn>,
        planner: Arc<dyn Planner>,
    ) -> Self {
        Self::with_plan_cache(cell, topo, scatter, planner, DEFAULT_PLAN_CACHE_CAPACITY)
    }

    pub fn with_plan_cache(
        cell: impl Into<String>,
        topo: Arc<dyn SrvTopo>,
        scatter: Arc<dyn ScatterConn>,
        planner: Arc<dyn Planner>,
        plan_cache_capacity: usize,
    ) -> Self {
        Self {
            cell: cell.into(),
            topo,
            scatter,
            planner: CachingPlanner::new(planner, plan_cache_capacity),
        }
    }

    /// Routes one statement. Vindex callbacks issued on the way reenter
    /// here through the request context.
    #[instrument(
        level = Level::DEBUG,
        skip_all,
        fields(sql = %query.sql, tablet_type = %query.tablet_type),
        err
    )]
    pub async fn execute(
        &self,
        token: &CancellationToken,
        query: Query,
    ) -> Result<QueryResult, RouterError> {
        let plan = self.planner.get_plan(&query.sql)?;
        let mut ctx = RequestContext::new(self, token.clone(), query);
        tracing::trace!(
            request_id = %ctx.request_id(),
            kind = %plan.kind,
            table = %plan.table.name,
            "routing statement"
        );
        self.execute_plan(&plan, &mut ctx).await
    }

    async fn execute_plan(
        &self,
        plan: &Plan,
        ctx: &mut RequestContext<'_>,
    ) -> Result<QueryResult, RouterError> {
        ctx.ensure_live()?;
        match plan.kind {
            PlanKind::SelectUnsharded
            | PlanKind::UpdateUnsharded
            | PlanKind::DeleteUnsharded
            | PlanKind::InsertUnsharded => self.exec_unsharded(plan, ctx).await,
            PlanKind::SelectEqual => self.exec_select_equal(plan, ctx).await,
            PlanKind::SelectIn => self.exec_select_in(plan, ctx).await,
            PlanKind::SelectKeyrange => self.exec_select_keyrange(plan, ctx).await,
            PlanKind::SelectScatter => self.exec_select_scatter(plan, ctx).await,
            PlanKind::UpdateEqual | PlanKind::DeleteEqual => self.exec_dml_equal(plan, ctx).await,
            PlanKind::InsertSharded => self.exec_insert_sharded(plan, ctx).await,
        }
    }

    /// Fetches the shard partition fresh; the set may have changed since
    /// the last statement.
    pub(crate) async fn keyspace_shards(
        &self,
        ctx: &RequestContext<'_>,
        keyspace: &str,
    ) -> Result<(String, Vec<Shard>), RouterError> {
        ctx.ensure_live()?;
        self.topo
            .get_keyspace_shards(&self.cell, keyspace, ctx.tablet_type())
            .await
    }
}
