use indexmap::IndexMap;

use crate::{
    error::RouterError,
    plan::{Plan, LIST_VAR_NAME},
    query::{BindValue, QueryResult},
    router::{resolve::resolve_keys, RequestContext, Router},
    topo::{shards_for_key_range, KeyRange, KeyspaceId},
};

impl Router {
    /// Unsharded keyspaces hold exactly one shard; reads and DML both pass
    /// through untouched.
    pub(crate) async fn exec_unsharded(
        &self,
        plan: &Plan,
        ctx: &mut RequestContext<'_>,
    ) -> Result<QueryResult, RouterError> {
        let (keyspace, shards) = self.keyspace_shards(ctx, &plan.table.keyspace.name).await?;
        if shards.len() != 1 {
            return Err(RouterError::UnshardedMultiShard { keyspace });
        }
        let shards = [shards[0].name.clone()];
        ctx.ensure_live()?;
        self.scatter
            .execute(
                ctx.token(),
                &plan.rewritten,
                &ctx.bind_vars,
                &keyspace,
                &shards,
                ctx.tablet_type(),
                ctx.session(),
            )
            .await
    }

    pub(crate) async fn exec_select_equal(
        &self,
        plan: &Plan,
        ctx: &mut RequestContext<'_>,
    ) -> Result<QueryResult, RouterError> {
        let keys = self.plan_keys(plan, ctx)?;
        let col_vindex = routing_vindex(plan)?;
        let (keyspace, routing) = self
            .resolve_shards(ctx, &plan.table.keyspace.name, col_vindex, &keys)
            .await?;
        if routing.is_empty() {
            return Ok(QueryResult::default());
        }
        let shards: Vec<String> = routing.keys().cloned().collect();
        ctx.ensure_live()?;
        self.scatter
            .execute(
                ctx.token(),
                &plan.rewritten,
                &ctx.bind_vars,
                &keyspace,
                &shards,
                ctx.tablet_type(),
                ctx.session(),
            )
            .await
    }

    /// One rewrite, per-shard bind bundles: each shard sees only the keys
    /// that routed to it, under [`LIST_VAR_NAME`].
    pub(crate) async fn exec_select_in(
        &self,
        plan: &Plan,
        ctx: &mut RequestContext<'_>,
    ) -> Result<QueryResult, RouterError> {
        let mut keys = Vec::new();
        for key in self.plan_keys(plan, ctx)? {
            match key {
                BindValue::List(items) => {
                    keys.extend(items.into_iter().map(BindValue::normalized));
                }
                other => keys.push(other),
            }
        }
        let col_vindex = routing_vindex(plan)?;
        let (keyspace, routing) = self
            .resolve_shards(ctx, &plan.table.keyspace.name, col_vindex, &keys)
            .await?;
        if routing.is_empty() {
            return Ok(QueryResult::default());
        }

        let mut shard_bind_vars = IndexMap::new();
        for (shard, shard_keys) in routing.iter() {
            let mut bind_vars = ctx.bind_vars.clone();
            bind_vars.insert(LIST_VAR_NAME.to_owned(), BindValue::List(shard_keys.clone()));
            shard_bind_vars.insert(shard.clone(), bind_vars);
        }

        ctx.ensure_live()?;
        self.scatter
            .execute_multi(
                ctx.token(),
                &plan.rewritten,
                &keyspace,
                shard_bind_vars,
                ctx.tablet_type(),
                ctx.session(),
            )
            .await
    }

    /// The two plan values are the range endpoints; the range must land on
    /// exactly one shard.
    pub(crate) async fn exec_select_keyrange(
        &self,
        plan: &Plan,
        ctx: &mut RequestContext<'_>,
    ) -> Result<QueryResult, RouterError> {
        let keys = self.plan_keys(plan, ctx)?;
        let [start, end] = keys.as_slice() else {
            return Err(RouterError::PlanShape(format!(
                "keyrange plan expects two endpoint values, got {}",
                keys.len()
            )));
        };
        let range = KeyRange::new(range_endpoint(start)?, range_endpoint(end)?);

        let (keyspace, shards) = self.keyspace_shards(ctx, &plan.table.keyspace.name).await?;
        let matched = shards_for_key_range(&shards, &range);
        if matched.len() != 1 {
            return Err(RouterError::KeyrangeShardCount {
                start: range.start.hex(),
                end: range.end.hex(),
                matched: matched.len(),
            });
        }

        ctx.ensure_live()?;
        self.scatter
            .execute(
                ctx.token(),
                &plan.rewritten,
                &ctx.bind_vars,
                &keyspace,
                &matched,
                ctx.tablet_type(),
                ctx.session(),
            )
            .await
    }

    pub(crate) async fn exec_select_scatter(
        &self,
        plan: &Plan,
        ctx: &mut RequestContext<'_>,
    ) -> Result<QueryResult, RouterError> {
        let (keyspace, shards) = self.keyspace_shards(ctx, &plan.table.keyspace.name).await?;
        let shards: Vec<String> = shards.into_iter().map(|shard| shard.name).collect();
        ctx.ensure_live()?;
        self.scatter
            .execute(
                ctx.token(),
                &plan.rewritten,
                &ctx.bind_vars,
                &keyspace,
                &shards,
                ctx.tablet_type(),
                ctx.session(),
            )
            .await
    }

    pub(crate) fn plan_keys(
        &self,
        plan: &Plan,
        ctx: &RequestContext<'_>,
    ) -> Result<Vec<BindValue>, RouterError> {
        let values = plan.values.as_ref().ok_or_else(|| {
            RouterError::PlanShape(format!("{} plan without routing values", plan.kind))
        })?;
        resolve_keys(values.as_slice(), &ctx.bind_vars)
    }
}

pub(crate) fn routing_vindex(plan: &Plan) -> Result<&std::sync::Arc<crate::schema::ColVindex>, RouterError> {
    plan.vindex
        .as_ref()
        .ok_or_else(|| RouterError::PlanShape(format!("{} plan without a routing vindex", plan.kind)))
}

fn range_endpoint(value: &BindValue) -> Result<KeyspaceId, RouterError> {
    match value {
        BindValue::Text(hex) => KeyspaceId::from_hex(hex)
            .map_err(|err| RouterError::KeyrangeEndpoint(format!("{hex:?}: {err}"))),
        BindValue::Bytes(raw) => Ok(KeyspaceId::from_bytes(raw.clone())),
        other => Err(RouterError::KeyrangeEndpoint(format!("{other:?}"))),
    }
}
