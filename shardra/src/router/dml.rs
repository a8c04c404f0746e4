use std::slice;

use tracing::{instrument, Level};

use crate::{
    error::RouterError,
    plan::{Plan, PlanKind, COLUMN_ECHO_PREFIX, KEYSPACE_ID_VAR},
    query::{BindValue, QueryResult},
    router::{read::routing_vindex, RequestContext, Router},
    schema::ColVindex,
    topo::{shard_for_keyspace_id, KeyspaceId},
    vindex::{Capability, Mapped},
};

/// The trailing comment preserves ksid provenance for binlog consumers and
/// replicas; it must stay outside any SQL rewritten downstream.
fn with_routing_comment(sql: &str, ksid: &KeyspaceId) -> String {
    format!("{sql} /* _routing keyspace_id:{} */", ksid.hex())
}

fn echo_name(column: &str) -> String {
    format!("{COLUMN_ECHO_PREFIX}{column}")
}

fn require(
    col_vindex: &ColVindex,
    capability: Capability,
    operation: &'static str,
) -> Result<(), RouterError> {
    if col_vindex.vindex.capabilities().contains(capability) {
        return Ok(());
    }
    Err(RouterError::CapabilityMissing {
        vindex: col_vindex.vindex.type_name(),
        operation,
    })
}

impl Router {
    /// UpdateEqual and DeleteEqual: one unique-vindex key, one shard.
    /// A `MinKey` image short-circuits to an empty success.
    pub(crate) async fn exec_dml_equal(
        &self,
        plan: &Plan,
        ctx: &mut RequestContext<'_>,
    ) -> Result<QueryResult, RouterError> {
        let keys = self.plan_keys(plan, ctx)?;
        let key = keys.first().ok_or_else(|| {
            RouterError::PlanShape(format!("{} plan without a routing value", plan.kind))
        })?;
        let col_vindex = routing_vindex(plan)?;
        let (keyspace, shard, ksid) = self
            .resolve_single_shard(ctx, &plan.table.keyspace.name, col_vindex, key)
            .await?;
        if ksid.is_min() {
            tracing::trace!(table = %plan.table.name, "unroutable keyspace id, dml is a no-op");
            return Ok(QueryResult::default());
        }

        if plan.kind == PlanKind::DeleteEqual {
            if let Some(subquery) = &plan.subquery {
                self.delete_vindex_entries(ctx, plan, subquery, &keyspace, &shard, &ksid)
                    .await?;
            }
        }

        ctx.bind_vars
            .insert(KEYSPACE_ID_VAR.to_owned(), BindValue::Text(ksid.hex()));
        let sql = with_routing_comment(&plan.rewritten, &ksid);
        ctx.ensure_live()?;
        self.scatter
            .execute(
                ctx.token(),
                &sql,
                &ctx.bind_vars,
                &keyspace,
                slice::from_ref(&shard),
                ctx.tablet_type(),
                ctx.session(),
            )
            .await
    }

    /// Reads the owned columns of the rows about to be deleted and removes
    /// their vindex entries, all before the base delete is issued. The base
    /// delete runs even when the subquery finds nothing: rows may still
    /// match between the read and the delete.
    #[instrument(level = Level::TRACE, skip_all, fields(table = %plan.table.name), err)]
    async fn delete_vindex_entries(
        &self,
        ctx: &RequestContext<'_>,
        plan: &Plan,
        subquery: &str,
        keyspace: &str,
        shard: &str,
        ksid: &KeyspaceId,
    ) -> Result<(), RouterError> {
        ctx.ensure_live()?;
        let shard = shard.to_owned();
        let result = self
            .scatter
            .execute(
                ctx.token(),
                subquery,
                &ctx.bind_vars,
                keyspace,
                slice::from_ref(&shard),
                ctx.tablet_type(),
                ctx.session(),
            )
            .await?;
        if result.rows.is_empty() {
            return Ok(());
        }

        let owned = &plan.table.owned;
        for row in &result.rows {
            if row.len() != owned.len() {
                return Err(RouterError::PlanShape(format!(
                    "vindex subquery returned {} columns, table {} owns {}",
                    row.len(),
                    plan.table.name,
                    owned.len()
                )));
            }
        }

        for (idx, col_vindex) in owned.iter().enumerate() {
            let mut values: Vec<BindValue> = Vec::new();
            for row in &result.rows {
                let value = row[idx].clone().normalized();
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            require(col_vindex, Capability::DELETE, "delete")?;
            ctx.ensure_live()?;
            col_vindex.vindex.delete(ctx, &values, ksid).await?;
        }
        Ok(())
    }

    /// InsertSharded: the ordered ColVindex list is the index-maintenance
    /// plan. The primary image routes the row; secondaries are created,
    /// generated, verified, or reverse-mapped to stay consistent with it.
    #[instrument(level = Level::TRACE, skip_all, fields(table = %plan.table.name), err)]
    pub(crate) async fn exec_insert_sharded(
        &self,
        plan: &Plan,
        ctx: &mut RequestContext<'_>,
    ) -> Result<QueryResult, RouterError> {
        let input = self.plan_keys(plan, ctx)?;
        let table = &plan.table;
        let Some(primary) = table.primary() else {
            return Err(RouterError::PlanShape(format!(
                "insert-sharded plan for table {} without column vindexes",
                table.name
            )));
        };
        if input.len() != table.col_vindexes.len() {
            return Err(RouterError::PlanShape(format!(
                "{} values for {} column vindexes of table {}",
                input.len(),
                table.col_vindexes.len(),
                table.name
            )));
        }

        let mut generated = None;
        let mut input = input.into_iter();
        let primary_value = input.next().unwrap_or(BindValue::Null);
        let ksid = self
            .handle_primary(ctx, primary_value, primary, &mut generated)
            .await?;

        let (keyspace, shards) = self.keyspace_shards(ctx, &table.keyspace.name).await?;
        let shard = shard_for_keyspace_id(&keyspace, &shards, &ksid)?;

        for (value, col_vindex) in input.zip(table.col_vindexes.iter().skip(1)) {
            self.handle_non_primary(ctx, value, col_vindex, &ksid, &mut generated)
                .await?;
        }

        ctx.bind_vars
            .insert(KEYSPACE_ID_VAR.to_owned(), BindValue::Text(ksid.hex()));
        let sql = with_routing_comment(&plan.rewritten, &ksid);
        ctx.ensure_live()?;
        let mut result = self
            .scatter
            .execute(
                ctx.token(),
                &sql,
                &ctx.bind_vars,
                &keyspace,
                slice::from_ref(&shard),
                ctx.tablet_type(),
                ctx.session(),
            )
            .await?;

        if let Some(value) = generated {
            if result.insert_id != 0 {
                return Err(RouterError::InsertIdConflict);
            }
            result.insert_id = value as u64;
        }
        Ok(result)
    }

    /// The primary image decides the shard. Owned primaries register (or
    /// allocate) their value before mapping; a `MinKey` image on insert is
    /// an error, never a no-op.
    async fn handle_primary(
        &self,
        ctx: &mut RequestContext<'_>,
        value: BindValue,
        col_vindex: &ColVindex,
        generated: &mut Option<i64>,
    ) -> Result<KeyspaceId, RouterError> {
        let value = if col_vindex.owned {
            if value.is_null() {
                self.generate_value(ctx, col_vindex, None, generated).await?
            } else {
                require(col_vindex, Capability::CREATE, "create")?;
                ctx.ensure_live()?;
                col_vindex.vindex.create(&*ctx, &value, None).await?;
                value
            }
        } else {
            if value.is_null() {
                return Err(RouterError::PlanShape(format!(
                    "no value supplied for primary vindex column {}",
                    col_vindex.column
                )));
            }
            value
        };

        ctx.ensure_live()?;
        let mapped = col_vindex
            .vindex
            .map(&*ctx, slice::from_ref(&value))
            .await?;
        let ksid = match mapped.as_slice() {
            [Mapped::Unique(ksid)] => ksid.clone(),
            other => {
                return Err(RouterError::PlanShape(format!(
                    "primary vindex {} must map uniquely, produced {other:?}",
                    col_vindex.name
                )))
            }
        };
        if ksid.is_min() {
            return Err(RouterError::UnroutableInsert {
                column: col_vindex.column.clone(),
            });
        }

        ctx.bind_vars.insert(echo_name(&col_vindex.column), value);
        Ok(ksid)
    }

    /// Four cases, owned x value-supplied, keep a secondary consistent with
    /// the primary keyspace id.
    async fn handle_non_primary(
        &self,
        ctx: &mut RequestContext<'_>,
        value: BindValue,
        col_vindex: &ColVindex,
        ksid: &KeyspaceId,
        generated: &mut Option<i64>,
    ) -> Result<(), RouterError> {
        let value = if col_vindex.owned {
            if value.is_null() {
                self.generate_value(ctx, col_vindex, Some(ksid), generated)
                    .await?
            } else {
                require(col_vindex, Capability::CREATE, "create")?;
                ctx.ensure_live()?;
                col_vindex.vindex.create(&*ctx, &value, Some(ksid)).await?;
                value
            }
        } else if value.is_null() {
            require(col_vindex, Capability::REVERSE_MAP, "reverse_map")?;
            ctx.ensure_live()?;
            col_vindex.vindex.reverse_map(&*ctx, ksid).await?
        } else {
            require(col_vindex, Capability::VERIFY, "verify")?;
            ctx.ensure_live()?;
            let consistent = col_vindex.vindex.verify(&*ctx, &value, ksid).await?;
            if !consistent {
                return Err(RouterError::VerifyFailed {
                    column: col_vindex.column.clone(),
                    ksid: ksid.hex(),
                });
            }
            value
        };

        ctx.bind_vars.insert(echo_name(&col_vindex.column), value);
        Ok(())
    }

    /// An insert allocates at most one value across all its ColVindexes.
    async fn generate_value(
        &self,
        ctx: &mut RequestContext<'_>,
        col_vindex: &ColVindex,
        ksid: Option<&KeyspaceId>,
        generated: &mut Option<i64>,
    ) -> Result<BindValue, RouterError> {
        if generated.is_some() {
            return Err(RouterError::MultipleGenerated);
        }
        require(col_vindex, Capability::GENERATE, "generate")?;
        ctx.ensure_live()?;
        let fresh = col_vindex.vindex.generate(&*ctx, ksid).await?;
        *generated = Some(fresh);
        Ok(BindValue::Int(fresh))
    }
}
