use derive_more::{Deref, DerefMut};
use indexmap::IndexMap;

use crate::{
    error::RouterError,
    plan::BIND_VAR_SENTINEL,
    query::{BindValue, BindVars},
    router::{RequestContext, Router},
    schema::ColVindex,
    topo::{shard_for_keyspace_id, KeyspaceId, Shard},
    vindex::Mapped,
};

/// Per-shard grouping of the input keys that routed there, in shard
/// resolution order. Feeds the per-shard IN-list bind bundles.
#[derive(Debug, Clone, Default, PartialEq, Deref, DerefMut)]
pub struct RoutingMap(pub IndexMap<String, Vec<BindValue>>);

/// Substitutes bind-var references and normalizes byte strings, preserving
/// order and arity.
pub(crate) fn resolve_keys(
    values: &[BindValue],
    bind_vars: &BindVars,
) -> Result<Vec<BindValue>, RouterError> {
    values
        .iter()
        .map(|item| match item {
            BindValue::Text(text) => match text.strip_prefix(BIND_VAR_SENTINEL) {
                Some(name) => bind_vars
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RouterError::BindVarMissing(name.to_owned())),
                None => Ok(item.clone()),
            },
            BindValue::Bytes(_) => Ok(item.clone().normalized()),
            other => Ok(other.clone()),
        })
        .collect()
}

impl Router {
    /// Maps `keys` through the plan's vindex and groups them by the shard
    /// their keyspace ids land on. Unroutable (`MinKey`) images are
    /// skipped; non-unique vindexes fan one key out to several shards.
    pub(crate) async fn resolve_shards(
        &self,
        ctx: &RequestContext<'_>,
        keyspace: &str,
        col_vindex: &ColVindex,
        keys: &[BindValue],
    ) -> Result<(String, RoutingMap), RouterError> {
        let (keyspace, shards) = self.keyspace_shards(ctx, keyspace).await?;
        ctx.ensure_live()?;
        let mapped = col_vindex.vindex.map(ctx, keys).await?;
        if mapped.len() != keys.len() {
            return Err(RouterError::PlanShape(format!(
                "vindex {} returned {} images for {} keys",
                col_vindex.name,
                mapped.len(),
                keys.len()
            )));
        }

        let mut routing = RoutingMap::default();
        for (key, image) in keys.iter().zip(mapped) {
            match image {
                Mapped::Unique(ksid) => {
                    route_key(&keyspace, &shards, &mut routing, key, ksid)?;
                }
                Mapped::NonUnique(ksids) => {
                    for ksid in ksids {
                        route_key(&keyspace, &shards, &mut routing, key, ksid)?;
                    }
                }
            }
        }
        Ok((keyspace, routing))
    }

    /// Resolves the single shard an equal-predicate DML targets. The
    /// vindex must be unique; a `MinKey` image comes back with an empty
    /// shard name, signalling a no-op to the caller.
    pub(crate) async fn resolve_single_shard(
        &self,
        ctx: &RequestContext<'_>,
        keyspace: &str,
        col_vindex: &ColVindex,
        key: &BindValue,
    ) -> Result<(String, String, KeyspaceId), RouterError> {
        if !col_vindex.vindex.unique() {
            return Err(RouterError::PlanShape(format!(
                "vindex {} must be unique to route a single shard",
                col_vindex.name
            )));
        }
        let (keyspace, shards) = self.keyspace_shards(ctx, keyspace).await?;
        ctx.ensure_live()?;
        let mapped = col_vindex.vindex.map(ctx, std::slice::from_ref(key)).await?;
        let ksid = match mapped.as_slice() {
            [Mapped::Unique(ksid)] => ksid.clone(),
            other => {
                return Err(RouterError::PlanShape(format!(
                    "unique vindex {} produced {other:?}",
                    col_vindex.name
                )))
            }
        };
        if ksid.is_min() {
            return Ok((keyspace, String::new(), ksid));
        }
        let shard = shard_for_keyspace_id(&keyspace, &shards, &ksid)?;
        Ok((keyspace, shard, ksid))
    }
}

fn route_key(
    keyspace: &str,
    shards: &[Shard],
    routing: &mut RoutingMap,
    key: &BindValue,
    ksid: KeyspaceId,
) -> Result<(), RouterError> {
    if ksid.is_min() {
        return Ok(());
    }
    let shard = shard_for_keyspace_id(keyspace, shards, &ksid)?;
    let keys = routing.entry(shard).or_default();
    if !keys.contains(key) {
        keys.push(key.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_resolve_in_order() {
        let mut bind_vars = BindVars::new();
        bind_vars.insert("id".to_owned(), BindValue::Int(7));

        let keys = resolve_keys(
            &[
                BindValue::Text(":id".to_owned()),
                BindValue::Bytes(b"bob".to_vec()),
                BindValue::Int(3),
            ],
            &bind_vars,
        )
        .unwrap();

        assert_eq!(
            keys,
            vec![
                BindValue::Int(7),
                BindValue::Text("bob".to_owned()),
                BindValue::Int(3),
            ]
        );
    }

    #[test]
    fn missing_bind_var_is_an_error() {
        let err = resolve_keys(&[BindValue::Text(":nope".to_owned())], &BindVars::new())
            .unwrap_err();
        assert!(matches!(err, RouterError::BindVarMissing(name) if name == "nope"));
    }
}
