use std::sync::Arc;

use eyre::{bail, eyre, WrapErr};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::vindex::{BitHash, LookupNonUnique, LookupUnique, SeaHash, Vindex};

/// The vschema document: keyspaces, their vindex definitions, and the
/// column-to-vindex bindings of every table. Loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VSchema {
    pub keyspaces: IndexMap<String, KeyspaceDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyspaceDef {
    #[serde(default)]
    pub sharded: bool,
    #[serde(default)]
    pub vindexes: IndexMap<String, VindexDef>,
    #[serde(default)]
    pub tables: IndexMap<String, TableDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VindexDef {
    #[serde(rename = "type")]
    pub kind: String,
    /// Table that maintains this vindex's entries during its own DML.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub params: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableDef {
    /// Ordered; the first entry routes the row, the rest must stay
    /// consistent with it.
    #[serde(default)]
    pub col_vindexes: Vec<ColVindexDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColVindexDef {
    pub column: String,
    pub name: String,
}

/// A named keyspace; unsharded keyspaces hold exactly one shard, which the
/// router enforces at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    pub name: String,
    pub sharded: bool,
}

/// The binding of one table column to a vindex.
#[derive(Debug)]
pub struct ColVindex {
    pub column: String,
    pub name: String,
    pub owned: bool,
    pub vindex: Arc<dyn Vindex>,
}

/// A routed table: its keyspace, its ordered ColVindexes, and the owned
/// non-primary ColVindexes whose backing entries this table maintains.
#[derive(Debug)]
pub struct Table {
    pub name: String,
    pub keyspace: Keyspace,
    pub col_vindexes: Vec<Arc<ColVindex>>,
    pub owned: Vec<Arc<ColVindex>>,
}

impl Table {
    pub fn primary(&self) -> Option<&Arc<ColVindex>> {
        self.col_vindexes.first()
    }
}

/// Resolved schema: every table of every keyspace, vindexes instantiated.
/// Table names are unique across keyspaces.
#[derive(Debug, Default)]
pub struct Schema {
    tables: IndexMap<String, Arc<Table>>,
}

impl Schema {
    pub fn from_json(text: &str) -> eyre::Result<Self> {
        let vschema: VSchema = serde_json::from_str(text).wrap_err("parsing vschema")?;
        Self::build(&vschema)
    }

    pub fn build(vschema: &VSchema) -> eyre::Result<Self> {
        let mut tables = IndexMap::new();

        for (keyspace_name, keyspace_def) in &vschema.keyspaces {
            let keyspace = Keyspace {
                name: keyspace_name.clone(),
                sharded: keyspace_def.sharded,
            };

            let mut vindexes: IndexMap<String, Arc<dyn Vindex>> = IndexMap::new();
            for (name, def) in &keyspace_def.vindexes {
                let vindex = build_vindex(def)
                    .wrap_err_with(|| format!("building vindex {keyspace_name}.{name}"))?;
                vindexes.insert(name.clone(), vindex);
            }

            for (table_name, table_def) in &keyspace_def.tables {
                let mut col_vindexes = Vec::with_capacity(table_def.col_vindexes.len());
                for cv in &table_def.col_vindexes {
                    let vindex = vindexes.get(&cv.name).ok_or_else(|| {
                        eyre!("table {table_name} references unknown vindex {}", cv.name)
                    })?;
                    let owner = keyspace_def
                        .vindexes
                        .get(&cv.name)
                        .and_then(|def| def.owner.as_deref());
                    col_vindexes.push(Arc::new(ColVindex {
                        column: cv.column.clone(),
                        name: cv.name.clone(),
                        owned: owner == Some(table_name.as_str()),
                        vindex: Arc::clone(vindex),
                    }));
                }

                let owned = col_vindexes
                    .iter()
                    .skip(1)
                    .filter(|cv| cv.owned)
                    .map(Arc::clone)
                    .collect();

                let table = Arc::new(Table {
                    name: table_name.clone(),
                    keyspace: keyspace.clone(),
                    col_vindexes,
                    owned,
                });

                if tables.insert(table_name.clone(), table).is_some() {
                    bail!("table {table_name} is defined in more than one keyspace");
                }
            }
        }

        Ok(Self { tables })
    }

    pub fn table(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables.get(name)
    }
}

fn build_vindex(def: &VindexDef) -> eyre::Result<Arc<dyn Vindex>> {
    let param = |key: &str| -> eyre::Result<&str> {
        def.params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| eyre!("missing param {key:?}"))
    };

    Ok(match def.kind.as_str() {
        "bit_hash" => match (def.params.get("table"), def.params.get("column")) {
            (Some(table), Some(column)) => Arc::new(BitHash::with_table(table, column)),
            (None, None) => Arc::new(BitHash::new()),
            _ => bail!("bit_hash needs both table and column params, or neither"),
        },
        "sea_hash" => Arc::new(SeaHash),
        "lookup_unique" => Arc::new(LookupUnique::new(
            param("table")?,
            param("from")?,
            param("to")?,
        )),
        "lookup_nonunique" => Arc::new(LookupNonUnique::new(
            param("table")?,
            param("from")?,
            param("to")?,
        )),
        other => bail!("unknown vindex type {other:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VSCHEMA: &str = r#"{
        "keyspaces": {
            "main": {
                "sharded": true,
                "vindexes": {
                    "user_index": {
                        "type": "bit_hash",
                        "owner": "user",
                        "params": {"table": "user_seq", "column": "id"}
                    },
                    "name_user_map": {
                        "type": "lookup_nonunique",
                        "owner": "user",
                        "params": {"table": "name_user_map", "from": "name", "to": "keyspace_id"}
                    },
                    "nick_index": {"type": "sea_hash"}
                },
                "tables": {
                    "user": {
                        "col_vindexes": [
                            {"column": "id", "name": "user_index"},
                            {"column": "name", "name": "name_user_map"}
                        ]
                    },
                    "user_extra": {
                        "col_vindexes": [
                            {"column": "user_id", "name": "user_index"},
                            {"column": "nickname", "name": "nick_index"}
                        ]
                    }
                }
            },
            "lookup": {
                "tables": {"name_user_map": {}}
            }
        }
    }"#;

    #[test]
    fn builds_ownership() {
        let schema = Schema::from_json(VSCHEMA).unwrap();

        let user = schema.table("user").unwrap();
        assert!(user.keyspace.sharded);
        assert!(user.col_vindexes[0].owned);
        assert!(user.col_vindexes[1].owned);
        // only non-primary owned vindexes take part in delete cleanup
        assert_eq!(user.owned.len(), 1);
        assert_eq!(user.owned[0].column, "name");

        let extra = schema.table("user_extra").unwrap();
        assert!(!extra.col_vindexes[0].owned);
        assert!(!extra.col_vindexes[1].owned);
        assert!(extra.col_vindexes[1].vindex.unique());

        let map = schema.table("name_user_map").unwrap();
        assert!(!map.keyspace.sharded);
        assert!(map.col_vindexes.is_empty());
    }

    #[test]
    fn rejects_unknown_vindex_reference() {
        let text = r#"{
            "keyspaces": {
                "main": {
                    "sharded": true,
                    "tables": {
                        "user": {"col_vindexes": [{"column": "id", "name": "nope"}]}
                    }
                }
            }
        }"#;
        let err = Schema::from_json(text).unwrap_err();
        assert!(err.to_string().contains("unknown vindex"));
    }

    #[test]
    fn rejects_unknown_vindex_type() {
        let text = r#"{
            "keyspaces": {
                "main": {
                    "vindexes": {"v": {"type": "mystery"}},
                    "tables": {}
                }
            }
        }"#;
        let err = Schema::from_json(text).unwrap_err();
        assert!(format!("{err:?}").contains("unknown vindex type"));
    }
}
