use async_trait::async_trait;
use futures::future::try_join_all;

use crate::{
    error::RouterError,
    query::{BindValue, BindVars},
    topo::KeyspaceId,
    vindex::{Capability, Mapped, VCursor, Vindex},
};

/// The backing table of a lookup vindex: `from` holds the column value,
/// `to` holds the keyspace id as lowercase hex text.
#[derive(Debug, Clone)]
struct LookupTable {
    table: String,
    from: String,
    to: String,
}

impl LookupTable {
    fn bind(column: &str, value: &BindValue) -> BindVars {
        let mut bind_vars = BindVars::new();
        bind_vars.insert(column.to_owned(), value.clone());
        bind_vars
    }

    fn ksid_cell(&self, type_name: &'static str, cell: &BindValue) -> Result<KeyspaceId, RouterError> {
        match cell {
            BindValue::Text(hex) => {
                KeyspaceId::from_hex(hex).map_err(|err| RouterError::VindexMap {
                    vindex: type_name.to_owned(),
                    reason: format!("bad keyspace id in {}.{}: {err}", self.table, self.to),
                })
            }
            BindValue::Bytes(raw) => Ok(KeyspaceId::from_bytes(raw.clone())),
            other => Err(RouterError::VindexMap {
                vindex: type_name.to_owned(),
                reason: format!("unexpected keyspace id cell {other:?}"),
            }),
        }
    }

    async fn lookup(
        &self,
        type_name: &'static str,
        cursor: &dyn VCursor,
        key: &BindValue,
    ) -> Result<Vec<KeyspaceId>, RouterError> {
        let Self { table, from, to } = self;
        let sql = format!("select {to} from {table} where {from} = :{from}");
        let result = cursor.execute(&sql, &Self::bind(from, key)).await?;
        result
            .rows
            .iter()
            .map(|row| {
                let cell = row.first().ok_or_else(|| RouterError::VindexMap {
                    vindex: type_name.to_owned(),
                    reason: format!("empty row from {table}"),
                })?;
                self.ksid_cell(type_name, cell)
            })
            .collect()
    }

    async fn verify(
        &self,
        cursor: &dyn VCursor,
        value: &BindValue,
        ksid: &KeyspaceId,
    ) -> Result<bool, RouterError> {
        let Self { table, from, to } = self;
        let sql = format!("select {from} from {table} where {from} = :{from} and {to} = :{to}");
        let mut bind_vars = Self::bind(from, value);
        bind_vars.insert(to.clone(), BindValue::Text(ksid.hex()));
        let result = cursor.execute(&sql, &bind_vars).await?;
        Ok(!result.rows.is_empty())
    }

    async fn create(
        &self,
        cursor: &dyn VCursor,
        value: &BindValue,
        ksid: &KeyspaceId,
    ) -> Result<(), RouterError> {
        let Self { table, from, to } = self;
        let sql = format!("insert into {table}({from}, {to}) values(:{from}, :{to})");
        let mut bind_vars = Self::bind(from, value);
        bind_vars.insert(to.clone(), BindValue::Text(ksid.hex()));
        cursor.execute(&sql, &bind_vars).await?;
        Ok(())
    }

    async fn delete(
        &self,
        cursor: &dyn VCursor,
        values: &[BindValue],
        ksid: &KeyspaceId,
    ) -> Result<(), RouterError> {
        let Self { table, from, to } = self;
        let sql = format!("delete from {table} where {from} = :{from} and {to} = :{to}");
        for value in values {
            let mut bind_vars = Self::bind(from, value);
            bind_vars.insert(to.clone(), BindValue::Text(ksid.hex()));
            cursor.execute(&sql, &bind_vars).await?;
        }
        Ok(())
    }

    async fn generate(&self, cursor: &dyn VCursor, ksid: &KeyspaceId) -> Result<i64, RouterError> {
        let Self { table, to, .. } = self;
        let sql = format!("insert into {table}({to}) values(:{to})");
        let bind_vars = Self::bind(to, &BindValue::Text(ksid.hex()));
        let result = cursor.execute(&sql, &bind_vars).await?;
        Ok(result.insert_id as i64)
    }
}

/// Table-backed vindex where each value maps to at most one keyspace id.
/// Supports the full owned lifecycle including backend-allocated values.
#[derive(Debug, Clone)]
pub struct LookupUnique {
    inner: LookupTable,
}

impl LookupUnique {
    pub fn new(table: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            inner: LookupTable {
                table: table.into(),
                from: from.into(),
                to: to.into(),
            },
        }
    }
}

#[async_trait]
impl Vindex for LookupUnique {
    fn type_name(&self) -> &'static str {
        "lookup_unique"
    }

    fn capabilities(&self) -> Capability {
        Capability::MAP
            | Capability::VERIFY
            | Capability::CREATE
            | Capability::DELETE
            | Capability::GENERATE
    }

    fn unique(&self) -> bool {
        true
    }

    async fn map(
        &self,
        cursor: &dyn VCursor,
        keys: &[BindValue],
    ) -> Result<Vec<Mapped>, RouterError> {
        let images = try_join_all(
            keys.iter()
                .map(|key| self.inner.lookup(self.type_name(), cursor, key)),
        )
        .await?;

        keys.iter()
            .zip(images)
            .map(|(key, mut ksids)| match ksids.len() {
                // absent entries are unroutable, not an error
                0 => Ok(Mapped::Unique(KeyspaceId::min())),
                1 => Ok(Mapped::Unique(ksids.remove(0))),
                n => Err(RouterError::VindexMap {
                    vindex: self.type_name().to_owned(),
                    reason: format!("{n} entries for supposedly unique key {key:?}"),
                }),
            })
            .collect()
    }

    async fn verify(
        &self,
        cursor: &dyn VCursor,
        value: &BindValue,
        ksid: &KeyspaceId,
    ) -> Result<bool, RouterError> {
        self.inner.verify(cursor, value, ksid).await
    }

    async fn create(
        &self,
        cursor: &dyn VCursor,
        value: &BindValue,
        ksid: Option<&KeyspaceId>,
    ) -> Result<(), RouterError> {
        let ksid = ksid.ok_or(RouterError::CapabilityMissing {
            vindex: "lookup_unique",
            operation: "create without keyspace id",
        })?;
        self.inner.create(cursor, value, ksid).await
    }

    async fn delete(
        &self,
        cursor: &dyn VCursor,
        values: &[BindValue],
        ksid: &KeyspaceId,
    ) -> Result<(), RouterError> {
        self.inner.delete(cursor, values, ksid).await
    }

    async fn generate(
        &self,
        cursor: &dyn VCursor,
        ksid: Option<&KeyspaceId>,
    ) -> Result<i64, RouterError> {
        let ksid = ksid.ok_or(RouterError::CapabilityMissing {
            vindex: "lookup_unique",
            operation: "generate without keyspace id",
        })?;
        self.inner.generate(cursor, ksid).await
    }
}

/// Table-backed vindex where one value may point at many keyspace ids, one
/// row per id.
#[derive(Debug, Clone)]
pub struct LookupNonUnique {
    inner: LookupTable,
}

impl LookupNonUnique {
    pub fn new(table: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            inner: LookupTable {
                table: table.into(),
                from: from.into(),
                to: to.into(),
            },
        }
    }
}

#[async_trait]
impl Vindex for LookupNonUnique {
    fn type_name(&self) -> &'static str {
        "lookup_nonunique"
    }

    fn capabilities(&self) -> Capability {
        Capability::MAP | Capability::VERIFY | Capability::CREATE | Capability::DELETE
    }

    fn unique(&self) -> bool {
        false
    }

    async fn map(
        &self,
        cursor: &dyn VCursor,
        keys: &[BindValue],
    ) -> Result<Vec<Mapped>, RouterError> {
        let images = try_join_all(
            keys.iter()
                .map(|key| self.inner.lookup(self.type_name(), cursor, key)),
        )
        .await?;

        Ok(images.into_iter().map(Mapped::NonUnique).collect())
    }

    async fn verify(
        &self,
        cursor: &dyn VCursor,
        value: &BindValue,
        ksid: &KeyspaceId,
    ) -> Result<bool, RouterError> {
        self.inner.verify(cursor, value, ksid).await
    }

    async fn create(
        &self,
        cursor: &dyn VCursor,
        value: &BindValue,
        ksid: Option<&KeyspaceId>,
    ) -> Result<(), RouterError> {
        let ksid = ksid.ok_or(RouterError::CapabilityMissing {
            vindex: "lookup_nonunique",
            operation: "create without keyspace id",
        })?;
        self.inner.create(cursor, value, ksid).await
    }

    async fn delete(
        &self,
        cursor: &dyn VCursor,
        values: &[BindValue],
        ksid: &KeyspaceId,
    ) -> Result<(), RouterError> {
        self.inner.delete(cursor, values, ksid).await
    }
}
