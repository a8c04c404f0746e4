use async_trait::async_trait;

use crate::{
    error::RouterError,
    query::{BindValue, BindVars},
    topo::KeyspaceId,
    vindex::{Capability, Mapped, VCursor, Vindex},
};

const MULTIPLIER: u64 = 0x9e37_79b9_7f4a_7c15;
const MULTIPLIER_INV: u64 = mul_inverse(MULTIPLIER);

/// Modular inverse of an odd 64-bit multiplier by Newton iteration; five
/// rounds reach full width from the 3-bit seed `a`.
const fn mul_inverse(a: u64) -> u64 {
    let mut x = a;
    let mut i = 0;
    while i < 5 {
        x = x.wrapping_mul(2u64.wrapping_sub(a.wrapping_mul(x)));
        i += 1;
    }
    x
}

fn mix(value: u64) -> u64 {
    let z = value ^ (value >> 32);
    let z = z.wrapping_mul(MULTIPLIER);
    z ^ (z >> 32)
}

fn unmix(value: u64) -> u64 {
    let z = value ^ (value >> 32);
    let z = z.wrapping_mul(MULTIPLIER_INV);
    z ^ (z >> 32)
}

fn numeric(type_name: &'static str, value: &BindValue) -> Result<u64, RouterError> {
    match value {
        BindValue::Int(v) => Ok(*v as u64),
        BindValue::UInt(v) => Ok(*v),
        other => Err(RouterError::VindexMap {
            vindex: type_name.to_owned(),
            reason: format!("unexpected non-numeric value {other:?}"),
        }),
    }
}

/// Functional, unique, reversible vindex over numeric columns: the keyspace
/// id is an invertible bit mix of the value. With a backing autoincrement
/// table it also owns the id allocation for its column.
#[derive(Debug, Clone)]
pub struct BitHash {
    backing: Option<AutoincTable>,
}

#[derive(Debug, Clone)]
struct AutoincTable {
    table: String,
    column: String,
}

impl BitHash {
    pub fn new() -> Self {
        Self { backing: None }
    }

    pub fn with_table(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            backing: Some(AutoincTable {
                table: table.into(),
                column: column.into(),
            }),
        }
    }

    fn backing(&self, operation: &'static str) -> Result<&AutoincTable, RouterError> {
        self.backing
            .as_ref()
            .ok_or(RouterError::CapabilityMissing {
                vindex: "bit_hash",
                operation,
            })
    }

    fn image(&self, value: &BindValue) -> Result<KeyspaceId, RouterError> {
        Ok(KeyspaceId::from_u64(mix(numeric(self.type_name(), value)?)))
    }
}

impl Default for BitHash {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Vindex for BitHash {
    fn type_name(&self) -> &'static str {
        "bit_hash"
    }

    fn capabilities(&self) -> Capability {
        let pure = Capability::MAP | Capability::REVERSE_MAP | Capability::VERIFY;
        if self.backing.is_some() {
            pure | Capability::CREATE | Capability::DELETE | Capability::GENERATE
        } else {
            pure
        }
    }

    fn unique(&self) -> bool {
        true
    }

    async fn map(
        &self,
        _cursor: &dyn VCursor,
        keys: &[BindValue],
    ) -> Result<Vec<Mapped>, RouterError> {
        keys.iter()
            .map(|key| Ok(Mapped::Unique(self.image(key)?)))
            .collect()
    }

    async fn verify(
        &self,
        _cursor: &dyn VCursor,
        value: &BindValue,
        ksid: &KeyspaceId,
    ) -> Result<bool, RouterError> {
        Ok(self.image(value)? == *ksid)
    }

    async fn reverse_map(
        &self,
        _cursor: &dyn VCursor,
        ksid: &KeyspaceId,
    ) -> Result<BindValue, RouterError> {
        let raw = ksid.to_u64().ok_or_else(|| RouterError::VindexMap {
            vindex: self.type_name().to_owned(),
            reason: format!("keyspace id {ksid} has no numeric form"),
        })?;
        Ok(BindValue::UInt(unmix(raw)))
    }

    async fn create(
        &self,
        cursor: &dyn VCursor,
        value: &BindValue,
        _ksid: Option<&KeyspaceId>,
    ) -> Result<(), RouterError> {
        let AutoincTable { table, column } = self.backing("create")?;
        let sql = format!("insert into {table}({column}) values(:{column})");
        let mut bind_vars = BindVars::new();
        bind_vars.insert(column.clone(), value.clone());
        cursor.execute(&sql, &bind_vars).await?;
        Ok(())
    }

    async fn delete(
        &self,
        cursor: &dyn VCursor,
        values: &[BindValue],
        _ksid: &KeyspaceId,
    ) -> Result<(), RouterError> {
        let AutoincTable { table, column } = self.backing("delete")?;
        let sql = format!("delete from {table} where {column} = :{column}");
        for value in values {
            let mut bind_vars = BindVars::new();
            bind_vars.insert(column.clone(), value.clone());
            cursor.execute(&sql, &bind_vars).await?;
        }
        Ok(())
    }

    async fn generate(
        &self,
        cursor: &dyn VCursor,
        _ksid: Option<&KeyspaceId>,
    ) -> Result<i64, RouterError> {
        let AutoincTable { table, column } = self.backing("generate")?;
        let sql = format!("insert into {table}({column}) values(null)");
        let result = cursor.execute(&sql, &BindVars::new()).await?;
        Ok(result.insert_id as i64)
    }
}

/// Functional, unique, one-way vindex hashing the value bytes with seahash.
/// Suits text columns that only ever route forward.
#[derive(Debug, Clone, Default)]
pub struct SeaHash;

impl SeaHash {
    fn image(&self, value: &BindValue) -> Result<KeyspaceId, RouterError> {
        let raw = match value {
            BindValue::Text(text) => text.as_bytes().to_vec(),
            BindValue::Bytes(raw) => raw.clone(),
            BindValue::Int(v) => v.to_be_bytes().to_vec(),
            BindValue::UInt(v) => v.to_be_bytes().to_vec(),
            other => {
                return Err(RouterError::VindexMap {
                    vindex: "sea_hash".to_owned(),
                    reason: format!("unhashable value {other:?}"),
                })
            }
        };
        Ok(KeyspaceId::from_u64(seahash::hash(&raw)))
    }
}

#[async_trait]
impl Vindex for SeaHash {
    fn type_name(&self) -> &'static str {
        "sea_hash"
    }

    fn capabilities(&self) -> Capability {
        Capability::MAP | Capability::VERIFY
    }

    fn unique(&self) -> bool {
        true
    }

    async fn map(
        &self,
        _cursor: &dyn VCursor,
        keys: &[BindValue],
    ) -> Result<Vec<Mapped>, RouterError> {
        keys.iter()
            .map(|key| Ok(Mapped::Unique(self.image(key)?)))
            .collect()
    }

    async fn verify(
        &self,
        _cursor: &dyn VCursor,
        value: &BindValue,
        ksid: &KeyspaceId,
    ) -> Result<bool, RouterError> {
        Ok(self.image(value)? == *ksid)
    }
}
