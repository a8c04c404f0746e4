use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

/// A single bind-variable value, MySQL flavoured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BindValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    List(Vec<BindValue>),
}

impl BindValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    /// Byte strings are interned as text wherever they are compared or
    /// echoed; invalid utf-8 stays binary.
    pub fn normalized(self) -> BindValue {
        match self {
            BindValue::Bytes(raw) => match String::from_utf8(raw) {
                Ok(text) => BindValue::Text(text),
                Err(err) => BindValue::Bytes(err.into_bytes()),
            },
            other => other,
        }
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_owned())
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Int(value)
    }
}

/// Bind variables of one statement, in binding order.
pub type BindVars = IndexMap<String, BindValue>;

/// Which tablets of a shard the statement may run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TabletType {
    Master,
    Replica,
    Rdonly,
}

/// Opaque per-connection session state. The router passes it through to the
/// scatter executor untouched; transaction bookkeeping lives there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub in_transaction: bool,
    pub shard_sessions: Vec<ShardSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSession {
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
    pub transaction_id: i64,
}

/// Nil-safe guard around the optional [`Session`] handed to the scatter
/// executor.
#[derive(Debug, Clone, Default)]
pub struct SafeSession(Option<Session>);

impl SafeSession {
    pub fn new(session: Option<Session>) -> Self {
        Self(session)
    }

    pub fn get(&self) -> Option<&Session> {
        self.0.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.0.as_ref().map(|s| s.in_transaction).unwrap_or(false)
    }

    pub fn to_inner(&self) -> Option<Session> {
        self.0.clone()
    }
}

/// An inbound statement as handed to [`crate::Router::execute`].
#[derive(Debug, Clone)]
pub struct Query {
    pub sql: String,
    /// Missing bind-var map is treated as empty.
    pub bind_vars: Option<BindVars>,
    pub tablet_type: TabletType,
    pub session: Option<Session>,
}

/// The result of one routed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub rows: Vec<Vec<BindValue>>,
    pub rows_affected: u64,
    pub insert_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ColumnType {
    Int64,
    Uint64,
    Float64,
    VarChar,
    VarBinary,
}
