use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    error::RouterError,
    query::BindValue,
    schema::{ColVindex, Table},
};

mod cache;

pub use cache::{CachingPlanner, DEFAULT_PLAN_CACHE_CAPACITY};

/// Bind-var name the rewritten IN queries expand per shard (`::_vals`).
pub const LIST_VAR_NAME: &str = "_vals";

/// First byte of a plan value marking the rest as a bind-var name.
pub const BIND_VAR_SENTINEL: char = ':';

/// Bind var carrying the keyspace id a DML routes by.
pub const KEYSPACE_ID_VAR: &str = "keyspace_id";

/// Prefix of the bind vars echoing resolved ColVindex column values.
pub const COLUMN_ECHO_PREFIX: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum PlanKind {
    SelectUnsharded,
    SelectEqual,
    SelectIn,
    SelectKeyrange,
    SelectScatter,
    UpdateUnsharded,
    DeleteUnsharded,
    InsertUnsharded,
    UpdateEqual,
    DeleteEqual,
    InsertSharded,
}

/// The values a plan routes by: a literal, a bind-var reference (a string
/// starting with [`BIND_VAR_SENTINEL`]), or a list of such.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanValues {
    Single(BindValue),
    List(Vec<BindValue>),
}

impl PlanValues {
    pub(crate) fn as_slice(&self) -> &[BindValue] {
        match self {
            PlanValues::Single(value) => std::slice::from_ref(value),
            PlanValues::List(values) => values,
        }
    }
}

/// A plan as delivered by the upstream planner. The router never mutates
/// plans; executors only read them.
#[derive(Debug, Clone)]
pub struct Plan {
    pub kind: PlanKind,
    pub table: Arc<Table>,
    /// The ColVindex routing Equal/In/Keyrange plans.
    pub vindex: Option<Arc<ColVindex>>,
    pub rewritten: String,
    /// For DML that must read rows before owned-vindex deletion.
    pub subquery: Option<String>,
    pub values: Option<PlanValues>,
}

/// The upstream plan builder. Implementations must treat identical SQL
/// strings as the same plan; memoisation lives in [`CachingPlanner`].
pub trait Planner: Send + Sync + fmt::Debug {
    fn build_plan(&self, sql: &str) -> Result<Plan, RouterError>;
}
