use std::fmt;

use async_trait::async_trait;
use bitflags::bitflags;

use crate::{
    error::RouterError,
    query::{BindValue, BindVars, QueryResult},
    topo::KeyspaceId,
};

pub mod hash;
pub mod lookup;

pub use self::{
    hash::{BitHash, SeaHash},
    lookup::{LookupNonUnique, LookupUnique},
};

bitflags! {
    /// The operations a vindex declares. `MAP` is always present; executors
    /// check the rest before dispatching and surface a descriptive
    /// [`RouterError::CapabilityMissing`] on mismatch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capability: u8 {
        const MAP = 1;
        const REVERSE_MAP = 1 << 1;
        const VERIFY = 1 << 2;
        const CREATE = 1 << 3;
        const DELETE = 1 << 4;
        const GENERATE = 1 << 5;
    }
}

/// The keyspace-id image of one mapped value.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    /// Unique-cardinality vindexes produce exactly one image per value;
    /// `MinKey` marks the value as unroutable.
    Unique(KeyspaceId),
    /// Non-unique vindexes fan a value out to any number of images.
    NonUnique(Vec<KeyspaceId>),
}

/// Callback surface handed to vindexes. Table-backed vindexes use it to run
/// their own routed statements; it is implemented by the per-request context
/// so cancellation and session travel with the callback.
#[async_trait]
pub trait VCursor: Send + Sync {
    async fn execute(&self, sql: &str, bind_vars: &BindVars) -> Result<QueryResult, RouterError>;
}

/// A named mapping between a column value and one or more keyspace ids.
#[async_trait]
pub trait Vindex: Send + Sync + fmt::Debug {
    /// Static name of the vindex class, used in capability errors.
    fn type_name(&self) -> &'static str;

    fn capabilities(&self) -> Capability;

    /// Unique cardinality: each value maps to at most one keyspace id.
    fn unique(&self) -> bool;

    /// Maps each key to its keyspace-id image, preserving order and arity.
    async fn map(&self, cursor: &dyn VCursor, keys: &[BindValue])
        -> Result<Vec<Mapped>, RouterError>;

    /// Checks that `value` is consistent with `ksid`.
    async fn verify(
        &self,
        _cursor: &dyn VCursor,
        _value: &BindValue,
        _ksid: &KeyspaceId,
    ) -> Result<bool, RouterError> {
        Err(unsupported(self.type_name(), "verify"))
    }

    /// Recovers the column value from a keyspace id.
    async fn reverse_map(
        &self,
        _cursor: &dyn VCursor,
        _ksid: &KeyspaceId,
    ) -> Result<BindValue, RouterError> {
        Err(unsupported(self.type_name(), "reverse_map"))
    }

    /// Records a new entry for `value`. Owned lookup vindexes receive the
    /// row's keyspace id; functional ones receive `None`.
    async fn create(
        &self,
        _cursor: &dyn VCursor,
        _value: &BindValue,
        _ksid: Option<&KeyspaceId>,
    ) -> Result<(), RouterError> {
        Err(unsupported(self.type_name(), "create"))
    }

    /// Removes the entries keyed by `values` that point at `ksid`.
    async fn delete(
        &self,
        _cursor: &dyn VCursor,
        _values: &[BindValue],
        _ksid: &KeyspaceId,
    ) -> Result<(), RouterError> {
        Err(unsupported(self.type_name(), "delete"))
    }

    /// Allocates a fresh value, bound to `ksid` for lookup generators.
    async fn generate(
        &self,
        _cursor: &dyn VCursor,
        _ksid: Option<&KeyspaceId>,
    ) -> Result<i64, RouterError> {
        Err(unsupported(self.type_name(), "generate"))
    }
}

fn unsupported(vindex: &'static str, operation: &'static str) -> RouterError {
    RouterError::CapabilityMissing { vindex, operation }
}
