use thiserror::Error;

/// An error produced while routing a statement.
///
/// Nothing here is retried by the router itself; retry policy belongs to the
/// caller. Errors raised by the scatter executor or by vindex callbacks are
/// passed through unchanged.
#[derive(Error, Debug)]
pub enum RouterError {
    /// A bind variable referenced by the plan is absent from the query
    #[error("missing bind variable {0}")]
    BindVarMissing(String),

    /// The topology service could not answer a shard lookup
    #[error("topology lookup failed for keyspace {keyspace}: {reason}")]
    Topology { keyspace: String, reason: String },

    /// A keyspace id fell outside every shard range of its keyspace
    #[error("keyspace id {ksid} is not covered by any shard of {keyspace}")]
    NoShardForKeyspaceId { keyspace: String, ksid: String },

    /// An unsharded keyspace reported more than one shard
    #[error("unsharded keyspace {keyspace} has multiple shards")]
    UnshardedMultiShard { keyspace: String },

    /// A keyrange predicate resolved to zero or several shards
    #[error("keyrange must match exactly one shard: {start}-{end} matched {matched}")]
    KeyrangeShardCount {
        start: String,
        end: String,
        matched: usize,
    },

    /// A keyrange endpoint that is not a hex keyspace id
    #[error("malformed keyrange endpoint {0}")]
    KeyrangeEndpoint(String),

    /// A vindex could not map a value to a keyspace id
    #[error("vindex {vindex} could not map value: {reason}")]
    VindexMap { vindex: String, reason: String },

    /// A supplied column value is inconsistent with the row's keyspace id
    #[error("value for column {column} does not verify against keyspace id {ksid}")]
    VerifyFailed { column: String, ksid: String },

    /// The primary vindex mapped an inserted row to the unroutable MinKey
    #[error("could not map insert value for column {column} to a keyspace id")]
    UnroutableInsert { column: String },

    /// More than one owned column vindex produced a generated value
    #[error("more than one owned column vindex generated a value")]
    MultipleGenerated,

    /// A router-generated value collided with an insert id from the backend
    #[error("generated value conflicts with the insert id returned by the backend")]
    InsertIdConflict,

    /// An operation was requested from a vindex that does not declare it
    #[error("vindex {vindex} does not support {operation}")]
    CapabilityMissing {
        vindex: &'static str,
        operation: &'static str,
    },

    /// The plan shape does not match what the executor expects
    #[error("unexpected plan shape: {0}")]
    PlanShape(String),

    /// The request context was cancelled
    #[error("request cancelled")]
    Cancelled,

    /// An error raised by the scatter executor or a vindex callback
    #[error(transparent)]
    External(#[from] eyre::Report),
}
