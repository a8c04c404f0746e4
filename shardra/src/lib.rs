pub mod error;
pub mod plan;
pub mod query;
pub mod router;
pub mod scatter;
pub mod schema;
pub mod topo;
pub mod vindex;

pub use error::RouterError;
pub use router::Router;
