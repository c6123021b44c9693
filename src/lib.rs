pub mod error;
pub mod types;

pub mod dispatch;
pub mod model;
pub mod query;
pub mod shared;
pub mod transport;

pub use dispatch::QueryHandle;
pub use error::{ModelError, Result, TransportError};
pub use model::{Entity, Item, Model, ModelRegistry};
pub use query::{DocumentQuery, MultiQuery, QueryRun};
pub use shared::SharedQuery;
pub use transport::{Store, Subscription, Transport};
pub use types::{where_, Condition, DocRef, FilterOp, QueryState, Snapshot};
