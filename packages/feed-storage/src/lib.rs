pub mod db;
pub mod executor;
pub mod memory;
pub mod pg;
pub mod qdrant;
pub mod schema;
pub mod store;

mod error;

pub use error::Error;
pub use store::{BoxFuture, DocumentStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;
