pub mod collection;
pub mod cursor;
pub mod dsl;
pub mod pipeline;
pub mod plan;
pub mod strategy;
pub mod visibility;

mod error;

pub use collection::Collection;
pub use error::{Error, Result};

/// A stored document. Every document carries its id under [`pipeline::ID_FIELD`].
pub type Document = serde_json::Map<String, serde_json::Value>;
