//! Process variables: values, metadata, schemas and the value store.

pub mod metadata;
pub mod schema;
pub mod store;
pub mod value;

pub use metadata::PvMetadata;
pub use schema::{PvSchema, PvSpec, RBV_SUFFIX};
pub use store::{MemoryStore, PvError, PvSnapshot, ValueStore};
pub use value::{PvKind, PvValue};
