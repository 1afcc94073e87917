pub mod loader;
pub use loader::{RelationCountLoad, RelationCountLoader, RelationIdLoad, RelationIdLoader};

mod relation;
pub use relation::RelationQuery;

pub mod serializer;
pub use serializer::{Serializer, Statement};
