//! Schema metadata: the immutable per-type description compiled once from
//! declared fields, indexes, shard key, and id formatter, and shared by every
//! record of that type.

pub mod id_formatter;
pub mod index;
pub mod schema;
pub mod shard_key;

pub use id_formatter::*;
pub use index::*;
pub use schema::*;
pub use shard_key::*;
