//! Common types shared across the crate: storage values, raw docs, document
//! identifiers, constants, and small utilities.

pub mod constants;
pub mod doc;
pub mod doc_id;
pub mod util;
pub mod value;

pub use constants::*;
pub use doc::*;
pub use doc_id::*;
pub use util::*;
pub use value::*;
