//! Typed field descriptors.
//!
//! Every attribute of a schema is described by a [Field]: a closed, tagged
//! [FieldKind] variant plus the `required`/`nullable` flags and an optional
//! default. All kinds implement the same four-operation capability set:
//!
//! - `to_storage` - application value to persisted shape
//! - `to_app` - persisted shape back to application value
//! - `validate` - contract check before save/upsert
//! - `pre_save_val` - last-moment overwrite hook (timestamps, counters)

pub mod field;
pub mod kind;

pub use field::*;
pub use kind::*;
