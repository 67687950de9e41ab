pub mod date_utils;
pub mod type_utils;

pub use date_utils::*;
pub use type_utils::*;
