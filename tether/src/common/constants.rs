// doc constants
pub const DOC_ID: &str = "_id";
pub const RESERVED_FIELDS: [&str; 1] = [DOC_ID];

// counter constants
pub const COUNTERS_COLLECTION: &str = "counters";
pub const COUNTER_SEQ_FIELD: &str = "seq";

// value constants
/// Replacement token for literal `.` characters in mapping keys; the storage
/// format forbids dots in key names.
pub const DOT_ESCAPE: &str = "__dot__";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const TETHER_VERSION: &str = env!("CARGO_PKG_VERSION");
