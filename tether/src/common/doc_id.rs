use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::Rng;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::AtomicU64;
use std::sync::Mutex;

use crate::common::util::epoch_millis_or_zero;
use crate::errors::{ErrorKind, TetherError, TetherResult};
use crate::ID_GENERATOR;
use log::{info, warn};

static MAX_VALUE: Lazy<u64> = Lazy::new(|| 10u64.pow(19));
static MIN_VALUE: Lazy<u64> = Lazy::new(|| 10u64.pow(18));

/// A database-generated document identifier.
///
/// When a document reaches storage without an identifier and the schema offers
/// no way to synthesize one, the store assigns a `DocId`. IDs are produced by
/// a Snowflake-style distributed generator yielding 64-bit values in the range
/// [10^18, 10^19), which gives:
/// - Uniqueness across documents without central coordination
/// - Approximate timestamp ordering
///
/// A `DocId` is an opaque value: it participates in filters exactly like a
/// formatter-synthesized string identifier does, via [`crate::common::Value::Id`].
#[derive(PartialEq, Eq, Ord, PartialOrd, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DocId {
    id_value: u64,
}

impl DocId {
    /// Generates a new unique `DocId` from the process-wide generator.
    pub fn new() -> Self {
        DocId {
            id_value: ID_GENERATOR.get_id(),
        }
    }

    /// Creates a `DocId` from a raw value.
    ///
    /// The value must be within the valid range [10^18, 10^19); anything else
    /// cannot have come from the generator and is rejected.
    pub fn from_raw(id_value: u64) -> TetherResult<Self> {
        if id_value >= *MAX_VALUE {
            return Err(TetherError::new(
                &format!("DocId value must be less than 10^19, got {}", id_value),
                ErrorKind::Argument,
            ));
        }
        if id_value < *MIN_VALUE {
            return Err(TetherError::new(
                &format!(
                    "DocId value must be greater than or equal to 10^18, got {}",
                    id_value
                ),
                ErrorKind::Argument,
            ));
        }
        Ok(DocId { id_value })
    }

    /// Returns the raw 64-bit value.
    pub fn value(&self) -> u64 {
        self.id_value
    }
}

impl Default for DocId {
    fn default() -> Self {
        DocId::new()
    }
}

impl Display for DocId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id_value)
    }
}

impl Debug for DocId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocId({})", self.id_value)
    }
}

impl PartialOrd<u64> for DocId {
    fn partial_cmp(&self, other: &u64) -> Option<Ordering> {
        self.id_value.partial_cmp(other)
    }
}

impl PartialEq<u64> for DocId {
    fn eq(&self, other: &u64) -> bool {
        self.id_value == *other
    }
}

pub struct SnowflakeIdGenerator {
    node_id: u64,
    sequence: AtomicU64,
    last_timestamp: AtomicU64,
    sequence_bits: u64,
    timestamp_left_shift: u64,
    epoch: u64,
    mutex: Mutex<()>,
}

impl SnowflakeIdGenerator {
    pub fn new() -> Self {
        let node_id_bits = 10;
        let sequence_bits = 12;
        let max_node_id = !(!0_u64 << node_id_bits);
        let timestamp_left_shift = sequence_bits + node_id_bits;
        let epoch = 1288834974657;

        let mut generator = SnowflakeIdGenerator {
            node_id: 0,
            sequence: AtomicU64::new(0),
            last_timestamp: AtomicU64::new(0),
            sequence_bits,
            timestamp_left_shift,
            epoch,
            mutex: Mutex::new(()),
        };

        generator.node_id = generator.get_node_id();
        if generator.node_id > max_node_id {
            warn!("Node id can't be greater than {}", max_node_id);
            generator.node_id = OsRng.gen_range(1..=max_node_id);
        }
        info!("Initialized id generator with node id: {}", generator.node_id);

        generator
    }

    pub fn get_id(&self) -> u64 {
        // Lock with poison recovery
        let _lock = match self.mutex.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("Id generator lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };

        let current_time = epoch_millis_or_zero() as u64;
        let mut timestamp = current_time;
        let last_timestamp = self.last_timestamp.load(std::sync::atomic::Ordering::Relaxed);
        let sequence = self.sequence.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            & !(!0_u64 << self.sequence_bits);

        // Clock moved backwards: hold the line at the last seen timestamp
        if timestamp <= last_timestamp {
            timestamp = last_timestamp;
        }

        self.last_timestamp
            .store(timestamp, std::sync::atomic::Ordering::Relaxed);
        drop(_lock);

        let raw = (timestamp.saturating_sub(self.epoch) << self.timestamp_left_shift)
            | (self.node_id << self.sequence_bits)
            | sequence;

        // Fold into the [10^18, 10^19) band so every generated id passes
        // DocId::from_raw validation.
        *MIN_VALUE + (raw % (*MAX_VALUE - *MIN_VALUE))
    }

    fn get_node_id(&self) -> u64 {
        let uuid = uuid::Uuid::new_v4();
        let uid = uuid.as_bytes();
        let rnd_byte = OsRng.gen::<u64>() & 0x000000FF;

        ((0x000000FF & uid[uid.len() - 1] as u64) | (0x0000FF00 & (rnd_byte << 8))) >> 6
    }
}

impl Default for SnowflakeIdGenerator {
    fn default() -> Self {
        SnowflakeIdGenerator::new()
    }
}
