use smallvec::SmallVec;

use crate::errors::{ErrorKind, TetherError, TetherResult};

/// Direction of one index key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexDirection {
    Ascending,
    Descending,
    Hashed,
}

/// Configuration options for creating a collection index.
///
/// The option set is closed: `name`, `unique`, `sparse`, `background`, and
/// `expire_after_secs` (TTL) are everything a store is asked to honor.
/// Indexes are created in the background unless explicitly disabled, so
/// preparation does not stall application startup.
#[derive(Clone, Debug, Default)]
pub struct IndexOptions {
    name: Option<String>,
    unique: bool,
    sparse: bool,
    background: Option<bool>,
    expire_after_secs: Option<i64>,
}

impl IndexOptions {
    pub fn new() -> Self {
        IndexOptions::default()
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn foreground(mut self) -> Self {
        self.background = Some(false);
        self
    }

    /// Documents expire `secs` seconds after the indexed datetime value.
    pub fn expire_after(mut self, secs: i64) -> Self {
        self.expire_after_secs = Some(secs);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub fn is_background(&self) -> bool {
        self.background.unwrap_or(true)
    }

    pub fn expire_after_secs(&self) -> Option<i64> {
        self.expire_after_secs
    }
}

/// A collection index declaration: ordered `(key, direction)` pairs plus
/// options.
///
/// Construction validates everything that can go wrong in a declaration
/// (empty key lists, duplicate keys, TTL on a compound index), so collection
/// preparation never has to defer a configuration error to runtime.
#[derive(Clone, Debug)]
pub struct Index {
    keys: Vec<(String, IndexDirection)>,
    options: IndexOptions,
}

impl Index {
    /// Creates an index over `keys`, all ascending.
    pub fn new<'a, I>(keys: I, options: IndexOptions) -> TetherResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Index::with_directions(
            keys.into_iter()
                .map(|k| (k, IndexDirection::Ascending))
                .collect(),
            options,
        )
    }

    /// Creates an index with explicit per-key directions.
    pub fn with_directions(
        keys: Vec<(&str, IndexDirection)>,
        options: IndexOptions,
    ) -> TetherResult<Self> {
        if keys.is_empty() {
            return Err(TetherError::new(
                "index must declare at least one key",
                ErrorKind::Argument,
            ));
        }
        let mut seen: SmallVec<[&str; 8]> = SmallVec::new();
        for (key, _) in &keys {
            if key.is_empty() {
                return Err(TetherError::new(
                    "index key cannot be empty",
                    ErrorKind::Argument,
                ));
            }
            if seen.contains(key) {
                return Err(TetherError::new(
                    &format!("duplicate index key '{}'", key),
                    ErrorKind::Argument,
                ));
            }
            seen.push(*key);
        }
        if options.expire_after_secs().is_some() && keys.len() > 1 {
            return Err(TetherError::new(
                "TTL indexes must declare exactly one key",
                ErrorKind::Argument,
            ));
        }
        Ok(Index {
            keys: keys
                .into_iter()
                .map(|(k, d)| (k.to_string(), d))
                .collect(),
            options,
        })
    }

    pub fn keys(&self) -> &[(String, IndexDirection)] {
        &self.keys
    }

    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(k, _)| k.as_str())
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn is_unique(&self) -> bool {
        self.options.is_unique()
    }
}
