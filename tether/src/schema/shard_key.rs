use crate::errors::{ErrorKind, TetherError, TetherResult};

/// Direction of one shard key component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardDirection {
    Ascending,
    Hashed,
}

/// A shard key declaration: ordered `(field, direction)` pairs, applied once
/// at collection-preparation time.
#[derive(Clone, Debug)]
pub struct ShardKey {
    keys: Vec<(String, ShardDirection)>,
}

impl ShardKey {
    /// Creates a shard key over `keys`, all ascending.
    pub fn new<'a, I>(keys: I) -> TetherResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ShardKey::with_directions(
            keys.into_iter()
                .map(|k| (k, ShardDirection::Ascending))
                .collect(),
        )
    }

    /// Creates a shard key with explicit directions (e.g. hashed).
    pub fn with_directions(keys: Vec<(&str, ShardDirection)>) -> TetherResult<Self> {
        if keys.is_empty() {
            return Err(TetherError::new(
                "shard key must declare at least one field",
                ErrorKind::Argument,
            ));
        }
        if keys.iter().any(|(k, _)| k.is_empty()) {
            return Err(TetherError::new(
                "shard key field cannot be empty",
                ErrorKind::Argument,
            ));
        }
        Ok(ShardKey {
            keys: keys
                .into_iter()
                .map(|(k, d)| (k.to_string(), d))
                .collect(),
        })
    }

    pub fn keys(&self) -> &[(String, ShardDirection)] {
        &self.keys
    }

    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(k, _)| k.as_str())
    }
}
