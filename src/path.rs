//! Canonical keys for watched namespaces.

use std::fmt;

/// Separator between database and collection. MongoDB rejects the NUL
/// character in both names, so the join is injective.
const SEPARATOR: char = '\0';

/// Collision-free key identifying one `(db, coll)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathKey(String);

impl PathKey {
    /// Builds the key for a database and collection.
    pub fn new(db: &str, coll: &str) -> Self {
        let mut key = String::with_capacity(db.len() + coll.len() + 1);
        key.push_str(db);
        key.push(SEPARATOR);
        key.push_str(coll);
        Self(key)
    }

    /// Splits the key back into `(db, coll)`.
    pub fn namespace(&self) -> (&str, &str) {
        self.0
            .split_once(SEPARATOR)
            .unwrap_or((self.0.as_str(), ""))
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (db, coll) = self.namespace();
        write!(f, "{}.{}", db, coll)
    }
}
