//! Decode functions bound to watched collections.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use mongodb::bson::{self, RawDocument};
use serde::de::DeserializeOwned;

use crate::error::DecodeError;
use crate::path::PathKey;

/// Type-erased result of a decode function.
pub type Decoded = Box<dyn Any + Send + Sync>;

/// Type alias for a function that decodes a raw full document.
pub type DecodeFn = Arc<dyn Fn(&RawDocument) -> Result<Decoded, DecodeError> + Send + Sync>;

/// Binds a `(db, coll)` pair to the function that decodes its documents.
#[derive(Clone)]
pub struct Decoder {
    pub db: String,
    pub coll: String,
    pub decode: DecodeFn,
}

impl Decoder {
    /// Creates a binding from an arbitrary decode function.
    pub fn new<F>(db: impl Into<String>, coll: impl Into<String>, decode: F) -> Self
    where
        F: Fn(&RawDocument) -> Result<Decoded, DecodeError> + Send + Sync + 'static,
    {
        Self {
            db: db.into(),
            coll: coll.into(),
            decode: Arc::new(decode),
        }
    }

    /// Creates a binding that deserializes documents into `T` with serde.
    pub fn document<T>(db: impl Into<String>, coll: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Self::new(db, coll, |raw| {
            let value: T = bson::from_slice(raw.as_bytes())?;
            Ok(Box::new(value) as Decoded)
        })
    }

    /// The path key this binding applies to.
    pub fn path(&self) -> PathKey {
        PathKey::new(&self.db, &self.coll)
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("db", &self.db)
            .field("coll", &self.coll)
            .finish_non_exhaustive()
    }
}

/// Decode functions per watched path, fixed at construction.
#[derive(Default, Clone)]
pub struct DecoderRegistry {
    decoders: BTreeMap<PathKey, DecodeFn>,
}

impl DecoderRegistry {
    /// Applies bindings in order; a later binding for the same pair wins.
    pub fn from_bindings(bindings: impl IntoIterator<Item = Decoder>) -> Self {
        let mut decoders = BTreeMap::new();
        for binding in bindings {
            decoders.insert(binding.path(), binding.decode);
        }
        Self { decoders }
    }

    /// Returns the decode function bound to `path`, if any.
    pub fn get(&self, path: &PathKey) -> Option<&DecodeFn> {
        self.decoders.get(path)
    }

    /// Watched paths in key order.
    pub fn paths(&self) -> impl Iterator<Item = &PathKey> {
        self.decoders.keys()
    }

    /// Number of watched paths.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.decoders.keys().map(ToString::to_string))
            .finish()
    }
}
