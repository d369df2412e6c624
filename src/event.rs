//! Change event types for MongoDB change stream operations.
//!
//! This module defines the event shape read from the feed and the operation
//! kinds that filters are dispatched on.

use std::fmt;

use mongodb::bson::{self, Bson, RawDocumentBuf, Timestamp};
use mongodb::change_stream::event::ResumeToken;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, WatchError};
use crate::path::PathKey;

/// Represents the kind of operation a change event describes.
///
/// Only the four document-level kinds are dispatched to filters; everything
/// else (`drop`, `rename`, `dropDatabase`, `invalidate`, ...) is `Other`.
#[derive(Debug, Default, Eq, PartialEq, Hash, Clone, Copy, Deserialize)]
#[serde(from = "String")]
pub enum OpType {
    /// Document insertion event
    Insert,
    /// Document update event
    Update,
    /// Whole-document replacement event
    Replace,
    /// Document deletion event
    Delete,
    /// Any operation that is not dispatched
    #[default]
    Other,
}

impl OpType {
    /// Returns a string representation of the operation type.
    ///
    /// This is useful for logging and debugging purposes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Other => "other",
        }
    }

    /// Whether events of this kind reach filters.
    pub fn is_dispatchable(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl From<&str> for OpType {
    fn from(op: &str) -> Self {
        match op {
            "insert" => Self::Insert,
            "update" => Self::Update,
            "replace" => Self::Replace,
            "delete" => Self::Delete,
            _ => Self::Other,
        }
    }
}

impl From<String> for OpType {
    fn from(op: String) -> Self {
        Self::from(op.as_str())
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque position in the change feed, taken from the event `_id`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCursor {
    #[serde(rename = "_data")]
    data: String,
}

impl ResumeCursor {
    /// Wraps the `_data` string of a resume token.
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// The `_data` string.
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Converts the cursor into the driver's resume token.
    pub fn to_resume_token(&self) -> Result<ResumeToken, WatchError> {
        let bytes =
            bson::to_vec(self).map_err(|e| WatchError::InvalidResumeCursor(e.to_string()))?;
        bson::from_slice(&bytes).map_err(|e| WatchError::InvalidResumeCursor(e.to_string()))
    }
}

impl fmt::Display for ResumeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

/// A `(db, coll)` pair as reported in the event.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Namespace {
    pub db: String,
    #[serde(default)]
    pub coll: String,
}

impl Namespace {
    /// Creates a namespace from a database and collection name.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    /// The path key of this namespace.
    pub fn path(&self) -> PathKey {
        PathKey::new(&self.db, &self.coll)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

/// Fields touched by an update event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescription {
    pub updated_fields: RawDocumentBuf,
    #[serde(default)]
    pub removed_fields: Vec<String>,
}

/// One event read from the change feed. Documents are kept as raw bytes and
/// decoded on demand.
///
/// See <https://www.mongodb.com/docs/manual/reference/change-events/>.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Change {
    #[serde(rename = "_id")]
    pub id: ResumeCursor,
    pub operation_type: OpType,
    pub ns: Namespace,
    /// Destination namespace of a rename.
    pub to: Option<Namespace>,
    pub document_key: Option<RawDocumentBuf>,
    /// Absent on deletes.
    pub full_document: Option<RawDocumentBuf>,
    pub update_description: Option<UpdateDescription>,
    pub cluster_time: Option<Timestamp>,
    pub txn_number: Option<i64>,
    pub lsid: Option<RawDocumentBuf>,
}

#[derive(Deserialize)]
struct KeyEnvelope {
    #[serde(rename = "_id")]
    id: Bson,
}

impl Change {
    /// The path key of the event namespace.
    pub fn path(&self) -> PathKey {
        self.ns.path()
    }

    /// Extracts `_id` from the document key without decoding anything else.
    pub fn document_key_id(&self) -> Result<Bson, DecodeError> {
        let key = self
            .document_key
            .as_ref()
            .ok_or_else(|| DecodeError::custom("change has no document key"))?;
        let envelope: KeyEnvelope = bson::from_slice(key.as_bytes())?;
        Ok(envelope.id)
    }
}
