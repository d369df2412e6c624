//! Error types for watch operations.
//!
//! Two tiers share one type: faults returned synchronously from
//! [`Watch::subscribe`](crate::Watch::subscribe), and faults raised by the
//! feed worker and delivered through the error channel.

use mongodb::bson;
use thiserror::Error;

/// Boxed error produced by a [`ChangeFeed`](crate::ChangeFeed) provider.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Represents errors that can occur while watching a change stream.
#[derive(Debug, Error)]
pub enum WatchError {
    /// A filter targeted a collection that no decoder was configured for.
    #[error("no decoders configured for {db}.{coll}")]
    NoDecoders {
        /// Database name of the rejected filter.
        db: String,
        /// Collection name of the rejected filter.
        coll: String,
    },

    /// Opening or reading the upstream change feed failed.
    #[error("change feed error: {0}")]
    Feed(#[source] BoxError),

    /// A document of a change event could not be decoded.
    #[error("failed to decode change on {namespace}: {source}")]
    Decode {
        /// `db.coll` of the event.
        namespace: String,
        /// The underlying decode fault.
        #[source]
        source: DecodeError,
    },

    /// An insert, update or replace event arrived without a full document.
    #[error("change on {0} carries no full document")]
    MissingFullDocument(String),

    /// The held resume cursor could not be turned into a driver token.
    #[error("invalid resume cursor: {0}")]
    InvalidResumeCursor(String),
}

impl WatchError {
    /// Wraps any provider error as a feed fault.
    pub fn feed(error: impl Into<BoxError>) -> Self {
        Self::Feed(error.into())
    }

    /// Returns `true` for the synchronous "no decoders" fault.
    pub fn is_no_decoders(&self) -> bool {
        matches!(self, Self::NoDecoders { .. })
    }
}

impl From<mongodb::error::Error> for WatchError {
    fn from(error: mongodb::error::Error) -> Self {
        Self::Feed(Box::new(error))
    }
}

/// Fault returned by a decode function.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The raw bytes did not deserialize into the requested shape.
    #[error("bson: {0}")]
    Bson(#[from] bson::de::Error),

    /// Decoder-specific failure.
    #[error("{0}")]
    Custom(String),
}

impl DecodeError {
    /// Creates a decoder-specific fault with the given message.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}
