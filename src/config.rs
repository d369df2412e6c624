//! Construction options for a [`Watch`](crate::Watch).

use std::time::Duration;

use mongodb::bson::RawDocument;
use serde::de::DeserializeOwned;

use crate::decoder::{Decoded, Decoder};
use crate::error::DecodeError;

/// Default delay between reconnect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default capacity of the error channel.
pub const DEFAULT_ERROR_CAPACITY: usize = 64;

/// Runtime tuning of the feed worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Fixed wait before reopening the feed after a fault or a close.
    pub retry_delay: Duration,
    /// Errors buffered before new ones are dropped.
    pub error_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            error_capacity: DEFAULT_ERROR_CAPACITY,
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Sets the error channel capacity (at least one slot is kept).
    #[must_use]
    pub fn with_error_capacity(mut self, error_capacity: usize) -> Self {
        self.error_capacity = error_capacity.max(1);
        self
    }
}

/// Decoder bindings plus worker configuration.
///
/// # Example
///
/// ```rust,ignore
/// let options = WatchOptions::new()
///     .with_document::<User>("app", "users")
///     .with_decode_fn("app", "orders", |raw| Ok(Box::new(raw.to_raw_document_buf()) as Decoded))
///     .with_retry_delay(Duration::from_millis(500));
/// ```
#[derive(Debug, Default, Clone)]
pub struct WatchOptions {
    pub(crate) decoders: Vec<Decoder>,
    pub(crate) config: WatchConfig,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a decoder binding. A later binding for the same pair replaces it.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoders.push(decoder);
        self
    }

    #[must_use]
    pub fn with_decode_fn<F>(self, db: impl Into<String>, coll: impl Into<String>, decode: F) -> Self
    where
        F: Fn(&RawDocument) -> Result<Decoded, DecodeError> + Send + Sync + 'static,
    {
        self.with_decoder(Decoder::new(db, coll, decode))
    }

    /// Binds a collection whose documents deserialize into `T`.
    #[must_use]
    pub fn with_document<T>(self, db: impl Into<String>, coll: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.with_decoder(Decoder::document::<T>(db, coll))
    }

    #[must_use]
    pub fn with_config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.config = self.config.with_retry_delay(retry_delay);
        self
    }

    #[must_use]
    pub fn with_error_capacity(mut self, error_capacity: usize) -> Self {
        self.config = self.config.with_error_capacity(error_capacity);
        self
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn decoders(&self) -> &[Decoder] {
        &self.decoders
    }
}
