/// # MongoDB Change Stream Multiplexer
///
/// This crate opens a single MongoDB change stream for a set of collections
/// and fans every event out to independently registered filter callbacks.
///
/// ## Features
///
/// - One upstream change stream shared by any number of filters
/// - Per-collection decode functions, run only when a filter is listening
/// - Deletes delivered with the document `_id`, no decoding
/// - Automatic reconnection resuming after the last event read
/// - Faults delivered on a bounded error channel instead of stopping the feed
///
/// ## Example
///
/// ```rust,ignore
/// use mongodb::Client;
/// use mongo_watch::{Filter, OpType, Watch, WatchOptions};
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, serde::Deserialize)]
/// struct User {
///     name: String,
/// }
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::with_uri_str("mongodb://localhost:27017").await?;
///
///     let watch = Watch::new(
///         CancellationToken::new(),
///         client,
///         WatchOptions::new().with_document::<User>("app", "users"),
///     );
///
///     let subscription = watch.subscribe([Filter::new("app", "users", |op, payload, _| {
///         match op {
///             OpType::Delete => println!("deleted {:?}", payload.key()),
///             _ => println!("{} {:?}", op, payload.downcast_ref::<User>()),
///         }
///     })])?;
///
///     if let Some(mut errors) = watch.errors() {
///         tokio::spawn(async move {
///             while let Some(error) = errors.recv().await {
///                 eprintln!("watch error: {}", error);
///             }
///         });
///     }
///
///     // ... Application logic ...
///
///     subscription.cancel();
///     watch.close().await;
///
///     Ok(())
/// }
/// ```
mod config;
mod decoder;
mod error;
mod event;
mod feed;
mod filter;
mod path;
mod sink;
mod subscription;
#[cfg(test)]
mod testing;
mod watch;

pub use config::{WatchConfig, WatchOptions, DEFAULT_ERROR_CAPACITY, DEFAULT_RETRY_DELAY};
pub use decoder::{DecodeFn, Decoded, Decoder, DecoderRegistry};
pub use error::{BoxError, DecodeError, WatchError};
pub use event::{Change, Namespace, OpType, ResumeCursor, UpdateDescription};
pub use feed::{pipeline, predicate, ChangeFeed, FeedStream, OpenRequest};
pub use filter::{Filter, FilterFn, FilterId, FilterRegistry, Payload};
pub use path::PathKey;
pub use subscription::Subscription;
pub use watch::Watch;
