//! Core functionality for multiplexing one change stream.
//!
//! This module provides the main `Watch` type. It owns a single background
//! worker that keeps the upstream feed open, tracks the resume cursor, and
//! fans each event out to the filters registered for its namespace.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchOptions;
use crate::decoder::DecoderRegistry;
use crate::error::WatchError;
use crate::event::{Change, OpType, ResumeCursor};
use crate::feed::{pipeline, ChangeFeed, OpenRequest};
use crate::filter::{Filter, FilterId, FilterRegistry, Payload};
use crate::path::PathKey;
use crate::sink::ErrorSink;
use crate::subscription::{Registrations, Subscription};

/// State shared between the worker and subscribers.
struct Shared {
    decoders: DecoderRegistry,
    /// One registry per watched path; the key set never changes.
    filters: BTreeMap<PathKey, Arc<FilterRegistry>>,
    sink: ErrorSink,
}

impl Shared {
    /// Classifies one change and invokes the filters of its path.
    fn dispatch(&self, change: &Change) {
        let op = change.operation_type;
        if !op.is_dispatchable() {
            return;
        }

        let path = change.path();
        let Some(registry) = self.filters.get(&path) else {
            return;
        };

        let filters = registry.snapshot();
        if filters.is_empty() {
            return;
        }

        debug!(
            namespace = %change.ns,
            op = %op,
            filters = filters.len(),
            "dispatching change"
        );

        match op {
            OpType::Delete => match change.document_key_id() {
                Ok(id) => {
                    for filter in &filters {
                        filter(op, Payload::Key(&id), change);
                    }
                }
                Err(source) => self.sink.emit(WatchError::Decode {
                    namespace: change.ns.to_string(),
                    source,
                }),
            },
            _ => {
                let Some(decode) = self.decoders.get(&path) else {
                    return;
                };
                let Some(raw) = change.full_document.as_ref() else {
                    self.sink
                        .emit(WatchError::MissingFullDocument(change.ns.to_string()));
                    return;
                };
                match decode(raw) {
                    Ok(doc) => {
                        for filter in &filters {
                            filter(op, Payload::Document(&*doc), change);
                        }
                    }
                    Err(source) => self.sink.emit(WatchError::Decode {
                        namespace: change.ns.to_string(),
                        source,
                    }),
                }
            }
        }
    }
}

/// The background task owning the feed connection and the resume cursor.
struct Worker<F> {
    feed: F,
    shared: Arc<Shared>,
    pipeline: Vec<mongodb::bson::Document>,
    retry_delay: Duration,
    cancel: CancellationToken,
}

impl<F: ChangeFeed> Worker<F> {
    async fn run(self) {
        let mut cursor: Option<ResumeCursor> = None;
        info!(paths = self.shared.filters.len(), "change feed worker started");

        if self.shared.filters.is_empty() {
            // An empty `$or` is rejected upstream; there is nothing to watch.
            self.cancel.cancelled().await;
            info!("change feed worker stopped");
            return;
        }

        loop {
            let request = OpenRequest {
                pipeline: self.pipeline.clone(),
                start_after: cursor.clone(),
            };
            debug!(cursor = ?cursor.as_ref().map(ResumeCursor::as_str), "opening change feed");

            let opened = tokio::select! {
                () = self.cancel.cancelled() => break,
                opened = self.feed.open(request) => opened,
            };

            match opened {
                Ok(mut stream) => {
                    info!("change feed open");
                    loop {
                        let next = tokio::select! {
                            () = self.cancel.cancelled() => break,
                            next = stream.next() => next,
                        };
                        match next {
                            Some(Ok(change)) => {
                                // Advance before dispatch: delivery is at-most-once.
                                cursor = Some(change.id.clone());
                                self.shared.dispatch(&change);
                            }
                            Some(Err(error)) => {
                                self.shared.sink.emit(error);
                                break;
                            }
                            None => {
                                debug!("change feed closed");
                                break;
                            }
                        }
                    }
                }
                Err(error) => self.shared.sink.emit(error),
            }

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!("change feed worker stopped");
    }
}

/// Multiplexes one upstream change feed across per-collection filters.
///
/// `Watch` is cheap to clone; clones share the same worker and registries, so
/// a filter callback may capture one and subscribe or unsubscribe.
///
/// # Example
///
/// ```rust,ignore
/// use mongo_watch::{Filter, Watch, WatchOptions};
/// use tokio_util::sync::CancellationToken;
///
/// let client = mongodb::Client::with_uri_str("mongodb://localhost:27017").await?;
/// let watch = Watch::new(
///     CancellationToken::new(),
///     client,
///     WatchOptions::new().with_document::<User>("app", "users"),
/// );
///
/// let subscription = watch.subscribe([Filter::new("app", "users", |op, payload, _change| {
///     if let Some(user) = payload.downcast_ref::<User>() {
///         tracing::info!(op = %op, name = %user.name, "user changed");
///     }
/// })])?;
///
/// // Later
/// subscription.cancel();
/// watch.close().await;
/// ```
#[derive(Clone)]
pub struct Watch {
    shared: Arc<Shared>,
    errors: Arc<Mutex<Option<mpsc::Receiver<WatchError>>>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    cancel: CancellationToken,
}

impl Watch {
    /// Builds the registries and starts the feed worker.
    ///
    /// The worker stops when `cancel` (or [`close`](Self::close)) fires. Must
    /// be called from within a Tokio runtime.
    pub fn new<F: ChangeFeed>(cancel: CancellationToken, feed: F, options: WatchOptions) -> Self {
        let WatchOptions { decoders, config } = options;
        let decoders = DecoderRegistry::from_bindings(decoders);
        if decoders.is_empty() {
            warn!("no decoders configured, the change feed will not be opened");
        }
        let filters = decoders
            .paths()
            .map(|path| (path.clone(), Arc::new(FilterRegistry::new())))
            .collect();
        let pipeline = pipeline(decoders.paths());
        let (sink, errors) = ErrorSink::new(config.error_capacity);

        let shared = Arc::new(Shared {
            decoders,
            filters,
            sink,
        });
        let cancel = cancel.child_token();

        let worker = Worker {
            feed,
            shared: Arc::clone(&shared),
            pipeline,
            retry_delay: config.retry_delay,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            shared,
            errors: Arc::new(Mutex::new(Some(errors))),
            worker: Arc::new(Mutex::new(Some(handle))),
            cancel,
        }
    }

    /// Registers filters, all or nothing.
    ///
    /// If any filter targets a collection without a decoder, the filters
    /// already registered by this call are removed again and
    /// [`WatchError::NoDecoders`] is returned.
    pub fn subscribe(
        &self,
        filters: impl IntoIterator<Item = Filter>,
    ) -> Result<Subscription, WatchError> {
        let mut registrations = Registrations::default();

        for filter in filters {
            let path = filter.path();
            let Some(registry) = self.shared.filters.get(&path) else {
                let rolled_back = registrations.remove();
                debug!(namespace = %path, rolled_back, "subscribe rejected");
                return Err(WatchError::NoDecoders {
                    db: filter.db,
                    coll: filter.coll,
                });
            };

            let id = FilterId::generate();
            debug!(namespace = %path, id = %id, "registering filter");
            registry.insert(id.clone(), filter.callback);
            registrations.push(path, registry, id);
        }

        Ok(Subscription::new(registrations))
    }

    /// Takes the receiving end of the error channel. Returns `None` once taken.
    pub fn errors(&self) -> Option<mpsc::Receiver<WatchError>> {
        self.errors.lock().take()
    }

    /// Errors dropped because the error channel was full.
    pub fn dropped_errors(&self) -> u64 {
        self.shared.sink.dropped()
    }

    /// Watched `(db, coll)` pairs in key order.
    pub fn namespaces(&self) -> Vec<(String, String)> {
        self.shared
            .filters
            .keys()
            .map(|path| {
                let (db, coll) = path.namespace();
                (db.to_string(), coll.to_string())
            })
            .collect()
    }

    /// Number of filters registered for a pair, or `None` if it is not watched.
    pub fn filter_count(&self, db: &str, coll: &str) -> Option<usize> {
        self.shared
            .filters
            .get(&PathKey::new(db, coll))
            .map(|registry| registry.len())
    }

    /// Whether the worker task is still alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// Returns `true` if this call stopped it, `false` if it was already closed.
    pub async fn close(&self) -> bool {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!(error = %e, "change feed worker failed");
                }
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("decoders", &self.shared.decoders)
            .field("running", &self.is_running())
            .finish()
    }
}
