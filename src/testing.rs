//! Scripted change feed and event builders shared by the unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{rawdoc, RawDocumentBuf};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::WatchError;
use crate::event::{Change, Namespace, OpType, ResumeCursor};
use crate::feed::{ChangeFeed, FeedStream, OpenRequest};
use crate::filter::Filter;

/// Upper bound for anything a test waits on.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Awaits `future`, failing the test if it takes too long.
pub(crate) async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("timed out")
}

enum Script {
    Fail(String),
    Stream(FeedStream),
}

#[derive(Default)]
struct MockState {
    scripts: Mutex<VecDeque<Script>>,
    opened: Mutex<Vec<OpenRequest>>,
}

/// Feed whose opens follow a script. Once the script runs out every open
/// yields a stream that never produces anything.
pub(crate) struct MockFeed {
    state: Arc<MockState>,
    requests: mpsc::UnboundedSender<OpenRequest>,
}

/// Test-side controls of a [`MockFeed`].
pub(crate) struct MockHandle {
    state: Arc<MockState>,
    requests: tokio::sync::Mutex<mpsc::UnboundedReceiver<OpenRequest>>,
}

impl MockFeed {
    pub(crate) fn new() -> (Self, MockHandle) {
        let state = Arc::new(MockState::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = Self {
            state: Arc::clone(&state),
            requests: tx,
        };
        let handle = MockHandle {
            state,
            requests: tokio::sync::Mutex::new(rx),
        };
        (feed, handle)
    }
}

#[async_trait]
impl ChangeFeed for MockFeed {
    async fn open(&self, request: OpenRequest) -> Result<FeedStream, WatchError> {
        self.state.opened.lock().push(request.clone());
        let _ = self.requests.send(request);

        let script = self.state.scripts.lock().pop_front();
        match script {
            Some(Script::Fail(message)) => Err(WatchError::feed(message)),
            Some(Script::Stream(stream)) => Ok(stream),
            None => Ok(Box::pin(tokio_stream::pending::<Result<Change, WatchError>>())),
        }
    }
}

impl MockHandle {
    /// Next open fails with a feed error.
    pub(crate) fn push_error(&self, message: &str) {
        self.state
            .scripts
            .lock()
            .push_back(Script::Fail(message.to_string()));
    }

    /// Next open yields these items and then ends cleanly.
    pub(crate) fn push_events(&self, events: Vec<Result<Change, WatchError>>) {
        let stream = tokio_stream::iter(events);
        self.state
            .scripts
            .lock()
            .push_back(Script::Stream(Box::pin(stream)));
    }

    /// Next open yields whatever is sent on the returned channel.
    pub(crate) fn push_live(&self) -> mpsc::UnboundedSender<Result<Change, WatchError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .scripts
            .lock()
            .push_back(Script::Stream(Box::pin(UnboundedReceiverStream::new(rx))));
        tx
    }

    /// Waits for the next open attempt.
    pub(crate) async fn next_request(&self) -> OpenRequest {
        self.requests
            .lock()
            .await
            .recv()
            .await
            .expect("feed dropped")
    }

    pub(crate) fn request_count(&self) -> usize {
        self.state.opened.lock().len()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct User {
    #[serde(rename = "_id")]
    pub(crate) id: i32,
    pub(crate) name: String,
}

pub(crate) fn change(db: &str, coll: &str, cursor: &str, op: OpType) -> Change {
    Change {
        id: ResumeCursor::new(cursor),
        operation_type: op,
        ns: Namespace::new(db, coll),
        ..Change::default()
    }
}

pub(crate) fn insert(db: &str, coll: &str, cursor: &str, doc: RawDocumentBuf) -> Change {
    let mut change = change(db, coll, cursor, OpType::Insert);
    change.full_document = Some(doc);
    change
}

pub(crate) fn delete(db: &str, coll: &str, cursor: &str, id: i32) -> Change {
    let mut change = change(db, coll, cursor, OpType::Delete);
    change.document_key = Some(rawdoc! { "_id": id });
    change
}

/// What a recording filter observed for one invocation.
#[derive(Debug)]
pub(crate) struct Seen {
    pub(crate) op: OpType,
    pub(crate) user: Option<User>,
    pub(crate) key: Option<mongodb::bson::Bson>,
    pub(crate) cursor: String,
}

/// A filter that forwards every invocation to the returned receiver.
pub(crate) fn recorder(db: &str, coll: &str) -> (Filter, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let filter = Filter::new(db, coll, move |op, payload, change| {
        let _ = tx.send(Seen {
            op,
            user: payload.downcast_ref::<User>().cloned(),
            key: payload.key().cloned(),
            cursor: change.id.as_str().to_string(),
        });
    });
    (filter, rx)
}
