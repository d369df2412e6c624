//! The upstream change feed seam.
//!
//! The worker talks to the database only through [`ChangeFeed`]. The
//! provided implementation for [`mongodb::Client`] opens a cluster-wide change
//! stream restricted to the watched namespaces.

use std::pin::Pin;

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ChangeStreamOptions, FullDocumentType};
use mongodb::Client;
use tokio_stream::{Stream, StreamExt};

use crate::error::WatchError;
use crate::event::{Change, ResumeCursor};
use crate::path::PathKey;

/// Stream of change events produced by an open feed.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<Change, WatchError>> + Send>>;

/// Parameters of one attempt to open the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    /// Aggregation pipeline restricting the feed to the watched namespaces.
    pub pipeline: Vec<Document>,
    /// Position to continue after, if any event was read before.
    pub start_after: Option<ResumeCursor>,
}

/// Provider of the upstream change feed.
#[async_trait]
pub trait ChangeFeed: Send + Sync + 'static {
    /// Opens the feed. Implementations must look up full documents for
    /// updates and honor `start_after`.
    async fn open(&self, request: OpenRequest) -> Result<FeedStream, WatchError>;
}

/// Builds `{ "$or": [ { "ns.db": db, "ns.coll": coll }, ... ] }`.
pub fn predicate<'a>(paths: impl IntoIterator<Item = &'a PathKey>) -> Document {
    let or: Vec<Bson> = paths
        .into_iter()
        .map(|path| {
            let (db, coll) = path.namespace();
            Bson::Document(doc! { "ns.db": db, "ns.coll": coll })
        })
        .collect();
    doc! { "$or": or }
}

/// Wraps the predicate in the single `$match` stage sent upstream.
pub fn pipeline<'a>(paths: impl IntoIterator<Item = &'a PathKey>) -> Vec<Document> {
    vec![doc! { "$match": predicate(paths) }]
}

#[async_trait]
impl ChangeFeed for Client {
    async fn open(&self, request: OpenRequest) -> Result<FeedStream, WatchError> {
        let start_after = request
            .start_after
            .as_ref()
            .map(ResumeCursor::to_resume_token)
            .transpose()?;

        let options = ChangeStreamOptions::builder()
            .full_document(Some(FullDocumentType::UpdateLookup))
            .start_after(start_after)
            .build();

        let stream = self
            .watch(request.pipeline, options)
            .await?
            .with_type::<Change>();

        Ok(Box::pin(stream.map(|event| event.map_err(WatchError::from))))
    }
}
