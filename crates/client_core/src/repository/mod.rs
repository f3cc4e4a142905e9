//! Repositories: one per entity, each translating backend calls into
//! [`Resource`] values and live feeds into [`LiveResource`] streams.

use futures::stream::{self, BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{error::BackendError, Resource};
use storage::{Disposer, Document, Fields, LiveFeed};

mod help;
mod identity;
mod suggestion;
mod village;

pub use help::HelpRepository;
pub use identity::{IdentityRepository, ProfileUpdate, Registration};
pub use suggestion::SuggestionRepository;
pub use village::VillageRepository;

const ID_FIELD: &str = "id";

/// A live subscription as seen by controllers: `Loading` first, then one
/// `Success` or `Error` per backend snapshot, until the disposer runs.
pub struct LiveResource<T> {
    pub stream: BoxStream<'static, Resource<T>>,
    pub disposer: Disposer,
}

impl<T: Send + 'static> LiveResource<T> {
    pub fn into_parts(self) -> (BoxStream<'static, Resource<T>>, Disposer) {
        (self.stream, self.disposer)
    }

    /// Wraps a backend feed, decoding each snapshot with `decode`.
    pub(crate) fn from_feed<S, F>(feed: LiveFeed<S>, fallback: &'static str, decode: F) -> Self
    where
        S: Send + 'static,
        F: Fn(S) -> Result<T, BackendError> + Send + 'static,
    {
        let (snapshots, disposer) = feed.into_parts();
        let decoded =
            snapshots.map(move |item| Resource::from_result_or(item.and_then(&decode), fallback));
        Self {
            stream: stream::once(async { Resource::Loading }).chain(decoded).boxed(),
            disposer,
        }
    }

    /// A subscription that could not start: a single error, nothing to release.
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            stream: stream::once(async move { Resource::Error(message) }).boxed(),
            disposer: Disposer::noop(),
        }
    }
}

/// Serializes a record into document fields; the id never travels in the body.
pub(crate) fn to_fields<T: Serialize>(record: &T) -> Result<Fields, BackendError> {
    match serde_json::to_value(record)? {
        Value::Object(mut fields) => {
            fields.remove(ID_FIELD);
            Ok(fields)
        }
        _ => Err(BackendError::malformed("record did not serialize to an object")),
    }
}

pub(crate) fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, BackendError> {
    let Document { id, mut fields } = document;
    fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    serde_json::from_value(Value::Object(fields))
        .map_err(|err| BackendError::malformed(format!("failed to parse document {id}: {err}")))
}

pub(crate) fn from_documents<T: DeserializeOwned>(
    documents: Vec<Document>,
) -> Result<Vec<T>, BackendError> {
    documents.into_iter().map(from_document).collect()
}

/// Builds a partial-update field map.
pub(crate) fn patch<const N: usize>(entries: [(&str, Value); N]) -> Fields {
    entries
        .into_iter()
        .map(|(field, value)| (field.to_string(), value))
        .collect()
}

/// Replaces a store-level not-found message with an entity-specific one.
pub(crate) fn name_missing(err: BackendError, message: &str) -> BackendError {
    match err {
        BackendError::NotFound(_) => BackendError::not_found(message),
        other => other,
    }
}
