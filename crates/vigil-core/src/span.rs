//! Per-request span tree.
//!
//! Every request owns exactly one [`SpanTree`]. Code that participates in the
//! request receives a [`SpanHandle`] into that tree and creates children from it
//! explicitly; there is no ambient "current span" lookup. Handles are cheap to
//! clone and `Send`, so sibling spans can be created and finished concurrently
//! from fan-out futures.
//!
//! # Invariants
//!
//! - A finished span (non-null end time) never changes again. Mutations on a
//!   finished span are silently ignored.
//! - `finish` is idempotent.
//! - A child can only be started from an open parent.
//! - Finishing a span first finishes its open descendants, using the same end
//!   timestamp, so a child's finish is never observed after its parent's.

use crate::context::TraceId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a single span (16 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SpanId(String);

impl SpanId {
    /// Generates a new random span ID.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4();
        Self(uuid.simple().to_string()[..16].to_string())
    }

    /// Returns the span ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scalar span attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// String value.
    String(String),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u16> for AttributeValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Completion status of a span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SpanStatus {
    /// No status was set.
    #[default]
    Unset,
    /// The operation succeeded.
    Ok,
    /// The operation failed.
    Error {
        /// Description of the failure.
        message: String,
    },
}

impl SpanStatus {
    /// Creates an error status.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns `true` for [`SpanStatus::Error`].
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// A timestamped event recorded on a span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanEvent {
    /// Event name (e.g. `http.retry`).
    pub name: String,
    /// When the event was logged.
    pub timestamp: DateTime<Utc>,
    /// Event attributes.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl SpanEvent {
    /// Returns an attribute of this event.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Snapshot of a span.
///
/// Snapshots are detached copies; mutate spans through a [`SpanHandle`].
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    /// Span ID.
    pub id: SpanId,
    /// Parent span ID, `None` only for the root span.
    pub parent_id: Option<SpanId>,
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// Operation name.
    pub name: String,
    /// Attributes.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Completion status.
    pub status: SpanStatus,
    /// Events in the order they were logged.
    pub events: Vec<SpanEvent>,
    /// Start time.
    pub start_time: DateTime<Utc>,
    /// End time, `None` while the span is open.
    pub end_time: Option<DateTime<Utc>>,
}

impl Span {
    /// Returns `true` once the span has an end time.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Returns the span duration in milliseconds, if finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Returns the events with the given name.
    pub fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SpanEvent> + 'a {
        self.events.iter().filter(move |event| event.name == name)
    }
}

/// Errors raised while manipulating the span tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    /// The parent was already finished when a child was requested.
    #[error("parent span {span_id} is already finished")]
    ParentFinished {
        /// The finished parent.
        span_id: SpanId,
    },

    /// The parent span belongs to a different request.
    #[error("span {span_id} does not belong to trace {trace_id}")]
    ForeignSpan {
        /// The offending span.
        span_id: SpanId,
        /// The trace the caller expected.
        trace_id: TraceId,
    },
}

#[derive(Debug)]
struct Node {
    span: Span,
    parent: Option<usize>,
}

/// The span storage of one request.
///
/// Spans are append-only; a node's index never changes, and a child always has
/// a higher index than its parent.
#[derive(Debug)]
struct SpanTree {
    trace_id: TraceId,
    nodes: Mutex<Vec<Node>>,
}

/// Handle to one span in a request's span tree.
#[derive(Debug, Clone)]
pub struct SpanHandle {
    index: usize,
    id: SpanId,
    tree: Arc<SpanTree>,
}

impl SpanHandle {
    /// Creates a new tree and returns a handle to its root span.
    pub(crate) fn new_root(trace_id: TraceId, name: impl Into<String>) -> Self {
        let id = SpanId::generate();
        let root = Span {
            id: id.clone(),
            parent_id: None,
            trace_id: trace_id.clone(),
            name: name.into(),
            attributes: BTreeMap::new(),
            status: SpanStatus::Unset,
            events: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        };

        let tree = SpanTree {
            trace_id,
            nodes: Mutex::new(vec![Node {
                span: root,
                parent: None,
            }]),
        };

        Self {
            index: 0,
            id,
            tree: Arc::new(tree),
        }
    }

    /// Returns this span's ID.
    #[must_use]
    pub fn id(&self) -> &SpanId {
        &self.id
    }

    /// Returns the trace ID of the owning request.
    #[must_use]
    pub fn trace_id(&self) -> &TraceId {
        &self.tree.trace_id
    }

    /// Returns `true` if both handles point into the same request's tree.
    #[must_use]
    pub fn same_trace(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree)
    }

    /// Starts a child span of this span.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::ParentFinished`] if this span is already finished.
    pub fn start_child(&self, name: impl Into<String>) -> Result<Self, TraceError> {
        let mut nodes = self.tree.nodes.lock();
        if nodes[self.index].span.end_time.is_some() {
            return Err(TraceError::ParentFinished {
                span_id: self.id.clone(),
            });
        }

        let id = SpanId::generate();
        nodes.push(Node {
            span: Span {
                id: id.clone(),
                parent_id: Some(self.id.clone()),
                trace_id: self.tree.trace_id.clone(),
                name: name.into(),
                attributes: BTreeMap::new(),
                status: SpanStatus::Unset,
                events: Vec::new(),
                start_time: Utc::now(),
                end_time: None,
            },
            parent: Some(self.index),
        });

        Ok(Self {
            index: nodes.len() - 1,
            id,
            tree: Arc::clone(&self.tree),
        })
    }

    /// Sets an attribute. No-op on a finished span.
    pub fn add_attribute(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.with_open_span(|span| {
            span.attributes.insert(key.into(), value.into());
        });
    }

    /// Sets the span status. No-op on a finished span.
    pub fn set_status(&self, status: SpanStatus) {
        self.with_open_span(|span| span.status = status);
    }

    /// Renames the span. No-op on a finished span.
    pub fn set_name(&self, name: impl Into<String>) {
        self.with_open_span(|span| span.name = name.into());
    }

    /// Logs a timestamped event. No-op on a finished span.
    pub fn log_event<I, K, V>(&self, name: impl Into<String>, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        let event = SpanEvent {
            name: name.into(),
            timestamp: Utc::now(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };
        self.with_open_span(|span| span.events.push(event));
    }

    /// Finishes the span.
    ///
    /// Open descendants are finished first with the same end timestamp.
    /// Calling this on an already finished span does nothing.
    pub fn finish(&self) {
        let finished = {
            let mut nodes = self.tree.nodes.lock();
            if nodes[self.index].span.end_time.is_some() {
                return;
            }

            let now = Utc::now();
            let mut in_subtree = vec![false; nodes.len()];
            in_subtree[self.index] = true;
            for i in self.index + 1..nodes.len() {
                if let Some(parent) = nodes[i].parent {
                    in_subtree[i] = in_subtree[parent];
                }
            }

            let mut finished = Vec::new();
            for i in (self.index..nodes.len()).rev() {
                let span = &mut nodes[i].span;
                if in_subtree[i] && span.end_time.is_none() {
                    span.end_time = Some(now.max(span.start_time));
                    finished.push(span.clone());
                }
            }
            finished
        };

        for span in &finished {
            emit_finished(span);
        }
    }

    /// Returns `true` once the span is finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.tree.nodes.lock()[self.index].span.end_time.is_some()
    }

    /// Returns a snapshot of this span.
    #[must_use]
    pub fn snapshot(&self) -> Span {
        self.tree.nodes.lock()[self.index].span.clone()
    }

    /// Returns snapshots of every span in the tree, in creation order.
    #[must_use]
    pub fn tree_snapshot(&self) -> Vec<Span> {
        self.tree
            .nodes
            .lock()
            .iter()
            .map(|node| node.span.clone())
            .collect()
    }

    fn with_open_span(&self, f: impl FnOnce(&mut Span)) {
        let mut nodes = self.tree.nodes.lock();
        let span = &mut nodes[self.index].span;
        if span.end_time.is_none() {
            f(span);
        }
    }
}

fn emit_finished(span: &Span) {
    tracing::debug!(
        target: "vigil::span",
        traceid = %span.trace_id,
        span_id = %span.id,
        parent_id = span.parent_id.as_ref().map(SpanId::as_str),
        name = %span.name,
        duration_ms = span.duration_ms().unwrap_or_default(),
        status = ?span.status,
        events = span.events.len(),
        "span finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> SpanHandle {
        SpanHandle::new_root(TraceId::generate(), "request")
    }

    #[test]
    fn test_span_id_format() {
        let id = SpanId::generate();
        assert_eq!(id.as_str().len(), 16);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_child_records_parent() {
        let root = root();
        let child = root.start_child("db.query").unwrap();

        let snapshot = child.snapshot();
        assert_eq!(snapshot.parent_id.as_ref(), Some(root.id()));
        assert_eq!(snapshot.trace_id, *root.trace_id());
        assert!(root.snapshot().parent_id.is_none());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let root = root();
        root.finish();
        let first = root.snapshot().end_time;

        std::thread::sleep(std::time::Duration::from_millis(5));
        root.finish();

        assert!(first.is_some());
        assert_eq!(root.snapshot().end_time, first);
    }

    #[test]
    fn test_finished_span_is_immutable() {
        let root = root();
        root.add_attribute("before", true);
        root.finish();

        root.add_attribute("after", true);
        root.set_status(SpanStatus::error("late"));
        root.log_event("late", [("k", "v")]);

        let snapshot = root.snapshot();
        assert!(snapshot.attribute("before").is_some());
        assert!(snapshot.attribute("after").is_none());
        assert_eq!(snapshot.status, SpanStatus::Unset);
        assert!(snapshot.events.is_empty());
    }

    #[test]
    fn test_cannot_start_child_of_finished_parent() {
        let root = root();
        let child = root.start_child("call").unwrap();
        child.finish();

        let err = child.start_child("nested").unwrap_err();
        assert_eq!(
            err,
            TraceError::ParentFinished {
                span_id: child.id().clone()
            }
        );
    }

    #[test]
    fn test_finishing_parent_finishes_open_descendants_first() {
        let root = root();
        let child = root.start_child("outer").unwrap();
        let grandchild = child.start_child("inner").unwrap();
        let sibling = root.start_child("sibling").unwrap();
        sibling.finish();
        let sibling_end = sibling.snapshot().end_time;

        root.finish();

        let root_end = root.snapshot().end_time.unwrap();
        let child_end = child.snapshot().end_time.unwrap();
        let grandchild_end = grandchild.snapshot().end_time.unwrap();
        assert!(child_end <= root_end);
        assert!(grandchild_end <= child_end);
        assert_eq!(sibling.snapshot().end_time, sibling_end);
    }

    #[test]
    fn test_mutations_target_single_span() {
        let root = root();
        let a = root.start_child("a").unwrap();
        let b = root.start_child("b").unwrap();

        a.add_attribute("http.status_code", 200_u16);
        b.set_status(SpanStatus::error("boom"));

        assert_eq!(a.snapshot().attribute("http.status_code"), Some(&AttributeValue::Int(200)));
        assert!(b.snapshot().attribute("http.status_code").is_none());
        assert!(b.snapshot().status.is_error());
        assert_eq!(a.snapshot().status, SpanStatus::Unset);
    }

    #[test]
    fn test_log_event_records_attributes() {
        let root = root();
        root.log_event("http.retry", [("attempt", AttributeValue::from(1_u32))]);
        root.log_event("http.retry", [("attempt", AttributeValue::from(2_u32))]);

        let snapshot = root.snapshot();
        assert_eq!(snapshot.events_named("http.retry").count(), 2);
        assert_eq!(
            snapshot.events[1].attribute("attempt"),
            Some(&AttributeValue::Int(2))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_siblings() {
        let root = root();
        let mut tasks = Vec::new();
        for i in 0..16 {
            let parent = root.clone();
            tasks.push(tokio::spawn(async move {
                let child = parent.start_child(format!("fanout-{i}")).unwrap();
                child.add_attribute("index", i64::from(i));
                child.finish();
                child.id().clone()
            }));
        }

        for task in tasks {
            let id = task.await.unwrap();
            let span = root
                .tree_snapshot()
                .into_iter()
                .find(|span| span.id == id)
                .unwrap();
            assert_eq!(span.parent_id.as_ref(), Some(root.id()));
            assert!(span.is_finished());
        }
        assert_eq!(root.tree_snapshot().len(), 17);
    }
}
