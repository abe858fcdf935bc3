//! Backend-as-a-service collaborator interfaces.
//!
//! The client talks to a managed document store, an auth service and an
//! object store only through these traits. [`crate::memory::MemoryBackend`]
//! implements all three in-process.

use std::cmp::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use agrilink_shared::types::UserId;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Documents and queries
// ---------------------------------------------------------------------------

/// A stored document: its id plus the JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Decode the body, injecting the document id as an `id` field when
    /// the body is an object that lacks one.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.entry("id")
                .or_insert_with(|| Value::String(self.id.clone()));
        }
        Ok(serde_json::from_value(data)?)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    NotEq(String, Value),
    /// The field is an array containing the value.
    ArrayContains(String, Value),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq(field, v) => doc.field(field) == Some(v),
            Self::NotEq(field, v) => doc.field(field) != Some(v),
            Self::ArrayContains(field, v) => doc
                .field(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A collection query: filters, optional ordering and limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn where_not_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::NotEq(field.into(), value.into()));
        self
    }

    pub fn where_array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter, order and limit `docs` the way the backend would.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        if let Some((field, direction)) = &self.order_by {
            out.sort_by(|a, b| {
                let ord = compare_values(a.field(field), b.field(field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(n) = self.limit {
            out.truncate(n);
        }
        out
    }
}

// Missing < null < bool < number < string; RFC 3339 timestamps order as strings.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Callback invoked with the full result set each time it changes.
pub type SnapshotCallback = Box<dyn Fn(Vec<Document>) + Send + Sync>;

/// Handle for a live query. Dropping it unsubscribes.
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel now rather than at drop.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Remote document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or overwrite a document.
    async fn set_document(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    /// Shallow-merge `patch` into an existing document.
    async fn update_document(&self, collection: &str, id: &str, patch: Value) -> Result<()>;

    /// Create a document with a backend-generated id.
    async fn add_document(&self, collection: &str, data: Value) -> Result<String>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Start a live query. The callback receives the current result set
    /// immediately and again after every change to the collection.
    fn subscribe(&self, query: Query, callback: SnapshotCallback) -> Subscription;
}

/// Signed-in identity as reported by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_anonymous: bool,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;

    async fn sign_in_anonymously(&self) -> Result<AuthUser>;

    /// Exchange an identity-provider token (e.g. Google id token).
    async fn sign_in_with_token(&self, id_token: &str) -> Result<AuthUser>;

    async fn sign_out(&self) -> Result<()>;

    /// Auth-state changes; the current value is the signed-in user.
    fn watch(&self) -> watch::Receiver<Option<AuthUser>>;
}

/// Remote blob storage (chat images).
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path` and return its download URL.
    async fn upload(&self, path: &str, bytes: Bytes) -> Result<String>;

    async fn download_url(&self, path: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn doc(id: &str, data: Value) -> Document {
        Document {
            id: id.into(),
            data,
        }
    }

    #[test]
    fn query_filters_orders_and_limits() {
        let docs = vec![
            doc("a", json!({ "online": true, "rank": 3, "members": ["u1"] })),
            doc("b", json!({ "online": false, "rank": 1, "members": ["u2"] })),
            doc("c", json!({ "online": true, "rank": 2, "members": ["u1", "u2"] })),
        ];

        let q = Query::collection("farmers")
            .where_eq("online", true)
            .order_by("rank", Direction::Ascending);
        let ids: Vec<_> = q.apply(docs.clone()).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c", "a"]);

        let q = Query::collection("groups")
            .where_array_contains("members", "u2")
            .order_by("rank", Direction::Descending)
            .limit(1);
        let ids: Vec<_> = q.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn not_eq_keeps_documents_missing_the_field() {
        let q = Query::collection("messages").where_not_eq("sender", "me");
        assert!(q.matches(&doc("1", json!({ "sender": "you" }))));
        assert!(q.matches(&doc("2", json!({}))));
        assert!(!q.matches(&doc("3", json!({ "sender": "me" }))));
    }

    #[test]
    fn decode_injects_document_id() {
        #[derive(Deserialize)]
        struct Named {
            id: String,
            name: String,
        }
        let named: Named = doc("olives", json!({ "name": "Olive Farmers" }))
            .decode()
            .unwrap();
        assert_eq!(named.id, "olives");
        assert_eq!(named.name, "Olive Farmers");
    }

    #[test]
    fn subscription_cancels_once() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let sub = Subscription::new(move || {
            assert!(!flag.swap(true, AtomicOrdering::SeqCst));
        });
        sub.unsubscribe();
        assert!(cancelled.load(AtomicOrdering::SeqCst));
    }
}
