//! Per-call options shared by every operation.
//!
//! Instead of one overload per combination of session, partition key, cancellation and
//! query options, every operation takes a single [`Options`] value. `Options::default()`
//! runs outside a session, in the unpartitioned collection, without cancellation.
//!
//! ```ignore
//! let options = Options::new()
//!     .with_partition_key("tenant1")
//!     .with_cancellation(token.clone())
//!     .with_comment("nightly report");
//! ```

use bson::Document;
use std::time::Duration;

use crate::{
    cancel::CancellationToken,
    query::{Hint, QueryOptions},
    session::SessionHandle,
};

/// Options carried by a single operation.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Selects the physical collection variant; empty is the same as absent.
    pub partition_key: Option<String>,
    /// Caller-owned session the operation runs in.
    pub session: Option<SessionHandle>,
    /// Cancels the operation while it is pending.
    pub cancellation: Option<CancellationToken>,
    /// Native query options forwarded to the backend.
    pub query: QueryOptions,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_query(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.query.hint = Some(hint);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.query.comment = Some(comment.into());
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.query.max_time = Some(max_time);
        self
    }

    /// The partition key, with an empty key treated as absent.
    pub fn partition(&self) -> Option<&str> {
        self.partition_key.as_deref().filter(|key| !key.is_empty())
    }
}

/// Options for index creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOptions {
    /// Explicit index name; the native default name is used when absent.
    pub name: Option<String>,
    pub unique: bool,
    pub sparse: bool,
    /// Expire documents this long after the indexed date.
    pub expire_after: Option<Duration>,
    /// Per-field weights of a text index.
    pub weights: Option<Document>,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn with_expire_after(mut self, expire_after: Duration) -> Self {
        self.expire_after = Some(expire_after);
        self
    }

    pub fn with_weights(mut self, weights: Document) -> Self {
        self.weights = Some(weights);
        self
    }
}
