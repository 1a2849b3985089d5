//! The key-value store interface and its condition/update grammar.
//!
//! The grammar is deliberately small: it covers exactly the conditional
//! shapes the coordination layers need (absence checks, token equality,
//! numeric freshness predicates, bounded increments) and nothing else.
//! Backends must apply `conditional_update` atomically — evaluate the
//! condition and the update as one indivisible step, never as a separate
//! read-then-write.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Record, error::Result};

/// Maximum requests accepted by a single `batch_write` call.
///
/// Matches the common durable-store batch limit; helpers chunk larger sets.
pub const BATCH_WRITE_LIMIT: usize = 25;

/// Composite key: partition groups related records, sort orders within the
/// partition (prefix queries scan it in order).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    /// Partition component.
    pub partition: String,
    /// Sort component.
    pub sort: String,
}

impl Key {
    /// Creates a key.
    #[must_use]
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self { partition: partition.into(), sort: sort.into() }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.sort)
    }
}

/// A predicate evaluated against a record (or its absence) at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The record is absent, or the attribute is missing/null.
    Absent(String),
    /// The attribute equals the value exactly. Fails when absent.
    Equals(String, Value),
    /// The attribute is an integer strictly below the bound. Fails when absent.
    NumberLessThan(String, i64),
    /// All sub-conditions hold.
    And(Vec<Condition>),
    /// At least one sub-condition holds.
    Or(Vec<Condition>),
}

impl Condition {
    /// Evaluates the condition against a record or its absence.
    ///
    /// Implementations must call this under their atomicity guarantee;
    /// it is exposed so backends share one semantics.
    #[must_use]
    pub fn holds(&self, record: Option<&Record>) -> bool {
        match self {
            Self::Absent(attr) => record.is_none_or(|r| !r.has(attr)),
            Self::Equals(attr, value) => {
                record.and_then(|r| r.get(attr)).is_some_and(|v| v == value)
            },
            Self::NumberLessThan(attr, bound) => record
                .and_then(|r| r.get_i64(attr))
                .is_some_and(|n| n < *bound),
            Self::And(conditions) => conditions.iter().all(|c| c.holds(record)),
            Self::Or(conditions) => conditions.iter().any(|c| c.holds(record)),
        }
    }
}

/// One mutation applied by an [`Update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Sets the attribute to the value.
    Set(String, Value),
    /// Adds the delta to an integer attribute, treating absent as `0`.
    Add(String, i64),
}

/// An ordered list of attribute mutations applied atomically.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    actions: Vec<UpdateAction>,
}

impl Update {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `Set` action.
    #[must_use]
    pub fn set(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::Set(attr.into(), value.into()));
        self
    }

    /// Adds an `Add` (increment) action.
    #[must_use]
    pub fn add(mut self, attr: impl Into<String>, delta: i64) -> Self {
        self.actions.push(UpdateAction::Add(attr.into(), delta));
        self
    }

    /// The mutation list.
    #[must_use]
    pub fn actions(&self) -> &[UpdateAction] {
        &self.actions
    }

    /// Applies the mutations to a record in place.
    pub fn apply(&self, record: &mut Record) {
        for action in &self.actions {
            match action {
                UpdateAction::Set(attr, value) => record.set(attr.clone(), value.clone()),
                UpdateAction::Add(attr, delta) => {
                    let current = record.get_i64(attr).unwrap_or(0);
                    record.set(attr.clone(), current + delta);
                },
            }
        }
    }
}

/// One request within a batch write.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    /// Unconditional upsert.
    Put {
        /// Target key.
        key: Key,
        /// Record to store.
        record: Record,
    },
    /// Unconditional delete.
    Delete {
        /// Target key.
        key: Key,
    },
}

/// The durable key-value store every coordination component runs on.
///
/// The store is both the data store and the coordination medium: there is no
/// lock service and no message broker. The one primitive everything relies on
/// is `conditional_update` being atomic.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a record.
    async fn get(&self, key: &Key) -> Result<Option<Record>>;

    /// Unconditionally upserts a record.
    async fn put(&self, key: &Key, record: Record) -> Result<()>;

    /// Atomically checks `condition` and applies `update`, upserting when the
    /// record is absent and the condition permits absence.
    ///
    /// Returns the post-image.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError::ConditionFailed`] when the condition does not
    /// hold; backend errors otherwise.
    async fn conditional_update(
        &self,
        key: &Key,
        update: Update,
        condition: Condition,
    ) -> Result<Record>;

    /// Deletes a record, optionally guarded by a condition.
    ///
    /// Unconditional deletes of absent records succeed (idempotent).
    ///
    /// # Errors
    ///
    /// [`crate::StoreError::ConditionFailed`] when a condition is given and
    /// does not hold.
    async fn delete(&self, key: &Key, condition: Option<Condition>) -> Result<()>;

    /// Returns all records in `partition` whose sort key starts with
    /// `sort_prefix`, ordered by sort key.
    async fn query_prefix(&self, partition: &str, sort_prefix: &str)
        -> Result<Vec<(Key, Record)>>;

    /// Writes up to [`BATCH_WRITE_LIMIT`] requests.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError::BatchTooLarge`] when the batch exceeds the limit.
    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()>;

    /// Writes an arbitrary number of requests in `BATCH_WRITE_LIMIT`-sized
    /// chunks, in order.
    async fn batch_write_chunked(&self, requests: Vec<WriteRequest>) -> Result<()> {
        for chunk in requests.chunks(BATCH_WRITE_LIMIT) {
            self.batch_write(chunk.to_vec()).await?;
        }
        Ok(())
    }
}
