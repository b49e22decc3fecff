//! Identifier generation.
//!
//! Event ids and chain ids are produced through an [`IdGenerator`] handed to
//! whoever constructs events, so tests can swap the random generator for a
//! deterministic one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of unique identifiers for events, chains and subjects
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Returns a new non-empty identifier
    fn generate(&self) -> String;
}

/// Random v4 UUIDs, the default generator
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic `<prefix>-<n>` identifiers, counting from 1
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Creates a generator yielding `prefix-1`, `prefix-2`, ...
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
