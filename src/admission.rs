//! Time-window admission and per-window dedup.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::ingest::types::CandidateItem;

/// Admit `item` if it is newer than the watermark and not future-dated.
///
/// With no watermark (first window since process start) only the future
/// check applies, so historical backlog passes.
pub fn admit(item: &CandidateItem, watermark: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    if let Some(w) = watermark {
        if item.created_at <= w {
            return false;
        }
    }
    item.created_at <= now
}

/// Ids accepted within one run window. No eviction; dropped with the window.
#[derive(Debug, Default, Clone)]
pub struct SeenSet {
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// False if `id` was already accepted in this window.
    pub fn should_process(&self, id: &str) -> bool {
        !self.ids.contains(id)
    }

    /// Record an accepted id. Returns false if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
