//! Reply-thread correlation for multi-message sets.
//!
//! When a multi-item message opens a set, its finalized metadata is parked
//! here keyed by (author, triggering message). A later reply from the same
//! author referencing that message picks up a copy instead of re-deriving
//! idol/group/uploader. Entries expire after an hour, swept on insert.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::metadata::Metadata;

const CORRELATION_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry {
    metadata: Metadata,
    created_at: Instant,
}

pub struct SetTracker {
    entries: Mutex<HashMap<(u64, u64), Entry>>,
}

impl SetTracker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Parks the metadata of a freshly opened set.
    pub async fn begin(&self, author_id: u64, message_id: u64, metadata: Metadata) {
        self.insert(author_id, message_id, metadata, Instant::now())
            .await;
    }

    async fn insert(&self, author_id: u64, message_id: u64, metadata: Metadata, now: Instant) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| now.duration_since(entry.created_at) < CORRELATION_TTL);
        entries.insert(
            (author_id, message_id),
            Entry {
                metadata,
                created_at: now,
            },
        );
    }

    /// Returns a copy of the parked metadata when the replying author and the
    /// referenced message match an open set.
    pub async fn try_continue(&self, author_id: u64, referenced_message_id: u64) -> Option<Metadata> {
        let entries = self.entries.lock().await;
        entries
            .get(&(author_id, referenced_message_id))
            .map(|entry| entry.metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> Metadata {
        Metadata {
            idol: "Yujin".to_string(),
            group: "IVE".to_string(),
            set_id: "set123".to_string(),
            ..Metadata::default()
        }
    }

    #[tokio::test]
    async fn continues_matching_reply() {
        let tracker = SetTracker::new();
        tracker.begin(1, 100, sample_metadata()).await;

        let continued = tracker.try_continue(1, 100).await.unwrap();
        assert_eq!(continued.set_id, "set123");
        assert_eq!(continued.idol, "Yujin");
    }

    #[tokio::test]
    async fn wrong_author_or_message_does_not_continue() {
        let tracker = SetTracker::new();
        tracker.begin(1, 100, sample_metadata()).await;

        assert!(tracker.try_continue(2, 100).await.is_none());
        assert!(tracker.try_continue(1, 101).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_sets_do_not_clobber_each_other() {
        let tracker = SetTracker::new();
        tracker.begin(1, 100, sample_metadata()).await;

        let mut other = sample_metadata();
        other.set_id = "set456".to_string();
        tracker.begin(2, 200, other).await;

        assert_eq!(tracker.try_continue(1, 100).await.unwrap().set_id, "set123");
        assert_eq!(tracker.try_continue(2, 200).await.unwrap().set_id, "set456");
    }

    #[tokio::test]
    async fn stale_entries_are_swept_on_insert() {
        let tracker = SetTracker::new();
        tracker.begin(1, 100, sample_metadata()).await;

        // A later insert, seen from past the TTL, evicts the first entry.
        let future = Instant::now() + CORRELATION_TTL + Duration::from_secs(1);
        tracker.insert(2, 200, sample_metadata(), future).await;

        assert!(tracker.try_continue(1, 100).await.is_none());
        assert!(tracker.try_continue(2, 200).await.is_some());
    }
}
