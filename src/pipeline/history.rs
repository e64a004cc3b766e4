//! Bounded in-memory record of processed items.
//!
//! A single mutex serializes every append and finalize, which is what
//! makes the exactly-once status transition enforceable. Position in
//! the history is fixed at append time; finalization mutates in place
//! and never reorders entries.

use crate::types::{ItemStatus, ProcessedItem};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::warn;

pub struct History {
    items: Mutex<VecDeque<ProcessedItem>>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    /// Record a newly ingested item, evicting the oldest past the cap
    pub fn append(&self, item: ProcessedItem) {
        let mut items = self.items.lock().unwrap();
        items.push_back(item);
        while items.len() > self.limit {
            items.pop_front();
        }
    }

    /// Replace the stored copy of `item` (matched by id) with its
    /// terminal form. Returns false when the stored item already left
    /// Processing (duplicate finalize) or was evicted.
    pub fn finalize(&self, item: &ProcessedItem) -> bool {
        debug_assert!(item.is_terminal());

        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|stored| stored.id == item.id) {
            Some(stored) if stored.status == ItemStatus::Processing => {
                *stored = item.clone();
                true
            }
            Some(stored) => {
                warn!(
                    id = %item.id,
                    status = ?stored.status,
                    "Ignoring duplicate finalize"
                );
                false
            }
            None => {
                warn!(id = %item.id, "Finalize for an item already evicted");
                false
            }
        }
    }

    /// Newest-first snapshot
    pub fn recent(&self) -> Vec<ProcessedItem> {
        let items = self.items.lock().unwrap();
        items.iter().rev().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<ProcessedItem> {
        let items = self.items.lock().unwrap();
        items.iter().find(|item| item.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items still in flight
    pub fn active_count(&self) -> usize {
        let items = self.items.lock().unwrap();
        items
            .iter()
            .filter(|item| item.status == ItemStatus::Processing)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IngestSource;
    use chrono::Utc;
    use std::sync::Arc;

    fn item(id: &str, status: ItemStatus) -> ProcessedItem {
        ProcessedItem {
            id: id.to_string(),
            source: IngestSource::ManualUpload,
            name: format!("{}.png", id),
            byte_size: 1500,
            mime_type: "image/png".to_string(),
            width: 10,
            height: 10,
            timestamp: Utc::now(),
            status,
            analysis_summary: None,
            error_detail: None,
            content: None,
            image_bytes: Arc::new(Vec::new()),
        }
    }

    #[test]
    fn test_recent_is_newest_first() {
        let history = History::new(10);
        history.append(item("a", ItemStatus::Processing));
        history.append(item("b", ItemStatus::Processing));
        history.append(item("c", ItemStatus::Processing));

        let recent = history.recent();
        let ids: Vec<&str> = recent.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let history = History::new(2);
        history.append(item("a", ItemStatus::Processing));
        history.append(item("b", ItemStatus::Processing));
        history.append(item("c", ItemStatus::Processing));

        assert_eq!(history.len(), 2);
        assert!(history.get("a").is_none());
        assert!(history.get("b").is_some());
        assert!(history.get("c").is_some());
    }

    #[test]
    fn test_finalize_updates_in_place_without_reordering() {
        let history = History::new(10);
        history.append(item("a", ItemStatus::Processing));
        history.append(item("b", ItemStatus::Processing));

        // "a" completes after "b" was appended; its position must not move
        let mut done = item("a", ItemStatus::Completed);
        done.analysis_summary = Some("summary".to_string());
        assert!(history.finalize(&done));

        let recent = history.recent();
        assert_eq!(recent[0].id, "b");
        assert_eq!(recent[1].id, "a");
        assert_eq!(recent[1].status, ItemStatus::Completed);
        assert_eq!(recent[1].analysis_summary.as_deref(), Some("summary"));
    }

    #[test]
    fn test_duplicate_finalize_is_ignored() {
        let history = History::new(10);
        history.append(item("a", ItemStatus::Processing));

        let completed = item("a", ItemStatus::Completed);
        assert!(history.finalize(&completed));

        // A later Error for the same id must not overwrite Completed
        let mut errored = item("a", ItemStatus::Error);
        errored.error_detail = Some("late failure".to_string());
        assert!(!history.finalize(&errored));

        let stored = history.get("a").unwrap();
        assert_eq!(stored.status, ItemStatus::Completed);
        assert!(stored.error_detail.is_none());
    }

    #[test]
    fn test_finalize_after_eviction_returns_false() {
        let history = History::new(1);
        history.append(item("a", ItemStatus::Processing));
        history.append(item("b", ItemStatus::Processing));

        let done = item("a", ItemStatus::Completed);
        assert!(!history.finalize(&done));
    }

    #[test]
    fn test_active_count_tracks_processing_items() {
        let history = History::new(10);
        assert_eq!(history.active_count(), 0);

        history.append(item("a", ItemStatus::Processing));
        history.append(item("b", ItemStatus::Processing));
        assert_eq!(history.active_count(), 2);

        history.finalize(&item("a", ItemStatus::Completed));
        assert_eq!(history.active_count(), 1);
    }
}
