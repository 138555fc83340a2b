//! Interactive pagination state for query command responses.
//!
//! One state per (user, response message), so users cannot step through each
//! other's result sets. States older than an hour are evicted whenever a new
//! one is inserted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

const PAGE_TTL: Duration = Duration::from_secs(60 * 60);

pub const MIN_PER_PAGE: i64 = 1;
pub const MAX_PER_PAGE: i64 = 5;

struct PaginationState {
    pages: Vec<String>,
    page: usize,
    created_at: Instant,
}

pub struct PaginationStore {
    states: Mutex<HashMap<(u64, u64), PaginationState>>,
}

impl PaginationStore {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, user_id: u64, message_id: u64, pages: Vec<String>) {
        self.insert_at(user_id, message_id, pages, Instant::now())
            .await;
    }

    async fn insert_at(&self, user_id: u64, message_id: u64, pages: Vec<String>, now: Instant) {
        let mut states = self.states.lock().await;
        states.retain(|_, state| now.duration_since(state.created_at) < PAGE_TTL);
        states.insert(
            (user_id, message_id),
            PaginationState {
                pages,
                page: 0,
                created_at: now,
            },
        );
    }

    /// Applies a navigation button press and returns the page index plus the
    /// rendered content. `None` when no state exists for this user/message
    /// (expired, purged, or someone else's pagination).
    pub async fn navigate(
        &self,
        user_id: u64,
        message_id: u64,
        action: &str,
    ) -> Option<(usize, String)> {
        let mut states = self.states.lock().await;
        let state = states.get_mut(&(user_id, message_id))?;

        let last = state.pages.len().saturating_sub(1);
        state.page = match action {
            "first" => 0,
            "prev" => state.page.saturating_sub(1),
            "next" => (state.page + 1).min(last),
            "last" => last,
            _ => state.page,
        };

        Some((state.page, render_page(&state.pages, state.page)))
    }
}

pub fn clamp_per_page(requested: i64) -> usize {
    requested.clamp(MIN_PER_PAGE, MAX_PER_PAGE) as usize
}

/// Chunks links into pages of `per_page` lines. An optional metadata header
/// is prepended to the first page only.
pub fn build_pages(links: &[String], per_page: usize, header: Option<&str>) -> Vec<String> {
    links
        .chunks(per_page)
        .enumerate()
        .map(|(index, chunk)| {
            let body = chunk.join("\n");
            match header {
                Some(header) if index == 0 => format!("{}\n{}", header, body),
                _ => body,
            }
        })
        .collect()
}

pub fn render_page(pages: &[String], page: usize) -> String {
    format!("**Page {} / {}**\n\n{}", page + 1, pages.len(), pages[page])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://i.imgur.com/{i}.mp4")).collect()
    }

    #[test]
    fn seven_links_at_three_per_page_gives_three_pages() {
        let pages = build_pages(&links(7), 3, None);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].lines().count(), 3);
        assert_eq!(pages[1].lines().count(), 3);
        assert_eq!(pages[2].lines().count(), 1);
    }

    #[test]
    fn header_lands_on_first_page_only() {
        let pages = build_pages(&links(4), 2, Some("**Title**: test"));
        assert!(pages[0].starts_with("**Title**: test\n"));
        assert!(!pages[1].contains("**Title**"));
    }

    #[test]
    fn per_page_is_clamped() {
        assert_eq!(clamp_per_page(0), 1);
        assert_eq!(clamp_per_page(-3), 1);
        assert_eq!(clamp_per_page(3), 3);
        assert_eq!(clamp_per_page(99), 5);
    }

    #[tokio::test]
    async fn last_from_first_page_lands_on_final_page() {
        let store = PaginationStore::new();
        store.insert(1, 10, build_pages(&links(7), 3, None)).await;

        let (page, content) = store.navigate(1, 10, "last").await.unwrap();
        assert_eq!(page, 2);
        assert!(content.starts_with("**Page 3 / 3**"));
    }

    #[tokio::test]
    async fn next_on_last_page_is_a_no_op() {
        let store = PaginationStore::new();
        store.insert(1, 10, build_pages(&links(7), 3, None)).await;

        store.navigate(1, 10, "last").await.unwrap();
        let (page, _) = store.navigate(1, 10, "next").await.unwrap();
        assert_eq!(page, 2);
    }

    #[tokio::test]
    async fn prev_on_first_page_is_a_no_op() {
        let store = PaginationStore::new();
        store.insert(1, 10, build_pages(&links(4), 2, None)).await;

        let (page, _) = store.navigate(1, 10, "prev").await.unwrap();
        assert_eq!(page, 0);
    }

    #[tokio::test]
    async fn states_are_isolated_per_user() {
        let store = PaginationStore::new();
        store.insert(1, 10, build_pages(&links(4), 2, None)).await;

        assert!(store.navigate(2, 10, "next").await.is_none());
    }

    #[tokio::test]
    async fn stale_states_are_purged_on_insert() {
        let store = PaginationStore::new();
        store.insert(1, 10, build_pages(&links(4), 2, None)).await;

        // A later insert, seen from past the TTL, evicts the first state.
        let future = Instant::now() + PAGE_TTL + Duration::from_secs(1);
        store
            .insert_at(2, 20, build_pages(&links(2), 1, None), future)
            .await;

        assert!(store.navigate(1, 10, "next").await.is_none());
        assert!(store.navigate(2, 20, "first").await.is_some());
    }
}
