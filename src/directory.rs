//! In-memory name directory for groups, idols, and uploaders.
//!
//! Built from the database at startup and resynced periodically; all lookups
//! are case-insensitive against case-folded, trimmed names. The maps are
//! owned by the cache and only touched under its lock.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;

/// One group membership of an idol stage name. The same name may appear in
/// several groups, so resolution filters by the groups already resolved for
/// the message.
#[derive(Debug, Clone)]
pub struct IdolEntry {
    pub id: String,
    pub group_id: String,
}

/// Resolved canonical ID arrays for one staged record.
#[derive(Debug, Clone, Default)]
pub struct ResolvedIdentities {
    pub idol_ids: Vec<String>,
    pub group_ids: Vec<String>,
    pub uploader_ids: Vec<String>,
}

/// Create-record capability the resolver needs from the backing store.
#[async_trait]
pub trait UploaderStore: Send + Sync {
    async fn create_uploader(&self, name: &str) -> Result<String>;
}

#[derive(Default)]
struct Maps {
    groups: HashMap<String, String>,
    uploaders: HashMap<String, String>,
    idols: HashMap<String, Vec<IdolEntry>>,
}

pub struct DirectoryCache {
    maps: Mutex<Maps>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(Maps::default()),
        }
    }

    /// Replaces all three directories, case-folding names on the way in.
    pub async fn replace(
        &self,
        groups: Vec<(String, String)>,
        uploaders: Vec<(String, String)>,
        idols: Vec<(String, String, String)>,
    ) {
        let mut maps = self.maps.lock().await;

        maps.groups = groups
            .into_iter()
            .map(|(id, name)| (fold_name(&name), id))
            .collect();

        maps.uploaders = uploaders
            .into_iter()
            .map(|(id, name)| (fold_name(&name), id))
            .collect();

        maps.idols.clear();
        for (id, name, group_id) in idols {
            maps.idols
                .entry(fold_name(&name))
                .or_default()
                .push(IdolEntry { id, group_id });
        }

        info!(
            groups = maps.groups.len(),
            uploaders = maps.uploaders.len(),
            idols = maps.idols.len(),
            "directory cache loaded"
        );
    }

    /// Resolves a comma-separated group name list to a set of group IDs.
    /// Unknown names are skipped.
    pub async fn resolve_groups(&self, raw: &str) -> HashSet<String> {
        let maps = self.maps.lock().await;
        split_names(raw)
            .into_iter()
            .filter_map(|name| maps.groups.get(&name).cloned())
            .collect()
    }

    /// Looks up an idol stage name and returns the first entry whose group is
    /// in the resolved set. `None` when the name is unknown or none of its
    /// memberships match the message's groups.
    pub async fn resolve_idol(&self, name: &str, group_ids: &HashSet<String>) -> Option<String> {
        let maps = self.maps.lock().await;
        maps.idols
            .get(&fold_name(name))?
            .iter()
            .find(|entry| group_ids.contains(&entry.group_id))
            .map(|entry| entry.id.clone())
    }

    /// Case-insensitive uploader lookup that creates missing uploaders in the
    /// store. The cache lock is held across lookup and create, so concurrent
    /// first sightings of the same name yield a single record.
    pub async fn resolve_uploader(&self, name: &str, store: &dyn UploaderStore) -> Result<String> {
        let folded = fold_name(name);
        let mut maps = self.maps.lock().await;

        if let Some(id) = maps.uploaders.get(&folded) {
            return Ok(id.clone());
        }

        let id = store.create_uploader(&folded).await?;
        info!(name = %folded, id = %id, "created uploader");
        maps.uploaders.insert(folded, id.clone());
        Ok(id)
    }

    /// Resolves the raw idol/group/uploader name lists of one staged record.
    /// Idols with no membership in the resolved groups are silently omitted;
    /// uploader creation failures propagate.
    pub async fn resolve_identities(
        &self,
        idol_raw: &str,
        group_raw: &str,
        uploader_raw: &str,
        store: &dyn UploaderStore,
    ) -> Result<ResolvedIdentities> {
        let group_set = self.resolve_groups(group_raw).await;

        let mut idol_ids = Vec::new();
        for name in split_names(idol_raw) {
            if let Some(id) = self.resolve_idol(&name, &group_set).await {
                idol_ids.push(id);
            }
        }

        let mut uploader_ids = Vec::new();
        for name in split_names(uploader_raw) {
            uploader_ids.push(self.resolve_uploader(&name, store).await?);
        }

        Ok(ResolvedIdentities {
            idol_ids,
            group_ids: group_set.into_iter().collect(),
            uploader_ids,
        })
    }
}

fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Splits a comma-separated name list into case-folded, trimmed segments,
/// dropping empty ones. Duplicates are kept; each occurrence resolves
/// independently.
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(fold_name)
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        creates: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                creates: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UploaderStore for CountingStore {
        async fn create_uploader(&self, name: &str) -> Result<String> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(format!("up-{}", name))
        }
    }

    async fn seeded_cache() -> DirectoryCache {
        let cache = DirectoryCache::new();
        cache
            .replace(
                vec![
                    ("g-ive".to_string(), "IVE".to_string()),
                    ("g-kep".to_string(), "Kep1er".to_string()),
                ],
                vec![("up-admin".to_string(), "Admin".to_string())],
                vec![
                    ("i-yujin-ive".to_string(), "Yujin".to_string(), "g-ive".to_string()),
                    ("i-yujin-kep".to_string(), "Yujin".to_string(), "g-kep".to_string()),
                    ("i-wonyoung".to_string(), "Wonyoung".to_string(), "g-ive".to_string()),
                ],
            )
            .await;
        cache
    }

    #[tokio::test]
    async fn group_lookup_is_case_insensitive() {
        let cache = seeded_cache().await;
        let groups = cache.resolve_groups("ive, KEP1ER, unknown").await;
        assert_eq!(groups.len(), 2);
        assert!(groups.contains("g-ive"));
        assert!(groups.contains("g-kep"));
    }

    #[tokio::test]
    async fn idol_disambiguates_by_resolved_group() {
        let cache = seeded_cache().await;

        let ive_only: HashSet<String> = ["g-ive".to_string()].into_iter().collect();
        assert_eq!(
            cache.resolve_idol("Yujin", &ive_only).await,
            Some("i-yujin-ive".to_string())
        );

        let kep_only: HashSet<String> = ["g-kep".to_string()].into_iter().collect();
        assert_eq!(
            cache.resolve_idol("yujin", &kep_only).await,
            Some("i-yujin-kep".to_string())
        );
    }

    #[tokio::test]
    async fn idol_without_matching_group_is_not_found() {
        let cache = seeded_cache().await;
        let other: HashSet<String> = ["g-other".to_string()].into_iter().collect();
        assert_eq!(cache.resolve_idol("Yujin", &other).await, None);
        assert_eq!(cache.resolve_idol("Nobody", &other).await, None);
    }

    #[tokio::test]
    async fn uploader_miss_creates_exactly_once() {
        let cache = seeded_cache().await;
        let store = CountingStore::new();

        let first = cache.resolve_uploader("NewUser", &store).await.unwrap();
        let second = cache.resolve_uploader("newuser ", &store).await.unwrap();

        assert_eq!(first, "up-newuser");
        assert_eq!(first, second);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn known_uploader_never_triggers_create() {
        let cache = seeded_cache().await;
        let store = CountingStore::new();

        let id = cache.resolve_uploader("admin", &store).await.unwrap();
        assert_eq!(id, "up-admin");
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolves_full_identity_set() {
        let cache = seeded_cache().await;
        let store = CountingStore::new();

        let resolved = cache
            .resolve_identities("Yujin, Wonyoung, Stranger", "IVE", "someone", &store)
            .await
            .unwrap();

        assert_eq!(
            resolved.idol_ids,
            vec!["i-yujin-ive".to_string(), "i-wonyoung".to_string()]
        );
        assert_eq!(resolved.group_ids, vec!["g-ive".to_string()]);
        assert_eq!(resolved.uploader_ids, vec!["up-someone".to_string()]);
    }

    #[test]
    fn split_names_folds_and_drops_empties() {
        assert_eq!(
            split_names(" Yujin , WONYOUNG,, "),
            vec!["yujin".to_string(), "wonyoung".to_string()]
        );
        assert!(split_names("").is_empty());
    }

    #[test]
    fn split_names_keeps_duplicates() {
        assert_eq!(split_names("a, a"), vec!["a".to_string(), "a".to_string()]);
    }
}
