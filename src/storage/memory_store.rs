use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use mini_moka::sync::Cache;

use super::{StoreError, store::CacheStore};

/// In-process cache store with the same list/set semantics as Redis.
/// Nothing is shared with other processes.
pub struct MemoryStore {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
    values: Cache<String, (String, Instant)>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(max_entries: u64, max_ttl: Duration) -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            sets: Mutex::new(HashMap::new()),
            values: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(max_ttl.max(Duration::from_secs(1)))
                .build(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn lists(&self) -> MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sets(&self) -> MutexGuard<'_, HashMap<String, HashSet<String>>> {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolve a Redis-style inclusive range against a list length
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

fn resolve_index(len: usize, index: isize) -> Option<usize> {
    let resolved = if index < 0 { len as isize + index } else { index };

    usize::try_from(resolved).ok().filter(|i| *i < len)
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;

        let lists = self.lists();

        let Some(list) = lists.get(key) else {
            return Ok(vec![]);
        };

        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => vec![],
        })
    }

    async fn list_index(&self, key: &str, index: isize) -> Result<Option<String>, StoreError> {
        self.ensure_open()?;

        let lists = self.lists();

        Ok(lists
            .get(key)
            .and_then(|list| resolve_index(list.len(), index).and_then(|i| list.get(i)))
            .cloned())
    }

    async fn list_push_front(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.ensure_open()?;

        self.lists()
            .entry(key.to_string())
            .or_default()
            .push_front(value);
        Ok(())
    }

    async fn list_set(&self, key: &str, index: isize, value: String) -> Result<(), StoreError> {
        self.ensure_open()?;

        let mut lists = self.lists();

        let slot = lists
            .get_mut(key)
            .and_then(|list| {
                let i = resolve_index(list.len(), index)?;
                list.get_mut(i)
            })
            .ok_or_else(|| StoreError::Command(format!("index {index} out of range for {key}")))?;

        *slot = value;
        Ok(())
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.ensure_open()?;

        let mut lists = self.lists();

        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };

        let before = list.len();
        list.retain(|v| v != value);
        let removed = before - list.len();

        if list.is_empty() {
            lists.remove(key);
        }

        Ok(removed)
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        self.ensure_open()?;

        let mut lists = self.lists();

        let Some(list) = lists.get_mut(key) else {
            return Ok(());
        };

        match resolve_range(list.len(), start, stop) {
            Some((from, to)) => {
                list.truncate(to + 1);
                list.drain(..from);
            }
            None => {
                lists.remove(key);
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;

        self.lists().remove(key);
        self.sets().remove(key);
        self.values.invalidate(&key.to_string());
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.ensure_open()?;

        self.sets()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.ensure_open()?;

        let mut sets = self.sets();

        if let Some(set) = sets.get_mut(key) {
            set.remove(member);

            if set.is_empty() {
                sets.remove(key);
            }
        }

        Ok(())
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.ensure_open()?;

        Ok(self.sets().get(key).is_some_and(|set| set.contains(member)))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;

        Ok(self
            .sets()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;

        self.values
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_open()?;

        let key = key.to_string();

        match self.values.get(&key) {
            Some((value, deadline)) if Instant::now() < deadline => Ok(Some(value)),
            Some(_) => {
                self.values.invalidate(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(100, Duration::from_secs(60))
    }

    async fn push_all(store: &MemoryStore, key: &str, values: &[&str]) {
        for value in values {
            store.list_push_front(key, value.to_string()).await.unwrap();
        }
    }

    #[test]
    fn ranges_follow_redis_rules() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 1, 100), Some((1, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(5, 5, 10), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }

    #[tokio::test]
    async fn push_front_puts_newest_at_head() {
        let store = store();
        push_all(&store, "l", &["a", "b", "c"]).await;

        assert_eq!(store.list_range("l", 0, -1).await.unwrap(), vec!["c", "b", "a"]);
        assert_eq!(store.list_index("l", -1).await.unwrap(), Some("a".into()));
        assert_eq!(store.list_index("l", 3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn trim_keeps_the_head() {
        let store = store();
        push_all(&store, "l", &["a", "b", "c", "d"]).await;

        store.list_trim("l", 0, 1).await.unwrap();

        assert_eq!(store.list_range("l", 0, -1).await.unwrap(), vec!["d", "c"]);
    }

    #[tokio::test]
    async fn remove_and_set_by_index() {
        let store = store();
        push_all(&store, "l", &["a", "b", "a"]).await;

        assert_eq!(store.list_remove("l", "a").await.unwrap(), 2);
        store.list_set("l", 0, "z".into()).await.unwrap();

        assert_eq!(store.list_range("l", 0, -1).await.unwrap(), vec!["z"]);
        assert!(matches!(
            store.list_set("l", 4, "x".into()).await,
            Err(StoreError::Command(_))
        ));
    }

    #[tokio::test]
    async fn set_membership() {
        let store = store();

        store.set_add("s", "x").await.unwrap();
        store.set_add("s", "x").await.unwrap();
        store.set_add("s", "y").await.unwrap();
        store.set_remove("s", "y").await.unwrap();

        assert!(store.set_contains("s", "x").await.unwrap());
        assert!(!store.set_contains("s", "y").await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap(), vec!["x"]);
    }

    #[tokio::test]
    async fn closed_store_refuses_commands() {
        let store = MemoryStore::new(10, Duration::from_secs(60));
        push_all(&store, "blocks", &["a"]).await;

        store.close().await.unwrap();

        assert!(matches!(
            store.list_range("blocks", 0, -1).await,
            Err(StoreError::Closed)
        ));
        assert!(matches!(store.get("k").await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn values_expire_after_their_ttl() {
        let store = store();

        store
            .put_with_ttl("short", "1".into(), Duration::from_millis(20))
            .await
            .unwrap();
        store
            .put_with_ttl("long", "2".into(), Duration::from_secs(30))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("long").await.unwrap(), Some("2".into()));
    }
}
