use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use super::SemanticIndex;
use crate::error::Result;

struct Built {
    index: Arc<SemanticIndex>,
    built_at: Instant,
}

/// One cache entry. Every caller that finds the same slot awaits the same
/// build, so concurrent first accesses for a note run extraction once.
struct Slot {
    cell: OnceCell<Built>,
    created_at: Instant,
}

impl Slot {
    fn new() -> Self {
        Self { cell: OnceCell::new(), created_at: Instant::now() }
    }

    /// Build time once built, otherwise when the slot was opened.
    fn age_key(&self) -> Instant {
        self.cell.get().map_or(self.created_at, |b| b.built_at)
    }
}

/// Per-note semantic indexes, shared for the life of the process.
///
/// Entries expire after `ttl` (if set) and the oldest entry, built or still
/// building, is evicted once `capacity` notes are held. A build that fails leaves the slot empty
/// and the next caller retries.
pub struct IndexCache {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl IndexCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub async fn get_or_build<F, Fut>(&self, note_id: &str, build: F) -> Result<Arc<SemanticIndex>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SemanticIndex>>,
    {
        let slot = self.slot_for(note_id);

        if let Some(built) = slot.cell.get() {
            tracing::debug!(note_id, "Index cache hit");
            return Ok(built.index.clone());
        }

        let built = slot
            .cell
            .get_or_try_init(|| async {
                tracing::info!(note_id, "Index cache miss, building");
                let index = build().await?;
                tracing::info!(
                    note_id,
                    units = index.len(),
                    model = index.embedding_model(),
                    "Index built and cached"
                );
                Ok::<_, crate::error::RagError>(Built {
                    index: Arc::new(index),
                    built_at: Instant::now(),
                })
            })
            .await?;
        Ok(built.index.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().values().filter(|s| s.cell.initialized()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, slot: &Slot) -> bool {
        match (self.ttl, slot.cell.get()) {
            (Some(ttl), Some(built)) => built.built_at.elapsed() >= ttl,
            _ => false,
        }
    }

    fn slot_for(&self, note_id: &str) -> Arc<Slot> {
        let mut slots = self.lock();

        if let Some(slot) = slots.get(note_id) {
            if !self.is_expired(slot) {
                return slot.clone();
            }
            tracing::debug!(note_id, "Cached index expired");
            slots.remove(note_id);
        }

        // Evicting an in-flight slot only detaches it: its waiters still get
        // the result, it just is not cached.
        while slots.len() >= self.capacity {
            let Some(id) = slots
                .iter()
                .min_by_key(|(_, s)| s.age_key())
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            tracing::debug!(evicted = %id, "Index cache full, evicting oldest entry");
            slots.remove(&id);
        }

        let slot = Arc::new(Slot::new());
        slots.insert(note_id.to_string(), slot.clone());
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn index(note_id: &str) -> SemanticIndex {
        SemanticIndex::new(note_id, "test".into(), Vec::new(), Vec::new()).unwrap()
    }

    #[tokio::test]
    async fn same_note_returns_same_instance() {
        let cache = IndexCache::new(8, None);
        let builds = AtomicUsize::new(0);

        let builds_ref = &builds;
        let counted = move |id: &'static str| {
            move || async move {
                builds_ref.fetch_add(1, Ordering::SeqCst);
                Ok(index(id))
            }
        };

        let a = cache.get_or_build("n1", counted("n1")).await.unwrap();
        let b = cache.get_or_build("n1", counted("n1")).await.unwrap();
        let c = cache.get_or_build("n2", counted("n2")).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_first_access_builds_once() {
        let cache = Arc::new(IndexCache::new(8, None));
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let builds = builds.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build("n1", || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(index("n1"))
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn failed_build_is_retried() {
        let cache = IndexCache::new(8, None);

        let err = cache
            .get_or_build("n1", || async { Err(RagError::Transient("embedding timeout".into())) })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(cache.len(), 0);

        let ok = cache.get_or_build("n1", || async { Ok(index("n1")) }).await;
        assert!(ok.is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_rebuilt() {
        let cache = IndexCache::new(8, Some(Duration::ZERO));

        let a = cache.get_or_build("n1", || async { Ok(index("n1")) }).await.unwrap();
        let b = cache.get_or_build("n1", || async { Ok(index("n1")) }).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let cache = IndexCache::new(2, None);

        let first = cache.get_or_build("n1", || async { Ok(index("n1")) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.get_or_build("n2", || async { Ok(index("n2")) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.get_or_build("n3", || async { Ok(index("n3")) }).await.unwrap();

        assert_eq!(cache.len(), 2);
        let again = cache.get_or_build("n1", || async { Ok(index("n1")) }).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn abandoned_builds_do_not_grow_past_capacity() {
        let cache = IndexCache::new(2, None);

        for id in ["n1", "n2", "n3", "n4"] {
            let stalled = cache.get_or_build(id, std::future::pending::<Result<SemanticIndex>>);
            assert!(tokio::time::timeout(Duration::from_millis(10), stalled).await.is_err());
        }

        assert!(cache.lock().len() <= 2);
        assert_eq!(cache.len(), 0);
        let built = cache.get_or_build("n4", || async { Ok(index("n4")) }).await;
        assert!(built.is_ok());
        assert!(cache.lock().len() <= 2);
    }
}
