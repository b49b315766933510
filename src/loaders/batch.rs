//! Request-scoped batching loader
//!
//! Each `load` registers its key in the loader's cache and on a queue, then
//! waits on a shared pending result. A coordinator task owned by the loader
//! takes the first queued key, keeps draining the queue across scheduler
//! yields until a yield brings nothing new (or `max_batch` keys are queued),
//! then dispatches the deduplicated key set as one fetch and resolves every
//! waiter from the result.
//!
//! States per relation: idle (queue empty), accumulating (keys queued, no
//! fetch yet), dispatching/resolving (fetch task in flight). Keys that arrive
//! after dispatch start the next batch; keys already in flight attach to the
//! cached pending result instead.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::db::error::{DbError, DbResult};

/// Outcome of a single key
pub type LoadResult<V> = Result<Option<V>, LoadError>;

#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("{0}")]
    Store(Arc<DbError>),

    #[error("loader for {0} was shut down")]
    Closed(&'static str),
}

impl From<DbError> for LoadError {
    fn from(e: DbError) -> Self {
        LoadError::Store(Arc::new(e))
    }
}

/// Multi-key fetch behind one relation.
///
/// A whole-batch `Err` is delivered to every key of the batch. A per-key
/// `Err` reaches only that key. Keys missing from the map resolve to empty.
pub trait BatchFn<K, V>: Send + Sync + 'static {
    fn load(&self, keys: &[K]) -> impl Future<Output = DbResult<HashMap<K, DbResult<V>>>> + Send;
}

#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    /// Extra settle delay after the first key of a batch arrives
    pub wait: Duration,
    /// Upper bound on keys per dispatched fetch
    pub max_batch: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(1),
            max_batch: 500,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoaderStats {
    batches: AtomicU64,
    keys: AtomicU64,
}

impl LoaderStats {
    /// Fetches dispatched so far
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Distinct keys sent to the store so far
    pub fn keys(&self) -> u64 {
        self.keys.load(Ordering::Relaxed)
    }
}

type SharedLoad<V> = Shared<BoxFuture<'static, LoadResult<V>>>;
type Pending<K, V> = (K, oneshot::Sender<LoadResult<V>>);

pub struct BatchLoader<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    relation: &'static str,
    cache: Mutex<HashMap<K, SharedLoad<V>>>,
    queue: mpsc::UnboundedSender<Pending<K, V>>,
    stats: Arc<LoaderStats>,
    coordinator: JoinHandle<()>,
}

impl<K, V> BatchLoader<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a loader and spawn its coordinator. Must be called from within
    /// a tokio runtime.
    pub fn new<F: BatchFn<K, V>>(relation: &'static str, fetch: F, config: LoaderConfig) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(LoaderStats::default());
        let coordinator = tokio::spawn(coordinate(
            relation,
            rx,
            Arc::new(fetch),
            config,
            stats.clone(),
        ));

        Self {
            relation,
            cache: Mutex::new(HashMap::new()),
            queue,
            stats,
            coordinator,
        }
    }

    pub fn relation(&self) -> &'static str {
        self.relation
    }

    pub fn stats(&self) -> &LoaderStats {
        &self.stats
    }

    /// Value for one key, fetched at most once per loader. Failures are not
    /// cached, so a later call retries.
    pub async fn load(&self, key: K) -> LoadResult<V> {
        let pending = self.pending(&key);
        let result = pending.clone().await;

        if result.is_err() {
            let mut cache = self.cache.lock();
            if cache.get(&key).is_some_and(|cached| cached.ptr_eq(&pending)) {
                cache.remove(&key);
            }
        }
        result
    }

    /// One result per input key, in input order. Duplicate keys share a
    /// single fetched value.
    pub async fn load_all(&self, keys: &[K]) -> Vec<LoadResult<V>> {
        join_all(keys.iter().cloned().map(|key| self.load(key))).await
    }

    /// Forget a cached value so the next `load` fetches it again
    pub fn clear(&self, key: &K) {
        self.cache.lock().remove(key);
    }

    fn pending(&self, key: &K) -> SharedLoad<V> {
        let mut cache = self.cache.lock();
        if let Some(pending) = cache.get(key) {
            return pending.clone();
        }

        let (tx, rx) = oneshot::channel();
        let registered = self.queue.send((key.clone(), tx)).is_ok();
        let relation = self.relation;
        let pending = async move {
            if !registered {
                return Err(LoadError::Closed(relation));
            }
            rx.await.unwrap_or(Err(LoadError::Closed(relation)))
        }
        .boxed()
        .shared();

        cache.insert(key.clone(), pending.clone());
        pending
    }
}

impl<K, V> Drop for BatchLoader<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // In-flight fetch tasks are detached and finish on their own; their
        // results go nowhere.
        self.coordinator.abort();
    }
}

async fn coordinate<K, V, F>(
    relation: &'static str,
    mut rx: mpsc::UnboundedReceiver<Pending<K, V>>,
    fetch: Arc<F>,
    config: LoaderConfig,
    stats: Arc<LoaderStats>,
) where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFn<K, V>,
{
    let max_batch = config.max_batch.max(1);

    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];

        if !config.wait.is_zero() {
            tokio::time::sleep(config.wait).await;
        }

        // Settle: stop once a yield brings no new registrations
        loop {
            while batch.len() < max_batch {
                match rx.try_recv() {
                    Ok(pending) => batch.push(pending),
                    Err(_) => break,
                }
            }
            if batch.len() >= max_batch {
                break;
            }
            tokio::task::yield_now().await;
            match rx.try_recv() {
                Ok(pending) => batch.push(pending),
                Err(_) => break,
            }
        }

        let mut keys: Vec<K> = Vec::with_capacity(batch.len());
        let mut waiting: HashMap<K, Vec<oneshot::Sender<LoadResult<V>>>> = HashMap::new();
        for (key, tx) in batch {
            let senders = waiting.entry(key.clone()).or_default();
            if senders.is_empty() {
                keys.push(key);
            }
            senders.push(tx);
        }

        stats.batches.fetch_add(1, Ordering::Relaxed);
        stats.keys.fetch_add(keys.len() as u64, Ordering::Relaxed);
        debug!(relation, keys = keys.len(), "Dispatching batch");

        tokio::spawn(resolve(relation, keys, waiting, fetch.clone()));
    }
}

async fn resolve<K, V, F>(
    relation: &'static str,
    keys: Vec<K>,
    mut waiting: HashMap<K, Vec<oneshot::Sender<LoadResult<V>>>>,
    fetch: Arc<F>,
) where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFn<K, V>,
{
    match fetch.load(&keys).await {
        Ok(mut values) => {
            for key in keys {
                let result = match values.remove(&key) {
                    Some(Ok(value)) => Ok(Some(value)),
                    Some(Err(e)) => {
                        debug!(relation, ?key, error = %e, "Key failed to load");
                        Err(LoadError::from(e))
                    }
                    None => Ok(None),
                };
                for tx in waiting.remove(&key).unwrap_or_default() {
                    let _ = tx.send(result.clone());
                }
            }
        }
        Err(e) => {
            tracing::warn!(relation, keys = keys.len(), error = %e, "Batch fetch failed");
            let error = LoadError::from(e);
            for tx in waiting.into_values().flatten() {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    /// Maps `k` to `k * 10`; keys listed in `failing` error individually
    #[derive(Clone, Default)]
    struct Times10 {
        calls: Arc<AtomicUsize>,
        batches: Arc<Mutex<Vec<Vec<u32>>>>,
        failing: Vec<u32>,
        fail_all: Arc<Mutex<bool>>,
        missing: Vec<u32>,
    }

    impl BatchFn<u32, u32> for Times10 {
        async fn load(&self, keys: &[u32]) -> DbResult<HashMap<u32, DbResult<u32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().push(keys.to_vec());
            if *self.fail_all.lock() {
                return Err(DbError::Decode("batch down".to_string()));
            }
            Ok(keys
                .iter()
                .filter(|k| !self.missing.contains(k))
                .map(|k| {
                    let value = if self.failing.contains(k) {
                        Err(DbError::Decode(format!("bad row {}", k)))
                    } else {
                        Ok(k * 10)
                    };
                    (*k, value)
                })
                .collect())
        }
    }

    fn loader(fetch: Times10) -> BatchLoader<u32, u32> {
        BatchLoader::new("times10", fetch, LoaderConfig::default())
    }

    #[tokio::test]
    async fn concurrent_loads_of_one_key_fetch_once() {
        let fetch = Times10::default();
        let loader = loader(fetch.clone());

        let results = join_all((0..50).map(|_| loader.load(7))).await;

        assert_eq!(results.len(), 50);
        for result in results {
            assert_matches!(result, Ok(Some(70)));
        }
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.stats().batches(), 1);
    }

    #[tokio::test]
    async fn load_all_keeps_positions_and_dedupes() {
        let fetch = Times10::default();
        let loader = loader(fetch.clone());

        let results = loader.load_all(&[5, 5, 1, 5, 2]).await;
        let values: Vec<Option<u32>> = results.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(values, vec![Some(50), Some(50), Some(10), Some(50), Some(20)]);
        assert_eq!(*fetch.batches.lock(), vec![vec![5, 1, 2]]);
    }

    #[tokio::test]
    async fn cached_keys_are_not_fetched_again() {
        let fetch = Times10::default();
        let loader = loader(fetch.clone());

        assert_matches!(loader.load(1).await, Ok(Some(10)));
        assert_matches!(loader.load(2).await, Ok(Some(20)));
        assert_matches!(loader.load(1).await, Ok(Some(10)));
        loader.load_all(&[1, 2]).await;

        assert_eq!(*fetch.batches.lock(), vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn cleared_keys_are_fetched_again() {
        let fetch = Times10::default();
        let loader = loader(fetch.clone());

        assert_matches!(loader.load(4).await, Ok(Some(40)));
        loader.clear(&4);
        assert_matches!(loader.load(4).await, Ok(Some(40)));
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_keys_resolve_empty() {
        let fetch = Times10 {
            missing: vec![3],
            ..Default::default()
        };
        let loader = loader(fetch.clone());

        let results = loader.load_all(&[3, 4]).await;
        assert_matches!(results[0], Ok(None));
        assert_matches!(results[1], Ok(Some(40)));

        // Empty is a cached answer
        assert_matches!(loader.load(3).await, Ok(None));
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_failing_key_does_not_affect_the_rest() {
        let fetch = Times10 {
            failing: vec![3],
            ..Default::default()
        };
        let loader = loader(fetch.clone());

        let results = loader.load_all(&[1, 3, 2]).await;
        assert_matches!(results[0], Ok(Some(10)));
        assert_matches!(results[1], Err(LoadError::Store(_)));
        assert_matches!(results[2], Ok(Some(20)));

        // The failure was evicted and is retried; the others stay cached
        assert_matches!(loader.load(3).await, Err(LoadError::Store(_)));
        assert_matches!(loader.load(1).await, Ok(Some(10)));
        assert_eq!(*fetch.batches.lock(), vec![vec![1, 3, 2], vec![3]]);
    }

    #[tokio::test]
    async fn batch_failures_reach_every_key_and_can_be_retried() {
        let fetch = Times10::default();
        *fetch.fail_all.lock() = true;
        let loader = loader(fetch.clone());

        let results = loader.load_all(&[1, 2]).await;
        assert!(results.iter().all(|r| matches!(r, Err(LoadError::Store(_)))));

        *fetch.fail_all.lock() = false;
        let results = loader.load_all(&[1, 2]).await;
        assert_matches!(results[0], Ok(Some(10)));
        assert_matches!(results[1], Ok(Some(20)));
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn max_batch_splits_large_rounds() {
        let fetch = Times10::default();
        let loader = BatchLoader::new(
            "times10",
            fetch.clone(),
            LoaderConfig {
                wait: Duration::ZERO,
                max_batch: 4,
            },
        );

        let keys: Vec<u32> = (0..10).collect();
        let results = loader.load_all(&keys).await;

        assert!(results.iter().all(|r| r.is_ok()));
        let mut sizes: Vec<usize> = fetch.batches.lock().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 4, 4]);
        assert_eq!(loader.stats().keys(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn loads_from_spawned_tasks_share_the_cache() {
        let fetch = Times10::default();
        let loader = Arc::new(loader(fetch.clone()));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let loader = loader.clone();
                tokio::spawn(async move { loader.load(9).await })
            })
            .collect();

        for handle in handles {
            assert_matches!(handle.await.unwrap(), Ok(Some(90)));
        }
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 1);
    }

    struct Slow {
        finished: Arc<AtomicUsize>,
    }

    impl BatchFn<u32, u32> for Slow {
        async fn load(&self, keys: &[u32]) -> DbResult<HashMap<u32, DbResult<u32>>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(keys.iter().map(|k| (*k, Ok(*k))).collect())
        }
    }

    #[tokio::test]
    async fn dropped_loader_lets_in_flight_fetch_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(BatchLoader::new(
            "slow",
            Slow {
                finished: finished.clone(),
            },
            LoaderConfig::default(),
        ));

        let caller = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load(1).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(loader.stats().batches(), 1);

        caller.abort();
        drop(loader);
        assert!(caller.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
