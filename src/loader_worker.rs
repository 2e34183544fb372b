use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::mem;
use std::slice;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{span, Level};
use tracing_futures::Instrument;

use crate::{
    cache::Cache,
    error::LoadOutcome,
    loader_op::{ChunkOutcome, LoadRequest, LoaderOp},
    options::LoaderOptions,
    strategy::BatchStrategy,
};
#[cfg(feature = "stats")]
use crate::worker_stats::WorkerStats;

/// A `LoaderWorker` is the "single-thread" worker task that actually does the
/// loading work.
///
/// Once started, it runs in a loop until the parent Loader aborts its
/// `JoinHandle` or every handle's tx channel is dropped.
///
/// All mutable loader state lives here: the pending-key window for the next
/// dispatch cycle, the waiters attached to those keys, the keys currently in
/// flight, and the results cache. Operations from `Loader` handles are muxed
/// sequentially, which makes the snapshot-and-clear step of a dispatch atomic
/// with respect to concurrent loads: a key that arrives after the snapshot
/// belongs to the next cycle.
///
/// A dispatch partitions the window into chunks of at most
/// `options.max_batch_size` keys and spawns one task per chunk, so chunks
/// from the same dispatch execute concurrently. Each chunk task fans its
/// per-key outcomes back over the completion channel; the worker keeps
/// accepting loads while chunks are in flight.
pub struct LoaderWorker<K, V, S, CacheT>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send,
    S: BatchStrategy<Key = K, Value = V> + Send,
    CacheT: Cache<K = K, V = LoadOutcome<V>>,
{
    cache: CacheT,
    request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
    chunk_tx: mpsc::UnboundedSender<ChunkOutcome<K, V>>,
    chunk_rx: mpsc::UnboundedReceiver<ChunkOutcome<K, V>>,
    /// Keys queued for the next dispatch, in arrival order, deduplicated.
    window: Vec<K>,
    window_keys: HashSet<K>,
    /// Waiters for keys in the window.
    waiters: HashMap<K, Vec<oneshot::Sender<LoadOutcome<V>>>>,
    /// Waiters captured at dispatch, grouped by the chunk fetching them.
    /// Keeping cycles separate means a key re-queued while an older fetch is
    /// still running resolves from its own cycle's chunk.
    in_flight: HashMap<u64, HashMap<K, Vec<oneshot::Sender<LoadOutcome<V>>>>>,
    /// Which running chunk a key belongs to, for attaching late waiters.
    in_flight_keys: HashMap<K, u64>,
    next_chunk_id: u64,
    context: Arc<S::Context>,
    options: LoaderOptions,
    #[cfg(feature = "stats")]
    stats: WorkerStats,
    phantom_strategy: PhantomData<S>,
    debug_name: &'static str,
}

impl<K, V, S, CacheT> LoaderWorker<K, V, S, CacheT>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send,
    S: BatchStrategy<Key = K, Value = V> + Send,
    CacheT: Cache<K = K, V = LoadOutcome<V>>,
{
    pub fn new(
        cache: CacheT,
        request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
        context: Arc<S::Context>,
        options: LoaderOptions,
    ) -> Self {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let debug_name = std::any::type_name::<(K, V)>();
        Self {
            cache,
            request_rx,
            chunk_tx,
            chunk_rx,
            window: Vec::new(),
            window_keys: HashSet::new(),
            waiters: HashMap::new(),
            in_flight: HashMap::new(),
            in_flight_keys: HashMap::new(),
            next_chunk_id: 0,
            context,
            options,
            #[cfg(feature = "stats")]
            stats: WorkerStats::new(debug_name),
            phantom_strategy: PhantomData,
            debug_name,
        }
    }

    pub async fn start(self) {
        let span = span!(Level::TRACE, "LoaderWorker", kv = self.debug_name);
        self.run().instrument(span).await
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                op = self.request_rx.recv() => match op {
                    None => {
                        tracing::info!("Tx channel closed. Terminating LoaderWorker.");
                        return;
                    }
                    Some(op) => self.mux_op(op),
                },
                Some(chunk) = self.chunk_rx.recv() => self.complete_chunk(chunk),
            }
        }
    }

    #[tracing::instrument(skip(self))]
    fn mux_op(&mut self, op: LoaderOp<K, V>) {
        match op {
            LoaderOp::Load(request) => self.enqueue_load(request),
            LoaderOp::Dispatch => self.dispatch(),
            LoaderOp::Prime(key, value) => {
                if self.options.caching {
                    self.cache.insert(key, Ok(Some(value)));
                }
            }
            LoaderOp::PrimeMany(key_vals) => {
                if self.options.caching {
                    self.cache
                        .insert_many(key_vals.into_iter().map(|(k, v)| (k, Ok(Some(v)))));
                }
            }
            LoaderOp::Clear(key) => self.cache.remove(slice::from_ref(&key)),
            LoaderOp::ClearMany(keys) => self.cache.remove(&keys),
            LoaderOp::ClearAll => self.cache.flush(),
            LoaderOp::Configure(options) => self.options = options,
        }
    }

    fn enqueue_load(&mut self, request: LoadRequest<K, V>) {
        let LoadRequest { key, response_tx } = request;
        #[cfg(feature = "stats")]
        self.stats.record_load_request();

        if self.options.caching {
            if let Some(outcome) = self.cache.get(&key) {
                tracing::debug!(?key, "cache hit");
                #[cfg(feature = "stats")]
                self.stats.record_cache_hit();
                let _ = response_tx.send(outcome.clone());
                return;
            }
        }
        if self.window_keys.contains(&key) {
            // Already queued this cycle; one fetch serves all waiters.
            self.waiters.entry(key).or_default().push(response_tx);
            return;
        }
        if self.options.caching {
            if let Some(chunk_id) = self.in_flight_keys.get(&key) {
                // The key was dispatched and its fetch is still running.
                if let Some(chunk_waiters) = self.in_flight.get_mut(chunk_id) {
                    chunk_waiters.entry(key).or_default().push(response_tx);
                    return;
                }
            }
        }
        tracing::debug!(?key, "queued for next dispatch");
        self.window.push(key.clone());
        self.window_keys.insert(key.clone());
        self.waiters.entry(key).or_default().push(response_tx);
    }

    fn dispatch(&mut self) {
        if self.window.is_empty() {
            return;
        }
        let keys = mem::take(&mut self.window);
        self.window_keys.clear();
        let chunk_size = self.options.chunk_size(keys.len());
        tracing::debug!(pending = keys.len(), chunk_size, "dispatching");
        #[cfg(feature = "stats")]
        self.stats.record_dispatch();

        let mut keys = keys.into_iter();
        loop {
            let chunk: Vec<K> = keys.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            self.spawn_chunk(chunk);
        }
    }

    fn spawn_chunk(&mut self, chunk: Vec<K>) {
        #[cfg(feature = "stats")]
        self.stats.record_chunk(chunk.len() as u32);
        let chunk_id = self.next_chunk_id;
        self.next_chunk_id += 1;

        let mut chunk_waiters = HashMap::with_capacity(chunk.len());
        for key in &chunk {
            let waiters = self.waiters.remove(key).unwrap_or_default();
            chunk_waiters.insert(key.clone(), waiters);
            self.in_flight_keys.insert(key.clone(), chunk_id);
        }
        self.in_flight.insert(chunk_id, chunk_waiters);

        let context = Arc::clone(&self.context);
        let chunk_tx = self.chunk_tx.clone();
        let policy = self.options.missing_keys;
        let span = span!(Level::DEBUG, "batch_chunk", kv = self.debug_name, keys = chunk.len());
        tokio::task::spawn(
            async move {
                let outcomes = S::run(chunk, context, policy).await;
                let _ = chunk_tx.send(ChunkOutcome { chunk_id, outcomes });
            }
            .instrument(span),
        );
    }

    #[tracing::instrument(skip(self, chunk))]
    fn complete_chunk(&mut self, chunk: ChunkOutcome<K, V>) {
        let Some(mut chunk_waiters) = self.in_flight.remove(&chunk.chunk_id) else {
            return;
        };
        for (key, outcome) in chunk.outcomes {
            let waiters = chunk_waiters.remove(&key).unwrap_or_default();
            tracing::debug!(?key, waiters = waiters.len(), "chunk key resolved");
            for response_tx in waiters {
                let _ = response_tx.send(outcome.clone());
            }
            if self.in_flight_keys.get(&key) == Some(&chunk.chunk_id) {
                self.in_flight_keys.remove(&key);
            }
            if self.options.caching {
                self.cache.insert(key, outcome);
            }
        }
    }
}
