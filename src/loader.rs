use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::ops::Drop;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{self, JoinAll};
use tokio::sync::{mpsc, oneshot};

use crate::{
    batch_function::{ListBatchFn, MappedBatchFn},
    descriptor::BatchVariant,
    error::{LoadError, LoadOutcome},
    loader_op::{LoadRequest, LoaderOp},
    loader_worker::LoaderWorker,
    options::LoaderOptions,
    strategy::{BatchStrategy, ListStrategy, MappedStrategy},
};

/// Batch loads values from some expensive resource, primarily intended for
/// mitigating GraphQL's N+1 problem.
///
/// Users call [`Loader::load`] and [`Loader::load_many`] to queue keys; the
/// returned futures resolve only after a subsequent [`Loader::dispatch`]
/// flushes the pending window into batch-function invocations. The cache can
/// be cleared with [`Loader::clear`], [`Loader::clear_many`], and
/// [`Loader::clear_all`], and values can be added out-of-band through
/// [`Loader::prime`] and [`Loader::prime_many`].
///
/// The `Loader` struct is a cheap-to-clone handle over the pseudo
/// single-threaded domain of its `LoaderWorker`. Callers can invoke the
/// `Loader` from multiple parallel tasks; requested operations are enqueued
/// on the request queue and processed sequentially by the worker, with
/// results provided back over per-request oneshot channels. Dispatch is
/// strictly caller-driven: the worker never flushes on a timer or at the end
/// of an execution frame on its own.
///
/// When the last handle is dropped the worker task is aborted and any
/// unresolved load futures fail with [`LoadError::LoaderClosed`].
pub struct Loader<K, V>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send,
{
    request_tx: mpsc::UnboundedSender<LoaderOp<K, V>>,
    variant: BatchVariant,
    worker: Arc<WorkerGuard>,
}

impl<K, V> Clone for Loader<K, V>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send,
{
    fn clone(&self) -> Self {
        Self {
            request_tx: self.request_tx.clone(),
            variant: self.variant,
            worker: Arc::clone(&self.worker),
        }
    }
}

struct WorkerGuard(tokio::task::JoinHandle<()>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<K, V> Loader<K, V>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send,
{
    /// Creates a new index-aligned loader for the batch function `F`.
    pub fn list_batch<F>(context: F::Context, options: LoaderOptions) -> Self
    where
        F: ListBatchFn<Key = K, Value = V> + Send + Sync + 'static,
        F::Context: 'static,
    {
        Self::spawn::<ListStrategy<F>>(context, options, BatchVariant::List)
    }

    /// Creates a new keyed-map loader for the batch function `F`.
    pub fn mapped_batch<F>(context: F::Context, options: LoaderOptions) -> Self
    where
        F: MappedBatchFn<Key = K, Value = V> + Send + Sync + 'static,
        F::Context: 'static,
    {
        Self::spawn::<MappedStrategy<F>>(context, options, BatchVariant::Mapped)
    }

    fn spawn<S>(context: S::Context, options: LoaderOptions, variant: BatchVariant) -> Self
    where
        S: BatchStrategy<Key = K, Value = V> + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = LoaderWorker::<K, V, S, HashMap<K, LoadOutcome<V>>>::new(
            HashMap::new(),
            rx,
            Arc::new(context),
            options,
        );
        Self {
            request_tx: tx,
            variant,
            worker: Arc::new(WorkerGuard(tokio::task::spawn(worker.start()))),
        }
    }

    /// The capability variant this loader was built with.
    pub fn variant(&self) -> BatchVariant {
        self.variant
    }

    /// Queues `key` for the next dispatch cycle and returns a future that
    /// resolves once a later [`dispatch`](Self::dispatch) has fetched it.
    ///
    /// The key is enqueued when `load` is called, not when the future is
    /// first polled, so every key requested before a `dispatch` is part of
    /// that dispatch's batch window. If the key is already cached the future
    /// resolves without waiting for a dispatch; if it is already pending in
    /// the current window (or in flight, with caching enabled) the future
    /// attaches to the existing fetch instead of queueing a second one.
    pub fn load(&self, key: K) -> LoadFuture<V> {
        let (response_tx, response_rx) = oneshot::channel();
        let request = LoadRequest { key, response_tx };
        match self.request_tx.send(LoaderOp::Load(request)) {
            Ok(()) => LoadFuture { response_rx: Some(response_rx) },
            Err(_) => LoadFuture { response_rx: None },
        }
    }

    /// Queues many keys at once; resolves to one outcome per key, in order.
    pub fn load_many(&self, keys: Vec<K>) -> JoinAll<LoadFuture<V>> {
        future::join_all(keys.into_iter().map(|key| self.load(key)))
    }

    /// Flushes the pending window into batch-function invocations.
    ///
    /// The window is snapshotted atomically; keys queued after this call
    /// belong to the next cycle. The snapshot is split into chunks of at
    /// most `max_batch_size` keys and the chunks execute concurrently.
    /// Dispatching with an empty window is a no-op, and `dispatch` may be
    /// called any number of times.
    pub fn dispatch(&self) {
        let _ = self.request_tx.send(LoaderOp::Dispatch);
    }

    /// Adds a value to the cache.
    pub fn prime(&self, key: K, value: V) {
        let _ = self.request_tx.send(LoaderOp::Prime(key, value));
    }

    /// Adds many values to the cache at once.
    pub fn prime_many(&self, key_vals: Vec<(K, V)>) {
        let _ = self.request_tx.send(LoaderOp::PrimeMany(key_vals));
    }

    /// Removes a value from the cache.
    ///
    /// This key will be reloaded when it is next requested. Values already
    /// being fetched by an in-flight chunk are not affected.
    pub fn clear(&self, key: K) {
        let _ = self.request_tx.send(LoaderOp::Clear(key));
    }

    /// Removes multiple values from the cache at once.
    pub fn clear_many(&self, keys: Vec<K>) {
        let _ = self.request_tx.send(LoaderOp::ClearMany(keys));
    }

    /// Empties the cache.
    pub fn clear_all(&self) {
        let _ = self.request_tx.send(LoaderOp::ClearAll);
    }

    /// Replaces the worker's options. Only the registry builder does this,
    /// when a pre-built instance is re-registered for a new request.
    pub(crate) fn configure(&self, options: LoaderOptions) {
        let _ = self.request_tx.send(LoaderOp::Configure(options));
    }
}

/// Future returned by [`Loader::load`].
///
/// Resolves after the key's dispatch chunk completes, or immediately for
/// cache hits. Fails with [`LoadError::LoaderClosed`] if the loader's worker
/// went away before producing an outcome.
pub struct LoadFuture<V> {
    response_rx: Option<oneshot::Receiver<LoadOutcome<V>>>,
}

impl<V> Future for LoadFuture<V> {
    type Output = LoadOutcome<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().response_rx.as_mut() {
            None => Poll::Ready(Err(LoadError::LoaderClosed)),
            Some(response_rx) => match Pin::new(response_rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(_)) => Poll::Ready(Err(LoadError::LoaderClosed)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
