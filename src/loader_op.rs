use tokio::sync::oneshot;

use crate::error::LoadOutcome;
use crate::options::LoaderOptions;

/// Set of possible requests that can be sent to the [`LoaderWorker`].
///
/// The categories of commands are Load, Dispatch, Prime, Clear, and
/// Configure; Prime and Clear have single and many variants for convenience.
/// Dispatch is the only trigger for batch execution: the worker never flushes
/// its pending window on its own.
#[derive(Debug)]
pub enum LoaderOp<K, V> {
    /// Queue a key for the next dispatch cycle (or answer it from cache).
    Load(LoadRequest<K, V>),
    /// Snapshot the pending window and execute it in chunks.
    Dispatch,
    /// Add values to the cache that were fetched from elsewhere.
    Prime(K, V),
    PrimeMany(Vec<(K, V)>),
    /// Remove values from the cache so that they will be reloaded when they
    /// are next requested.
    Clear(K),
    ClearMany(Vec<K>),
    ClearAll,
    /// Replace the worker's options. Used when a pre-built loader instance
    /// is re-registered for a new request.
    Configure(LoaderOptions),
}

/// A single queued key and the channel its outcome is delivered on.
#[derive(Debug)]
pub struct LoadRequest<K, V> {
    pub key: K,
    pub response_tx: oneshot::Sender<LoadOutcome<V>>,
}

/// Per-key outcomes of one executed chunk, fanned back into the worker from
/// the chunk's task.
#[derive(Debug)]
pub struct ChunkOutcome<K, V> {
    pub chunk_id: u64,
    pub outcomes: Vec<(K, LoadOutcome<V>)>,
}
