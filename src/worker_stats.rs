#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Human readable name used to identify this worker stats when it is reported.
    tag: &'static str,
    /// Number of `LoaderOp::Load` that were received by the worker.
    load_requests: u32,
    /// The number of keys that were immediately found in the loader cache.
    cache_hits: u32,
    /// Number of dispatch cycles that actually flushed a non-empty window.
    dispatches: u32,
    /// Number of chunk batch-function invocations across all dispatches.
    chunks: u32,
    /// The total number of unique keys handed to batch functions.
    keys_dispatched: u32,
    /// The max number of keys in a single chunk.
    max_chunk_size: u32,
    /// The min number of keys in a single chunk.
    min_chunk_size: u32,
}

impl WorkerStats {
    pub fn new(tag: &'static str) -> Self {
        Self { tag, min_chunk_size: u32::MAX, ..Default::default() }
    }

    pub fn record_load_request(&mut self) {
        self.load_requests += 1;
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_dispatch(&mut self) {
        self.dispatches += 1;
    }

    pub fn record_chunk(&mut self, chunk_size: u32) {
        self.chunks += 1;
        self.keys_dispatched += chunk_size;
        if chunk_size > self.max_chunk_size {
            self.max_chunk_size = chunk_size;
        }
        if chunk_size < self.min_chunk_size {
            self.min_chunk_size = chunk_size;
        }
    }
}

impl Drop for WorkerStats {
    fn drop(&mut self) {
        tracing::debug!(worker_stats = ?self);
    }
}
