use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::BoxedError;

/// Per-key slot in a list batch result: the value for the key at the same
/// index, or the reason that single key failed.
pub type ItemResult<V> = Result<V, BoxedError>;

/// A batch function that answers an ordered chunk of keys with an
/// index-aligned sequence of results.
///
/// The returned sequence must have exactly one slot per requested key, in
/// key order; a mismatched length fails the whole chunk. The batch function
/// receives the shared request context declared through [`Self::Context`];
/// loaders that need none use `()`. Multiple batch functions (and therefore
/// loaders) can share the same context, typically through an `Arc`.
///
/// Returning `Err` from `load` fails every key in the chunk with the same
/// shared cause.
#[async_trait]
pub trait ListBatchFn {
    type Key: Send;
    type Value: Send;
    type Context: Send + Sync;

    async fn load(
        keys: &[Self::Key],
        context: &Self::Context,
    ) -> Result<Vec<ItemResult<Self::Value>>, BoxedError>;
}

/// A batch function that answers a deduplicated chunk of keys with a
/// key→value mapping.
///
/// Partial results are allowed: keys absent from the mapping resolve
/// according to the loader's configured
/// [`MissingKeyPolicy`](crate::MissingKeyPolicy). Returning `Err` fails
/// every key in the chunk.
#[async_trait]
pub trait MappedBatchFn {
    type Key: Eq + Hash + Send;
    type Value: Send;
    type Context: Send + Sync;

    async fn load(
        keys: &[Self::Key],
        context: &Self::Context,
    ) -> Result<HashMap<Self::Key, Self::Value>, BoxedError>;
}
