use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::batch_function::{ListBatchFn, MappedBatchFn};
use crate::error::{LoadError, LoadOutcome, SharedError};
use crate::options::MissingKeyPolicy;

/// Executes one key chunk against a batch function and folds the result into
/// per-key outcomes.
///
/// The two implementations correspond to the two batch capability variants.
/// The variant is fixed when the loader is constructed; the worker itself is
/// variant-agnostic.
#[async_trait]
pub(crate) trait BatchStrategy: 'static {
    type Key: Send;
    type Value: Send;
    type Context: Send + Sync + 'static;

    async fn run(
        keys: Vec<Self::Key>,
        context: Arc<Self::Context>,
        policy: MissingKeyPolicy,
    ) -> Vec<(Self::Key, LoadOutcome<Self::Value>)>;
}

/// Index-aligned variant: the batch function must answer every key, in order.
pub(crate) struct ListStrategy<F>(PhantomData<F>);

#[async_trait]
impl<F> BatchStrategy for ListStrategy<F>
where
    F: ListBatchFn + Send + Sync + 'static,
    F::Key: Clone + Debug + Send + Sync,
    F::Context: 'static,
{
    type Key = F::Key;
    type Value = F::Value;
    type Context = F::Context;

    async fn run(
        keys: Vec<F::Key>,
        context: Arc<F::Context>,
        _policy: MissingKeyPolicy,
    ) -> Vec<(F::Key, LoadOutcome<F::Value>)> {
        match F::load(&keys, &context).await {
            Err(cause) => fail_chunk(keys, cause.into()),
            Ok(items) if items.len() != keys.len() => {
                let error = LoadError::BatchShape {
                    expected: keys.len(),
                    actual: items.len(),
                };
                tracing::warn!(?error, "discarding misaligned batch result");
                keys.into_iter().map(|key| (key, Err(error.clone()))).collect()
            }
            Ok(items) => keys
                .into_iter()
                .zip(items)
                .map(|(key, item)| {
                    let outcome = match item {
                        Ok(value) => Ok(Some(value)),
                        Err(cause) => Err(LoadError::Item(cause.into())),
                    };
                    (key, outcome)
                })
                .collect(),
        }
    }
}

/// Keyed-map variant: the batch function may answer any subset of the keys.
pub(crate) struct MappedStrategy<F>(PhantomData<F>);

#[async_trait]
impl<F> BatchStrategy for MappedStrategy<F>
where
    F: MappedBatchFn + Send + Sync + 'static,
    F::Key: Clone + Eq + Hash + Debug + Send + Sync,
    F::Context: 'static,
{
    type Key = F::Key;
    type Value = F::Value;
    type Context = F::Context;

    async fn run(
        keys: Vec<F::Key>,
        context: Arc<F::Context>,
        policy: MissingKeyPolicy,
    ) -> Vec<(F::Key, LoadOutcome<F::Value>)> {
        match F::load(&keys, &context).await {
            Err(cause) => fail_chunk(keys, cause.into()),
            Ok(mut values) => keys
                .into_iter()
                .map(|key| {
                    let outcome = match values.remove(&key) {
                        Some(value) => Ok(Some(value)),
                        None => match policy {
                            MissingKeyPolicy::NotFound => Ok(None),
                            MissingKeyPolicy::Error => Err(LoadError::NotFound),
                        },
                    };
                    (key, outcome)
                })
                .collect(),
        }
    }
}

fn fail_chunk<K, V>(keys: Vec<K>, cause: SharedError) -> Vec<(K, LoadOutcome<V>)> {
    tracing::warn!(%cause, "batch function failed");
    keys.into_iter()
        .map(|key| (key, Err(LoadError::BatchExecution(cause.clone()))))
        .collect()
}
