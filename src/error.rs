use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by batch functions and customizers.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared form of a batch function failure, cloned into every affected
/// per-key outcome of a chunk.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The outcome a single `load` resolves to.
///
/// `Ok(None)` means the mapped batch function produced no value for the key
/// and the loader is configured to treat absence as "not found" rather than
/// an error.
pub type LoadOutcome<V> = Result<Option<V>, LoadError>;

/// Errors that abort a registry build.
///
/// These are structural: if any of them occurs, no registry is returned and
/// no loaders are left registered.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A candidate was registered as a data loader but exposes no batch
    /// capability, neither directly nor through any member.
    #[error("candidate '{candidate}' is declared as a data loader but exposes no batch capability")]
    InvalidDataLoaderType { candidate: String },

    /// Two descriptors resolved to the same registry name.
    #[error("duplicate loader name '{name}' ({first} and {second})")]
    DuplicateLoaderName {
        name: String,
        first: String,
        second: String,
    },

    /// A discovery collaborator or options customizer failed.
    #[error("registry assembly failed")]
    Discovery {
        #[source]
        source: BoxedError,
    },
}

/// Errors a `load` future can resolve with.
///
/// Batch failures are scoped to the dispatch chunk that produced them; other
/// chunks and other loaders are unaffected. The core never retries.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The mapped batch function produced no value for this key and the
    /// loader treats absence as an error.
    #[error("no value was produced for the requested key")]
    NotFound,

    /// The list batch function reported an error for this key's slot.
    #[error("batch function reported an error for this key: {0}")]
    Item(SharedError),

    /// The list batch function returned a result of the wrong length, so
    /// results cannot be aligned with keys.
    #[error("batch function returned {actual} results for {expected} keys")]
    BatchShape { expected: usize, actual: usize },

    /// The batch function itself failed; every key in the chunk receives
    /// this error with the shared underlying cause.
    #[error("batch function failed: {0}")]
    BatchExecution(SharedError),

    /// The loader's worker task is gone.
    #[error("loader has shut down")]
    LoaderClosed,
}
