//! Request-scoped batched data loading: batching/deduplicating/caching
//! loaders with explicit dispatch, assembled into a fresh named registry per
//! request from declared loader definitions.

mod batch_function;
mod cache;
mod descriptor;
mod discovery;
mod error;
mod loader;
mod loader_op;
mod loader_worker;
mod options;
mod registry;
mod registry_builder;
mod strategy;
#[cfg(feature = "stats")]
mod worker_stats;

pub use batch_function::{ItemResult, ListBatchFn, MappedBatchFn};
pub use descriptor::{BatchVariant, DescriptorMeta, DescriptorOrigin, LoaderDecl, LoaderDescriptor};
pub use discovery::{discover, Candidate, CandidateSource, CompositionTable, LoaderContainer};
pub use error::{BoxedError, LoadError, LoadOutcome, RegistryError, SharedError};
pub use loader::{LoadFuture, Loader};
pub use options::{LoaderOptions, MissingKeyPolicy, OptionsCustomizer};
pub use registry::{Registry, RegistryConsumer, RegistryRef};
pub use registry_builder::{RegistryBuilder, RegistryProvider};
