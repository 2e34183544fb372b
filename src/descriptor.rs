use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::{
    batch_function::{ListBatchFn, MappedBatchFn},
    loader::Loader,
    options::LoaderOptions,
    registry::RegistryConsumer,
};

/// Closed tag over the batch capability variants a loader can declare.
///
/// The variant is fixed when a declaration is created and drives which batch
/// strategy the loader is instantiated with; nothing is shape-checked at
/// runtime after that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchVariant {
    /// Ordered keys in, same-length index-aligned results out.
    List,
    /// Deduplicated keys in, partial key→value mapping out.
    Mapped,
}

/// A loader instance with its key/value types erased, plus the hook
/// `Registry::dispatch_all` uses to flush it.
pub(crate) struct ErasedLoader {
    pub(crate) handle: Box<dyn Any + Send + Sync>,
    pub(crate) dispatch: Box<dyn Fn() + Send + Sync>,
}

impl ErasedLoader {
    fn erase<K, V>(loader: Loader<K, V>) -> Self
    where
        K: 'static + Eq + std::hash::Hash + Clone + Debug + Send + Sync,
        V: 'static + Clone + Debug + Send,
    {
        let dispatcher = loader.clone();
        Self {
            handle: Box::new(loader),
            dispatch: Box::new(move || dispatcher.dispatch()),
        }
    }
}

type ConstructFn = dyn Fn(&LoaderOptions) -> ErasedLoader + Send + Sync;

/// A declared loader: everything needed to build a fresh instance for one
/// request, with key/value types erased so declarations of different shapes
/// can live in one composition table.
///
/// Declarations carry an optional explicit name (otherwise the registry name
/// is derived from where the declaration was found), declared options, and
/// optionally a [`RegistryConsumer`] to be handed the built registry.
#[derive(Clone)]
pub struct LoaderDecl {
    pub(crate) name: Option<String>,
    pub(crate) variant: BatchVariant,
    pub(crate) options: LoaderOptions,
    pub(crate) consumer: Option<Arc<dyn RegistryConsumer>>,
    pub(crate) construct: Arc<ConstructFn>,
}

impl Debug for LoaderDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderDecl")
            .field("name", &self.name)
            .field("variant", &self.variant)
            .field("options", &self.options)
            .finish()
    }
}

impl LoaderDecl {
    /// Declares an index-aligned loader for the batch function `F`.
    ///
    /// `context` is invoked once per registry build, so every request gets a
    /// loader with fresh internal state; share expensive resources by
    /// cloning an `Arc` inside the closure.
    pub fn list_batch<F>(context: impl Fn() -> F::Context + Send + Sync + 'static) -> Self
    where
        F: ListBatchFn + Send + Sync + 'static,
        F::Key: 'static + Eq + std::hash::Hash + Clone + Debug + Send + Sync,
        F::Value: 'static + Clone + Debug + Send,
        F::Context: 'static,
    {
        Self {
            name: None,
            variant: BatchVariant::List,
            options: LoaderOptions::default(),
            consumer: None,
            construct: Arc::new(move |options: &LoaderOptions| {
                ErasedLoader::erase(Loader::<F::Key, F::Value>::list_batch::<F>(
                    context(),
                    options.clone(),
                ))
            }),
        }
    }

    /// Declares a keyed-map loader for the batch function `F`.
    pub fn mapped_batch<F>(context: impl Fn() -> F::Context + Send + Sync + 'static) -> Self
    where
        F: MappedBatchFn + Send + Sync + 'static,
        F::Key: 'static + Eq + std::hash::Hash + Clone + Debug + Send + Sync,
        F::Value: 'static + Clone + Debug + Send,
        F::Context: 'static,
    {
        Self {
            name: None,
            variant: BatchVariant::Mapped,
            options: LoaderOptions::default(),
            consumer: None,
            construct: Arc::new(move |options: &LoaderOptions| {
                ErasedLoader::erase(Loader::<F::Key, F::Value>::mapped_batch::<F>(
                    context(),
                    options.clone(),
                ))
            }),
        }
    }

    /// Declares a pre-built loader instance shared across requests.
    ///
    /// At every registry build the instance is reconfigured with the final
    /// options and its cache is cleared, so no cached results leak from one
    /// request into the next. Prefer [`LoaderDecl::list_batch`] /
    /// [`LoaderDecl::mapped_batch`], which give each request its own worker.
    pub fn from_instance<K, V>(loader: Loader<K, V>) -> Self
    where
        K: 'static + Eq + std::hash::Hash + Clone + Debug + Send + Sync,
        V: 'static + Clone + Debug + Send,
    {
        let variant = loader.variant();
        Self {
            name: None,
            variant,
            options: LoaderOptions::default(),
            consumer: None,
            construct: Arc::new(move |options: &LoaderOptions| {
                loader.configure(options.clone());
                loader.clear_all();
                ErasedLoader::erase(loader.clone())
            }),
        }
    }

    /// Overrides the derived registry name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the declared options.
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers a consumer to be handed the registry once it is built.
    pub fn registry_consumer(mut self, consumer: Arc<dyn RegistryConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    pub fn variant(&self) -> BatchVariant {
        self.variant
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }
}

/// Where a discovered loader declaration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorOrigin {
    /// A candidate that is a loader declaration itself.
    Candidate { name: String },
    /// A member declaration inside a container candidate.
    Field { container: String, field: String },
}

impl fmt::Display for DescriptorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorOrigin::Candidate { name } => write!(f, "candidate '{name}'"),
            DescriptorOrigin::Field { container, field } => {
                write!(f, "field '{field}' of candidate '{container}'")
            }
        }
    }
}

/// Discovered metadata describing one loader before instantiation.
pub struct LoaderDescriptor {
    name: String,
    origin: DescriptorOrigin,
    variant: BatchVariant,
    options: LoaderOptions,
    consumer: Option<Arc<dyn RegistryConsumer>>,
    construct: Arc<ConstructFn>,
}

impl Debug for LoaderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderDescriptor")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("variant", &self.variant)
            .field("options", &self.options)
            .finish()
    }
}

impl LoaderDescriptor {
    /// Resolves a declaration into a descriptor, deriving the registry name
    /// from the declaration site when none was given explicitly.
    pub(crate) fn from_decl(decl: LoaderDecl, derived_name: String, origin: DescriptorOrigin) -> Self {
        Self {
            name: decl.name.unwrap_or(derived_name),
            origin,
            variant: decl.variant,
            options: decl.options,
            consumer: decl.consumer,
            construct: decl.construct,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &DescriptorOrigin {
        &self.origin
    }

    pub fn variant(&self) -> BatchVariant {
        self.variant
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub(crate) fn meta(&self) -> DescriptorMeta<'_> {
        DescriptorMeta {
            name: &self.name,
            variant: self.variant,
            origin: &self.origin,
        }
    }

    pub(crate) fn consumer(&self) -> Option<Arc<dyn RegistryConsumer>> {
        self.consumer.clone()
    }

    pub(crate) fn instantiate(&self, options: &LoaderOptions) -> ErasedLoader {
        (self.construct)(options)
    }
}

/// Read-only descriptor view handed to options customizers.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorMeta<'a> {
    pub name: &'a str,
    pub variant: BatchVariant,
    pub origin: &'a DescriptorOrigin,
}
