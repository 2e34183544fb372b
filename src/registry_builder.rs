use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    descriptor::LoaderDescriptor,
    discovery::{discover, CandidateSource},
    error::RegistryError,
    options::OptionsCustomizer,
    registry::{Registry, RegistryEntry},
};

/// Assembles one request's [`Registry`] from discovered descriptors.
///
/// Name uniqueness is validated before anything is instantiated, so a failed
/// build leaves no loaders behind. Every descriptor's declared options are
/// run through the full customizer chain (in chain order) before its loader
/// is constructed. Registry consumers are handed the back-reference only
/// after the registry's membership is complete.
#[derive(Default)]
pub struct RegistryBuilder {
    customizers: Vec<Arc<dyn OptionsCustomizer>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the customizer chain.
    pub fn with_customizers(mut self, customizers: Vec<Arc<dyn OptionsCustomizer>>) -> Self {
        self.customizers = customizers;
        self
    }

    /// Appends one customizer to the chain.
    pub fn customizer(mut self, customizer: Arc<dyn OptionsCustomizer>) -> Self {
        self.customizers.push(customizer);
        self
    }

    pub fn build(self, descriptors: Vec<LoaderDescriptor>) -> Result<Registry, RegistryError> {
        let mut first_origins = HashMap::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            if let Some(first) = first_origins.insert(descriptor.name(), descriptor.origin()) {
                return Err(RegistryError::DuplicateLoaderName {
                    name: descriptor.name().to_owned(),
                    first: first.to_string(),
                    second: descriptor.origin().to_string(),
                });
            }
        }

        let mut entries = IndexMap::with_capacity(descriptors.len());
        let mut consumers = Vec::new();
        for descriptor in descriptors {
            let mut options = descriptor.options().clone();
            for customizer in &self.customizers {
                customizer
                    .customize(&descriptor.meta(), &mut options)
                    .map_err(|source| RegistryError::Discovery { source })?;
            }
            tracing::debug!(name = descriptor.name(), ?options, "building loader");
            let erased = descriptor.instantiate(&options);
            if let Some(consumer) = descriptor.consumer() {
                consumers.push(consumer);
            }
            entries.insert(descriptor.name().to_owned(), RegistryEntry::from(erased));
        }

        let registry = Registry::from_entries(entries);
        let reference = registry.downgrade();
        for consumer in consumers {
            consumer.attach_registry(reference.clone());
        }
        Ok(registry)
    }
}

/// Produces a fresh registry per request from a fixed candidate source.
///
/// Holds the composition-time source; every [`registry`](Self::registry)
/// call re-runs discovery and assembles a new registry, so no queue or
/// cache state is shared between requests.
pub struct RegistryProvider<S> {
    source: S,
}

impl<S: CandidateSource> RegistryProvider<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn registry(&self) -> Result<Registry, RegistryError> {
        let descriptors = discover(&self.source)?;
        RegistryBuilder::new()
            .with_customizers(self.source.options_customizers())
            .build(descriptors)
    }
}
