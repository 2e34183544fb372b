use crate::descriptor::DescriptorMeta;
use crate::error::BoxedError;

/// How a mapped-variant loader treats keys absent from its batch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingKeyPolicy {
    /// Absent keys resolve to `Ok(None)`.
    #[default]
    NotFound,
    /// Absent keys reject with [`LoadError::NotFound`](crate::LoadError::NotFound).
    Error,
}

/// Configuration a loader instance is built with.
///
/// Descriptors carry declared options on top of these defaults; the registry
/// builder then runs every [`OptionsCustomizer`] over them before the loader
/// is instantiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Upper bound on the number of keys handed to one batch function
    /// invocation. `None` or `Some(0)` means a single unbounded chunk.
    pub max_batch_size: Option<usize>,
    /// Whether resolved outcomes are kept in the loader cache.
    pub caching: bool,
    /// Declared metadata: the batch function requires a request context.
    pub context_required: bool,
    /// Absence policy for the mapped variant.
    pub missing_keys: MissingKeyPolicy,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_batch_size: None,
            caching: true,
            context_required: false,
            missing_keys: MissingKeyPolicy::default(),
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    pub fn context_required(mut self, required: bool) -> Self {
        self.context_required = required;
        self
    }

    pub fn missing_keys(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing_keys = policy;
        self
    }

    /// Effective chunk size for a window of `pending` keys.
    pub(crate) fn chunk_size(&self, pending: usize) -> usize {
        match self.max_batch_size {
            Some(size) if size > 0 => size,
            _ => pending.max(1),
        }
    }
}

/// A mutation applied to every loader's options before instantiation.
///
/// Customizers are global: each one sees every loader being built, in the
/// order the candidate source yields them. There is no per-loader filtering;
/// a customizer that only cares about some loaders inspects the descriptor
/// metadata it is handed. Any error aborts the whole registry build.
pub trait OptionsCustomizer: Send + Sync {
    fn customize(
        &self,
        descriptor: &DescriptorMeta<'_>,
        options: &mut LoaderOptions,
    ) -> Result<(), BoxedError>;
}
