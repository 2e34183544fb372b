use std::sync::Arc;

use crate::{
    descriptor::{DescriptorOrigin, LoaderDecl, LoaderDescriptor},
    error::RegistryError,
    options::OptionsCustomizer,
};

/// A named object the candidate source flagged as loader-bearing.
#[derive(Clone)]
pub enum Candidate {
    /// The candidate is a loader declaration itself.
    Loader(LoaderDecl),
    /// The candidate holds loader declarations as named members, and may
    /// additionally be a loader in its own right.
    Container(Arc<dyn LoaderContainer>),
}

/// A component that exposes loader declarations as named sub-values.
///
/// This is the explicit counterpart of scanning an object's fields: the
/// container decides which members to expose and under which names, so
/// non-public members are simply whatever the implementation chooses to
/// hand out.
pub trait LoaderContainer: Send + Sync {
    /// The container's own declaration, if the container is itself a loader.
    fn own_loader(&self) -> Option<LoaderDecl> {
        None
    }

    /// Member declarations, in a stable order.
    fn member_loaders(&self) -> Vec<(String, LoaderDecl)>;
}

/// The host-container surface discovery consumes: named loader-bearing
/// candidates plus the options customizers to run over every loader built.
///
/// Both listings must be stable across calls within one composition, so that
/// re-running discovery for each request yields reproducible registries.
pub trait CandidateSource: Send + Sync {
    fn loader_candidates(&self) -> Vec<(String, Candidate)>;

    fn options_customizers(&self) -> Vec<Arc<dyn OptionsCustomizer>> {
        Vec::new()
    }
}

/// An explicit registration table of loader declarations and customizers.
///
/// Built once at composition time; [`discover`] is then re-run over it for
/// every request.
#[derive(Default)]
pub struct CompositionTable {
    candidates: Vec<(String, Candidate)>,
    customizers: Vec<Arc<dyn OptionsCustomizer>>,
}

impl CompositionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a direct loader declaration under `name`.
    pub fn register_loader(&mut self, name: impl Into<String>, decl: LoaderDecl) -> &mut Self {
        self.candidates.push((name.into(), Candidate::Loader(decl)));
        self
    }

    /// Registers a container candidate whose members are scanned.
    pub fn register_container(
        &mut self,
        name: impl Into<String>,
        container: Arc<dyn LoaderContainer>,
    ) -> &mut Self {
        self.candidates.push((name.into(), Candidate::Container(container)));
        self
    }

    /// Appends a customizer to the chain. Application order is registration
    /// order.
    pub fn register_customizer(&mut self, customizer: Arc<dyn OptionsCustomizer>) -> &mut Self {
        self.customizers.push(customizer);
        self
    }
}

impl CandidateSource for CompositionTable {
    fn loader_candidates(&self) -> Vec<(String, Candidate)> {
        self.candidates.clone()
    }

    fn options_customizers(&self) -> Vec<Arc<dyn OptionsCustomizer>> {
        self.customizers.clone()
    }
}

/// Expands the source's candidates into loader descriptors.
///
/// Idempotent and re-runnable; the common usage pattern invokes it freshly
/// per request. Direct candidates yield one descriptor named after the
/// declaration or the candidate itself. Container candidates yield one
/// descriptor for their own declaration (if any) plus one per member, named
/// after the declaration or the member field, so a container that is itself
/// a loader produces entries distinct from its members'. A container
/// exposing no declaration at all fails the whole discovery with
/// [`RegistryError::InvalidDataLoaderType`].
pub fn discover(source: &dyn CandidateSource) -> Result<Vec<LoaderDescriptor>, RegistryError> {
    let mut descriptors = Vec::new();
    for (candidate_name, candidate) in source.loader_candidates() {
        match candidate {
            Candidate::Loader(decl) => {
                descriptors.push(LoaderDescriptor::from_decl(
                    decl,
                    candidate_name.clone(),
                    DescriptorOrigin::Candidate { name: candidate_name },
                ));
            }
            Candidate::Container(container) => {
                let own = container.own_loader();
                let members = container.member_loaders();
                if own.is_none() && members.is_empty() {
                    return Err(RegistryError::InvalidDataLoaderType {
                        candidate: candidate_name,
                    });
                }
                if let Some(decl) = own {
                    descriptors.push(LoaderDescriptor::from_decl(
                        decl,
                        candidate_name.clone(),
                        DescriptorOrigin::Candidate { name: candidate_name.clone() },
                    ));
                }
                for (field, decl) in members {
                    let origin = DescriptorOrigin::Field {
                        container: candidate_name.clone(),
                        field: field.clone(),
                    };
                    descriptors.push(LoaderDescriptor::from_decl(decl, field, origin));
                }
            }
        }
    }
    tracing::debug!(count = descriptors.len(), "discovered loader descriptors");
    Ok(descriptors)
}
