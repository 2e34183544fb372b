use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use batchload::{
    discover, BoxedError, CompositionTable, DescriptorMeta, DescriptorOrigin, ItemResult,
    ListBatchFn, LoaderContainer, LoaderDecl, LoaderOptions, MappedBatchFn, OptionsCustomizer,
    RegistryConsumer, RegistryError, RegistryProvider, RegistryRef,
};

struct UserContext {
    map: HashMap<i64, String>,
    calls: AtomicUsize,
}

impl UserContext {
    fn new(pairs: &[(i64, &str)]) -> Arc<Self> {
        Arc::new(Self {
            map: pairs.iter().map(|(k, v)| (*k, (*v).to_owned())).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct UserBatchFn;

#[async_trait]
impl ListBatchFn for UserBatchFn {
    type Key = i64;
    type Value = String;
    type Context = Arc<UserContext>;

    async fn load(
        keys: &[i64],
        context: &Arc<UserContext>,
    ) -> Result<Vec<ItemResult<String>>, BoxedError> {
        context.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keys
            .iter()
            .map(|k| Ok(context.map.get(k).cloned().unwrap_or_default()))
            .collect())
    }
}

struct TeamBatchFn;

#[async_trait]
impl MappedBatchFn for TeamBatchFn {
    type Key = i64;
    type Value = String;
    type Context = Arc<UserContext>;

    async fn load(
        keys: &[i64],
        context: &Arc<UserContext>,
    ) -> Result<HashMap<i64, String>, BoxedError> {
        context.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keys
            .iter()
            .filter_map(|k| context.map.get(k).map(|v| (*k, v.clone())))
            .collect())
    }
}

fn users_decl(context: &Arc<UserContext>) -> LoaderDecl {
    let context = context.clone();
    LoaderDecl::list_batch::<UserBatchFn>(move || context.clone())
}

fn teams_decl(context: &Arc<UserContext>) -> LoaderDecl {
    let context = context.clone();
    LoaderDecl::mapped_batch::<TeamBatchFn>(move || context.clone())
}

struct AccountComponents {
    context: Arc<UserContext>,
}

impl LoaderContainer for AccountComponents {
    fn own_loader(&self) -> Option<LoaderDecl> {
        Some(users_decl(&self.context))
    }

    fn member_loaders(&self) -> Vec<(String, LoaderDecl)> {
        vec![("teams".to_owned(), teams_decl(&self.context))]
    }
}

struct EmptyComponents;

impl LoaderContainer for EmptyComponents {
    fn member_loaders(&self) -> Vec<(String, LoaderDecl)> {
        Vec::new()
    }
}

struct CapBatchSize(usize);

impl OptionsCustomizer for CapBatchSize {
    fn customize(
        &self,
        _descriptor: &DescriptorMeta<'_>,
        options: &mut LoaderOptions,
    ) -> Result<(), BoxedError> {
        options.max_batch_size = Some(self.0);
        Ok(())
    }
}

struct DoubleBatchSize;

impl OptionsCustomizer for DoubleBatchSize {
    fn customize(
        &self,
        _descriptor: &DescriptorMeta<'_>,
        options: &mut LoaderOptions,
    ) -> Result<(), BoxedError> {
        options.max_batch_size = options.max_batch_size.map(|size| size * 2);
        Ok(())
    }
}

struct FailingCustomizer;

impl OptionsCustomizer for FailingCustomizer {
    fn customize(
        &self,
        _descriptor: &DescriptorMeta<'_>,
        _options: &mut LoaderOptions,
    ) -> Result<(), BoxedError> {
        Err("customizer exploded".into())
    }
}

#[tokio::test]
async fn discovers_direct_and_container_candidates() {
    let context = UserContext::new(&[]);
    let mut table = CompositionTable::new();
    table.register_loader("users", users_decl(&context));
    table.register_container("accounts", Arc::new(AccountComponents { context: context.clone() }));

    let descriptors = discover(&table).unwrap();
    let names: Vec<_> = descriptors.iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["users", "accounts", "teams"]);

    assert_eq!(
        descriptors[2].origin(),
        &DescriptorOrigin::Field { container: "accounts".to_owned(), field: "teams".to_owned() }
    );
}

#[tokio::test]
async fn invalid_candidate_fails_discovery() {
    let mut table = CompositionTable::new();
    table.register_container("broken", Arc::new(EmptyComponents));

    match discover(&table) {
        Err(RegistryError::InvalidDataLoaderType { candidate }) => assert_eq!(candidate, "broken"),
        other => panic!("expected InvalidDataLoaderType, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_names_fail_the_build() {
    let context = UserContext::new(&[]);
    let mut table = CompositionTable::new();
    table.register_loader("users", users_decl(&context));
    table.register_loader("members", users_decl(&context).named("users"));

    let provider = RegistryProvider::new(table);
    match provider.registry() {
        Err(RegistryError::DuplicateLoaderName { name, .. }) => assert_eq!(name, "users"),
        other => panic!("expected DuplicateLoaderName, got {other:?}"),
    }
}

#[tokio::test]
async fn customizers_apply_in_registration_order() {
    let context = UserContext::new(&[(1, "a"), (2, "b"), (3, "c")]);
    let mut table = CompositionTable::new();
    table.register_loader("users", users_decl(&context));
    // Cap to 1, then double: effective chunk size 2. The reverse order would
    // leave chunks of 1 and take three invocations below.
    table.register_customizer(Arc::new(CapBatchSize(1)));
    table.register_customizer(Arc::new(DoubleBatchSize));

    let registry = RegistryProvider::new(table).registry().unwrap();
    let users = registry.get::<i64, String>("users").unwrap();

    let loads = users.load_many(vec![1, 2, 3]);
    users.dispatch();
    for outcome in loads.await {
        outcome.unwrap();
    }
    assert_eq!(context.calls(), 2);
}

#[tokio::test]
async fn failing_customizer_aborts_the_build() {
    let context = UserContext::new(&[]);
    let mut table = CompositionTable::new();
    table.register_loader("users", users_decl(&context));
    table.register_customizer(Arc::new(FailingCustomizer));

    assert!(matches!(
        RegistryProvider::new(table).registry(),
        Err(RegistryError::Discovery { .. })
    ));
}

#[tokio::test]
async fn registries_do_not_share_cache_state() {
    let context = UserContext::new(&[(1, "a")]);
    let mut table = CompositionTable::new();
    table.register_loader("users", users_decl(&context));
    let provider = RegistryProvider::new(table);

    let first = provider.registry().unwrap();
    let users = first.get::<i64, String>("users").unwrap();
    let load = users.load(1);
    users.dispatch();
    assert_eq!(load.await.unwrap(), Some("a".to_owned()));

    // Same key in a second request's registry hits the backend again.
    let second = provider.registry().unwrap();
    let users = second.get::<i64, String>("users").unwrap();
    let load = users.load(1);
    users.dispatch();
    assert_eq!(load.await.unwrap(), Some("a".to_owned()));
    assert_eq!(context.calls(), 2);
}

#[tokio::test]
async fn singleton_instance_is_reset_between_requests() {
    let context = UserContext::new(&[(1, "a")]);
    let loader = batchload::Loader::list_batch::<UserBatchFn>(
        context.clone(),
        LoaderOptions::new(),
    );
    let mut table = CompositionTable::new();
    table.register_loader("users", LoaderDecl::from_instance(loader));
    let provider = RegistryProvider::new(table);

    let first = provider.registry().unwrap();
    let users = first.get::<i64, String>("users").unwrap();
    let load = users.load(1);
    users.dispatch();
    load.await.unwrap();

    let second = provider.registry().unwrap();
    let users = second.get::<i64, String>("users").unwrap();
    let load = users.load(1);
    users.dispatch();
    load.await.unwrap();
    assert_eq!(context.calls(), 2);
}

#[tokio::test]
async fn get_is_typed_by_key_and_value() {
    let context = UserContext::new(&[]);
    let mut table = CompositionTable::new();
    table.register_loader("users", users_decl(&context));
    let registry = RegistryProvider::new(table).registry().unwrap();

    assert!(registry.get::<i64, String>("users").is_some());
    assert!(registry.get::<String, String>("users").is_none());
    assert!(registry.get::<i64, String>("unknown").is_none());
    assert!(registry.contains("users"));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn dispatch_all_flushes_every_loader() {
    let context = UserContext::new(&[(1, "a"), (7, "g")]);
    let mut table = CompositionTable::new();
    table.register_loader("users", users_decl(&context));
    table.register_loader("teams", teams_decl(&context));
    let registry = RegistryProvider::new(table).registry().unwrap();

    let user = registry.get::<i64, String>("users").unwrap().load(1);
    let team = registry.get::<i64, String>("teams").unwrap().load(7);
    registry.dispatch_all();

    assert_eq!(user.await.unwrap(), Some("a".to_owned()));
    assert_eq!(team.await.unwrap(), Some("g".to_owned()));
    assert_eq!(context.calls(), 2);
}

struct IntrospectContext {
    registry: OnceLock<RegistryRef>,
}

impl RegistryConsumer for IntrospectContext {
    fn attach_registry(&self, registry: RegistryRef) {
        let _ = self.registry.set(registry);
    }
}

struct IntrospectBatchFn;

#[async_trait]
impl ListBatchFn for IntrospectBatchFn {
    type Key = i64;
    type Value = String;
    type Context = Arc<IntrospectContext>;

    async fn load(
        keys: &[i64],
        context: &Arc<IntrospectContext>,
    ) -> Result<Vec<ItemResult<String>>, BoxedError> {
        let names = context
            .registry
            .get()
            .and_then(RegistryRef::upgrade)
            .map(|registry| registry.names().join(","))
            .unwrap_or_default();
        Ok(keys.iter().map(|_| Ok(names.clone())).collect())
    }
}

#[tokio::test]
async fn registry_consumer_observes_the_full_registry() {
    let users_context = UserContext::new(&[]);
    let introspect_context = Arc::new(IntrospectContext { registry: OnceLock::new() });

    let mut table = CompositionTable::new();
    table.register_loader("users", users_decl(&users_context));
    let decl = {
        let context = introspect_context.clone();
        LoaderDecl::list_batch::<IntrospectBatchFn>(move || context.clone())
            .registry_consumer(introspect_context.clone())
    };
    table.register_loader("introspect", decl);

    let registry = RegistryProvider::new(table).registry().unwrap();
    let introspect = registry.get::<i64, String>("introspect").unwrap();
    let load = introspect.load(1);
    introspect.dispatch();

    // The consumer sees its siblings and itself, already named.
    assert_eq!(load.await.unwrap(), Some("users,introspect".to_owned()));
}
