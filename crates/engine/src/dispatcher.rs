//! Extraction dispatcher
//!
//! Drives one extraction run through
//! `Created -> Initialized -> Running -> {Completed, Failed}`.
//!
//! `initialize` is the only validation gate. Once a run is started every
//! error is per-item: it is logged, counted, and the run moves on to the next
//! item. Each worker owns its own set of feature modules and therefore its
//! own writers; items are pulled from the shared provider.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let provider = Arc::new(TreeWalkPathProvider::from_config(&config.input)?);
//! let mut dispatcher = ExtractionDispatcher::new();
//! if dispatcher.initialize(provider.clone(), &config, &registry, &database) {
//!     dispatcher.register_listener(provider);
//!     dispatcher.start();
//!     dispatcher.block();
//! }
//! ```

use crate::background::WorkerPool;
use crate::config::IngestConfig;
use crate::listener::{CompletionListener, OptimizeEntitiesListener};
use crate::provider::{
    ExtractionItem, ExtractionItemProvider, JsonSegmenter, Segmenter, TreeWalkPathProvider,
};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Span};
use uuid::Uuid;
use vitrum_core::{
    drop_entity_logged, EntityCreatorSupplier, PersistentOperator, VitrumError, VitrumResult,
};
use vitrum_features::{Extractor, FeatureRegistry};
use vitrum_storage::Database;

// ============================================================================
// Run identity and state
// ============================================================================

/// Identifies one extraction run in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    /// Fresh random id
    pub fn new() -> Self {
        RunId(Uuid::new_v4())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    /// Constructed, not configured
    Created,
    /// Configured, writers open
    Initialized,
    /// Items are being processed
    Running,
    /// All items were attempted
    Completed,
    /// The run could not be carried out
    Failed,
}

impl ExtractionState {
    /// Whether the run has ended
    pub fn is_terminal(self) -> bool {
        matches!(self, ExtractionState::Completed | ExtractionState::Failed)
    }
}

/// Counters of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractionStats {
    /// Items whose segments all went through every module and whose
    /// descriptors were persisted
    pub items_processed: u64,
    /// Items that failed somewhere and were skipped
    pub items_failed: u64,
    /// Segments of successfully processed items
    pub segments_processed: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    items_processed: AtomicU64,
    items_failed: AtomicU64,
    segments_processed: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> ExtractionStats {
        ExtractionStats {
            items_processed: self.items_processed.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            segments_processed: self.segments_processed.load(Ordering::Relaxed),
        }
    }
}

struct StateCell {
    state: Mutex<ExtractionState>,
    changed: Condvar,
}

impl StateCell {
    fn get(&self) -> ExtractionState {
        *self.state.lock()
    }

    fn set(&self, next: ExtractionState) {
        *self.state.lock() = next;
        self.changed.notify_all();
    }
}

/// Feature modules owned by one worker
type ModuleSet = Vec<(String, Box<dyn Extractor>)>;

struct RunPlan {
    provider: Arc<dyn ExtractionItemProvider>,
    module_sets: Vec<ModuleSet>,
}

// ============================================================================
// ExtractionDispatcher
// ============================================================================

/// Runs the configured extractors over every item of a provider
pub struct ExtractionDispatcher {
    run_id: RunId,
    shared: Arc<StateCell>,
    segmenter: Arc<dyn Segmenter>,
    listeners: Vec<Arc<dyn CompletionListener>>,
    plan: Option<RunPlan>,
    stats: Arc<StatsCounters>,
    coordinator: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ExtractionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionDispatcher")
            .field("run_id", &self.run_id)
            .field("state", &self.state())
            .field("listeners", &self.listeners.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for ExtractionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionDispatcher {
    /// Dispatcher in the `Created` state, segmenting with [`JsonSegmenter`]
    pub fn new() -> Self {
        ExtractionDispatcher {
            run_id: RunId::new(),
            shared: Arc::new(StateCell {
                state: Mutex::new(ExtractionState::Created),
                changed: Condvar::new(),
            }),
            segmenter: Arc::new(JsonSegmenter),
            listeners: Vec::new(),
            plan: None,
            stats: Arc::new(StatsCounters::default()),
            coordinator: None,
        }
    }

    /// Builder: use another segmenter
    pub fn with_segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Id of this run
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Current state
    pub fn state(&self) -> ExtractionState {
        self.shared.get()
    }

    /// Counters so far; final once the run is terminal
    pub fn stats(&self) -> ExtractionStats {
        self.stats.snapshot()
    }

    /// Validate `config`, build one module set per worker and open writers
    ///
    /// Returns `false` without changing state if the dispatcher is not in
    /// `Created`, the provider is closed, or the config is unusable. Entities
    /// created by a failed call are dropped again before it returns.
    pub fn initialize(
        &mut self,
        provider: Arc<dyn ExtractionItemProvider>,
        config: &IngestConfig,
        registry: &FeatureRegistry,
        database: &Database,
    ) -> bool {
        let span = info_span!("extraction", run_id = %self.run_id);
        let _enter = span.enter();

        if self.state() != ExtractionState::Created {
            warn!(state = ?self.state(), "Dispatcher already initialized");
            return false;
        }
        if !provider.is_open() {
            error!("Item provider is not usable");
            return false;
        }
        if let Err(e) = config.validate_against(registry) {
            error!(error = %e, "Invalid extraction configuration");
            return false;
        }

        let features = &config.extraction.features;
        let creators = database.entity_creator_supplier();
        let writers = database.writer_supplier();
        let batch_size = config.batch_size();
        let existing: HashSet<String> = database.entity_names().into_iter().collect();
        let mut created: Vec<String> = Vec::new();

        let mut module_sets: Vec<ModuleSet> = Vec::with_capacity(config.extraction.threads);
        for worker in 0..config.extraction.threads {
            let mut set: ModuleSet = Vec::with_capacity(features.len());
            for name in features {
                let Some(mut module) = registry.create_extractor(name) else {
                    error!(feature = %name, "Feature has no extractor");
                    finish_all(module_sets, set);
                    drop_created(&creators, &created);
                    return false;
                };
                if worker == 0 {
                    module.initialize_persistent_layer(&creators);
                    for table in module.table_names() {
                        if !existing.contains(&table) && !created.contains(&table) {
                            created.push(table);
                        }
                    }
                }
                if let Err(e) = Extractor::init(module.as_mut(), &writers, batch_size) {
                    error!(feature = %name, error = %e, "Failed to open extractor");
                    set.push((name.clone(), module));
                    finish_all(module_sets, set);
                    drop_created(&creators, &created);
                    return false;
                }
                set.push((name.clone(), module));
            }
            module_sets.push(set);
        }

        self.plan = Some(RunPlan {
            provider,
            module_sets,
        });
        self.shared.set(ExtractionState::Initialized);
        info!(
            features = ?features,
            threads = config.extraction.threads,
            batch_size,
            "Extraction initialized"
        );
        true
    }

    /// Add a listener; listeners fire in registration order
    ///
    /// Listeners registered after `start` are ignored.
    pub fn register_listener(&mut self, listener: Arc<dyn CompletionListener>) {
        match self.state() {
            ExtractionState::Created | ExtractionState::Initialized => {
                self.listeners.push(listener)
            }
            state => warn!(run_id = %self.run_id, state = ?state, "Run already started, listener ignored"),
        }
    }

    /// Begin pulling items; returns `false` unless `Initialized`
    pub fn start(&mut self) -> bool {
        let Some(plan) = self.plan.take() else {
            warn!(run_id = %self.run_id, state = ?self.state(), "Dispatcher not initialized");
            return false;
        };

        self.shared.set(ExtractionState::Running);
        let ctx = RunContext {
            run_id: self.run_id,
            shared: Arc::clone(&self.shared),
            segmenter: Arc::clone(&self.segmenter),
            listeners: std::mem::take(&mut self.listeners),
            stats: Arc::clone(&self.stats),
        };
        match std::thread::Builder::new()
            .name(format!("vitrum-dispatch-{}", self.run_id))
            .spawn(move || ctx.run(plan))
        {
            Ok(handle) => {
                self.coordinator = Some(handle);
                true
            }
            Err(e) => {
                error!(run_id = %self.run_id, error = %e, "Failed to start extraction");
                self.shared.set(ExtractionState::Failed);
                false
            }
        }
    }

    /// Block until the run is `Completed` or `Failed`
    ///
    /// Returns immediately with the current state if the run never started.
    pub fn block(&mut self) -> ExtractionState {
        {
            let mut state = self.shared.state.lock();
            if matches!(*state, ExtractionState::Created | ExtractionState::Initialized) {
                warn!(run_id = %self.run_id, state = ?*state, "Run not started, nothing to wait for");
                return *state;
            }
            while !state.is_terminal() {
                self.shared.changed.wait(&mut state);
            }
        }
        if let Some(handle) = self.coordinator.take() {
            if handle.join().is_err() {
                error!(run_id = %self.run_id, "Extraction coordinator exited abnormally");
            }
        }
        self.state()
    }
}

fn finish_all(sets: Vec<ModuleSet>, partial: ModuleSet) {
    for (_, mut module) in sets.into_iter().flatten().chain(partial) {
        Extractor::finish(module.as_mut());
    }
}

/// Undo entity creation of a failed `initialize`
fn drop_created(creators: &EntityCreatorSupplier, created: &[String]) {
    if created.is_empty() {
        return;
    }
    let creator = creators();
    for name in created {
        drop_entity_logged(creator.as_ref(), name);
    }
}

// ============================================================================
// Run execution
// ============================================================================

struct RunContext {
    run_id: RunId,
    shared: Arc<StateCell>,
    segmenter: Arc<dyn Segmenter>,
    listeners: Vec<Arc<dyn CompletionListener>>,
    stats: Arc<StatsCounters>,
}

impl RunContext {
    fn run(self, plan: RunPlan) {
        let span = info_span!("extraction", run_id = %self.run_id);
        let _enter = span.enter();
        let threads = plan.module_sets.len();
        info!(threads, "Extraction started");

        let outcome = self.run_workers(plan, &span);

        for (i, listener) in self.listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener.extraction_complete())).is_err() {
                error!(listener = i, "Completion listener panicked");
            }
        }

        let stats = self.stats.snapshot();
        let next = match outcome {
            Ok(()) => {
                info!(
                    items = stats.items_processed,
                    failed = stats.items_failed,
                    segments = stats.segments_processed,
                    "Extraction completed"
                );
                ExtractionState::Completed
            }
            Err(e) => {
                error!(error = %e, items = stats.items_processed, "Extraction failed");
                ExtractionState::Failed
            }
        };
        self.shared.set(next);
    }

    fn run_workers(&self, plan: RunPlan, span: &Span) -> VitrumResult<()> {
        let pool = WorkerPool::new(plan.module_sets.len())?;
        let mut handles = Vec::with_capacity(plan.module_sets.len());
        for modules in plan.module_sets {
            let provider = Arc::clone(&plan.provider);
            let segmenter = Arc::clone(&self.segmenter);
            let stats = Arc::clone(&self.stats);
            let span = span.clone();
            let handle = pool.submit(move || {
                let _enter = span.enter();
                extract_worker(modules, provider.as_ref(), segmenter.as_ref(), &stats);
                Ok(())
            })?;
            handles.push(handle);
        }

        let mut failure = None;
        for handle in handles {
            if let Err(e) = handle.wait() {
                error!(error = %e, "Extraction worker failed");
                failure.get_or_insert(e);
            }
        }
        pool.shutdown();
        match failure {
            Some(e) => Err(VitrumError::TaskFailed(e.to_string())),
            None => Ok(()),
        }
    }
}

fn extract_worker(
    mut modules: ModuleSet,
    provider: &dyn ExtractionItemProvider,
    segmenter: &dyn Segmenter,
    stats: &StatsCounters,
) {
    while let Some(item) = provider.next_item() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            process_item(&mut modules, &item, segmenter)
        }));
        match result {
            Ok(Ok(segments)) => {
                stats.items_processed.fetch_add(1, Ordering::Relaxed);
                stats
                    .segments_processed
                    .fetch_add(segments as u64, Ordering::Relaxed);
                debug!(object_id = %item.object_id, segments, "Processed item");
            }
            Ok(Err(e)) => {
                stats.items_failed.fetch_add(1, Ordering::Relaxed);
                error!(object_id = %item.object_id, path = ?item.path(), error = %e, "Failed to process item");
            }
            Err(_) => {
                stats.items_failed.fetch_add(1, Ordering::Relaxed);
                error!(object_id = %item.object_id, path = ?item.path(), "Item processing panicked");
            }
        }
    }
    for (_, module) in modules.iter_mut() {
        Extractor::finish(module.as_mut());
    }
}

/// Run every segment of `item` through every module, then persist
///
/// Writers are flushed at the item boundary so a rejected write fails the
/// item it belongs to and no other.
fn process_item(
    modules: &mut ModuleSet,
    item: &ExtractionItem,
    segmenter: &dyn Segmenter,
) -> VitrumResult<usize> {
    let segments = segmenter.segment(item)?;
    let processed = segments.iter().try_for_each(|segment| {
        modules.iter_mut().try_for_each(|(name, module)| {
            module.process_segment(segment).map_err(|e| {
                VitrumError::storage(format!(
                    "feature '{}' on segment '{}': {}",
                    name, segment.id, e
                ))
            })
        })
    });
    let flushed = flush_all(modules);
    processed?;
    flushed?;
    Ok(segments.len())
}

/// Flush every module, returning the first failure
fn flush_all(modules: &mut ModuleSet) -> VitrumResult<()> {
    let mut failure = None;
    for (name, module) in modules.iter_mut() {
        if let Err(e) = module.flush() {
            failure.get_or_insert_with(|| {
                VitrumError::storage(format!("feature '{}' failed to persist: {}", name, e))
            });
        }
    }
    failure.map_or(Ok(()), Err)
}

// ============================================================================
// Convenience
// ============================================================================

/// Walk `config.input`, extract every item and wait for the run to end
///
/// Registers the tree walk as a completion listener, plus entity
/// optimization when the database is a fulltext backend and
/// `[extraction] optimize` is set.
///
/// # Errors
///
/// Returns `InvalidConfig` if the input path or the config is unusable.
pub fn run_ingest(
    config: &IngestConfig,
    registry: &FeatureRegistry,
    database: &Database,
) -> VitrumResult<(ExtractionState, ExtractionStats)> {
    let provider = Arc::new(TreeWalkPathProvider::from_config(&config.input)?);
    let mut dispatcher = ExtractionDispatcher::new();
    if !dispatcher.initialize(provider.clone(), config, registry, database) {
        return Err(VitrumError::invalid_config(
            "could not initialize extraction, see log for details",
        ));
    }
    if config.extraction.optimize {
        if let Some(optimize) = OptimizeEntitiesListener::for_database(database) {
            dispatcher.register_listener(Arc::new(optimize));
        }
    }
    dispatcher.register_listener(provider);
    dispatcher.start();
    let state = dispatcher.block();
    Ok((state, dispatcher.stats()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::VecItemProvider;
    use vitrum_core::{create_entity_logged, SegmentContainer, WriterSupplier};
    use vitrum_features::FulltextRetriever;

    /// Creates its entity, then refuses to open a writer
    struct UnopenableExtractor;

    impl PersistentOperator for UnopenableExtractor {
        fn initialize_persistent_layer(&self, supply: &EntityCreatorSupplier) {
            create_entity_logged(
                supply().as_ref(),
                "features_unopenable",
                &FulltextRetriever::attribute_definitions(),
            );
        }

        fn drop_persistent_layer(&self, supply: &EntityCreatorSupplier) {
            drop_entity_logged(supply().as_ref(), "features_unopenable");
        }

        fn table_names(&self) -> Vec<String> {
            vec!["features_unopenable".to_string()]
        }
    }

    impl Extractor for UnopenableExtractor {
        fn init(&mut self, _: &WriterSupplier, _: usize) -> VitrumResult<()> {
            Err(VitrumError::storage("writer unavailable"))
        }

        fn process_segment(&mut self, _: &SegmentContainer) -> VitrumResult<()> {
            Ok(())
        }

        fn flush(&mut self) -> VitrumResult<()> {
            Ok(())
        }

        fn finish(&mut self) {}
    }

    fn items(n: usize) -> Vec<ExtractionItem> {
        (1..=n)
            .map(|i| {
                ExtractionItem::from_segments(
                    format!("o{i}"),
                    vec![SegmentContainer::new(format!("s{i}"), format!("o{i}"))
                        .with_text(format!("caption number {i}"))],
                )
            })
            .collect()
    }

    #[test]
    fn test_state_machine() {
        let db = Database::memory();
        let registry = FeatureRegistry::with_defaults();
        let mut dispatcher = ExtractionDispatcher::new();
        assert_eq!(dispatcher.state(), ExtractionState::Created);
        assert!(!dispatcher.start());
        assert_eq!(dispatcher.block(), ExtractionState::Created);

        let provider = Arc::new(VecItemProvider::new(items(3)));
        assert!(dispatcher.initialize(
            provider.clone(),
            &IngestConfig::for_features(&["captions"]),
            &registry,
            &db
        ));
        assert_eq!(dispatcher.state(), ExtractionState::Initialized);
        assert!(!dispatcher.initialize(
            provider,
            &IngestConfig::for_features(&["captions"]),
            &registry,
            &db
        ));

        assert!(dispatcher.start());
        assert_eq!(dispatcher.block(), ExtractionState::Completed);
        assert_eq!(dispatcher.stats().items_processed, 3);
        assert_eq!(dispatcher.stats().segments_processed, 3);
        assert!(!dispatcher.start());
    }

    #[test]
    fn test_initialize_rejects_bad_input() {
        let db = Database::memory();
        let registry = FeatureRegistry::with_defaults();

        let mut dispatcher = ExtractionDispatcher::new();
        let closed = Arc::new(VecItemProvider::new(items(1)));
        closed.close();
        assert!(!dispatcher.initialize(
            closed,
            &IngestConfig::for_features(&["captions"]),
            &registry,
            &db
        ));

        let provider = Arc::new(VecItemProvider::new(items(1)));
        assert!(!dispatcher.initialize(
            provider.clone(),
            &IngestConfig::for_features(&["unknown"]),
            &registry,
            &db
        ));
        assert!(!dispatcher.initialize(
            provider,
            &IngestConfig::default(),
            &registry,
            &db
        ));
        assert_eq!(dispatcher.state(), ExtractionState::Created);
        assert!(db.entity_names().is_empty());
    }

    #[test]
    fn test_failed_initialize_drops_entities_it_created() {
        let db = Database::memory();
        FulltextRetriever::description_text_search()
            .initialize_persistent_layer(&db.entity_creator_supplier());
        let mut before = db.entity_names();
        before.sort();

        let mut registry = FeatureRegistry::with_defaults();
        registry.register_extractor("unopenable", || {
            Box::new(UnopenableExtractor) as Box<dyn Extractor>
        });
        let mut dispatcher = ExtractionDispatcher::new();
        assert!(!dispatcher.initialize(
            Arc::new(VecItemProvider::new(items(1))),
            &IngestConfig::for_features(&["ocr", "captions", "unopenable"]),
            &registry,
            &db
        ));
        assert_eq!(dispatcher.state(), ExtractionState::Created);

        let mut after = db.entity_names();
        after.sort();
        assert_eq!(after, before);
    }

    #[test]
    fn test_listeners_run_before_block_returns() {
        let db = Database::memory();
        let registry = FeatureRegistry::with_defaults();
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);

        let mut dispatcher = ExtractionDispatcher::new();
        assert!(dispatcher.initialize(
            Arc::new(VecItemProvider::new(items(2))),
            &IngestConfig::for_features(&["captions"]).with_threads(2),
            &registry,
            &db
        ));
        dispatcher.register_listener(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        dispatcher.start();
        dispatcher.block();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_ids_are_distinct() {
        assert_ne!(ExtractionDispatcher::new().run_id(), ExtractionDispatcher::new().run_id());
        assert!(ExtractionState::Failed.is_terminal());
        assert!(!ExtractionState::Running.is_terminal());
    }
}
