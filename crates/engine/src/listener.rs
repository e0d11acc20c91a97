//! Completion listeners
//!
//! Notified once, in registration order, after every item of a run has been
//! processed. Item providers use this to release what they opened; backends
//! use it for post-run finalization.

use tracing::info;
use vitrum_storage::{Backend, Database};

/// Receives the end-of-run notification
pub trait CompletionListener: Send + Sync {
    /// Called once after the run has processed all items
    fn extraction_complete(&self);
}

impl<F> CompletionListener for F
where
    F: Fn() + Send + Sync,
{
    fn extraction_complete(&self) {
        self()
    }
}

/// Compacts every fulltext entity once extraction has finished
#[derive(Debug, Clone)]
pub struct OptimizeEntitiesListener {
    database: Database,
}

impl OptimizeEntitiesListener {
    /// Listener for `database`, `None` unless it is a fulltext backend
    pub fn for_database(database: &Database) -> Option<Self> {
        match database.backend() {
            Backend::Fulltext => Some(OptimizeEntitiesListener {
                database: database.clone(),
            }),
            Backend::Memory => None,
        }
    }
}

impl CompletionListener for OptimizeEntitiesListener {
    fn extraction_complete(&self) {
        info!(backend = %self.database.backend().name(), "Optimizing entities");
        self.database.optimize_entities();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_listener() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let listener: Box<dyn CompletionListener> = Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        listener.extraction_complete();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_optimize_listener_only_for_fulltext() {
        assert!(OptimizeEntitiesListener::for_database(&Database::memory()).is_none());
        let listener = OptimizeEntitiesListener::for_database(&Database::fulltext()).unwrap();
        listener.extraction_complete();
    }
}
