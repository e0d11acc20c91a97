//! Extraction capability
//!
//! The ingest half of a feature module. The dispatcher drives it through
//! `init` -> (`process_segment`* -> `flush`)* -> `finish` on a single worker
//! thread, flushing once per item.

use vitrum_core::{PersistentOperator, SegmentContainer, VitrumResult, WriterSupplier};

/// Computes and persists descriptors for segments
///
/// # Lifecycle
///
/// `init` acquires a writer, `finish` flushes and releases it. `finish` must
/// be reached on every path, including after failed segments.
///
/// # Idempotence
///
/// Modules with expensive features should check whether the segment id
/// already exists before recomputing. The dispatcher does not check for them.
pub trait Extractor: PersistentOperator + Send {
    /// Acquire a writer from the supplier
    fn init(&mut self, supply: &WriterSupplier, batch_size: usize) -> VitrumResult<()>;

    /// Compute and persist the descriptor of one segment
    ///
    /// # Errors
    ///
    /// Any error is a per-segment failure; the caller logs it and moves on.
    fn process_segment(&mut self, segment: &SegmentContainer) -> VitrumResult<()>;

    /// Persist everything buffered so far
    ///
    /// # Errors
    ///
    /// Returns the persistence failure; the caller fails the item whose
    /// descriptors were buffered.
    fn flush(&mut self) -> VitrumResult<()>;

    /// Flush pending writes and release the writer; idempotent
    fn finish(&mut self);
}
