//! Metadata access objects
//!
//! - MetadataWriter: batched writes into the metadata entity
//! - MetadataReader: lookup by object ids with an optional domain filter

use crate::batch::BatchedWriter;
use tracing::{debug, warn};
use vitrum_core::{
    MetadataEntry, PrimitiveValue, Selector, SelectorSupplier, VitrumResult, WriterSupplier,
    METADATA_ENTITY, METADATA_FIELDS,
};

// ============================================================================
// MetadataWriter
// ============================================================================

/// Batched writer for [`MetadataEntry`] rows
#[derive(Debug)]
pub struct MetadataWriter {
    inner: BatchedWriter,
}

impl MetadataWriter {
    /// Open a writer on the metadata entity
    pub fn open(supply: &WriterSupplier, batch_size: usize) -> VitrumResult<Self> {
        Self::open_entity(supply, METADATA_ENTITY, batch_size)
    }

    /// Open a writer on a differently named metadata entity
    pub fn open_entity(
        supply: &WriterSupplier,
        entity: &str,
        batch_size: usize,
    ) -> VitrumResult<Self> {
        Ok(MetadataWriter {
            inner: BatchedWriter::open(supply, entity, batch_size)?,
        })
    }

    /// Buffer one entry
    pub fn write(&mut self, entry: &MetadataEntry) -> VitrumResult<()> {
        self.inner.write(entry.to_row())
    }

    /// Buffer several entries
    pub fn write_all<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a MetadataEntry>,
    ) -> VitrumResult<()> {
        self.inner.write_all(entries.into_iter().map(MetadataEntry::to_row))
    }

    /// Flush and release the writer
    pub fn close(&mut self) -> VitrumResult<()> {
        self.inner.close()
    }
}

// ============================================================================
// MetadataReader
// ============================================================================

/// Reader for [`MetadataEntry`] rows
pub struct MetadataReader {
    selector: Box<dyn Selector>,
}

impl MetadataReader {
    /// Open a reader on the metadata entity
    pub fn open(supply: &SelectorSupplier) -> VitrumResult<Self> {
        Self::open_entity(supply, METADATA_ENTITY)
    }

    /// Open a reader on a differently named metadata entity
    pub fn open_entity(supply: &SelectorSupplier, entity: &str) -> VitrumResult<Self> {
        let mut selector = supply();
        selector.open(entity)?;
        Ok(MetadataReader { selector })
    }

    /// Entries of the given objects, restricted to `domains` unless empty
    ///
    /// Rows that cannot be read as metadata are skipped with a warning.
    pub fn lookup(
        &self,
        object_ids: &[String],
        domains: &[String],
    ) -> VitrumResult<Vec<MetadataEntry>> {
        if object_ids.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<PrimitiveValue> =
            object_ids.iter().map(|id| PrimitiveValue::from(id.as_str())).collect();
        let rows = self.selector.get_rows(METADATA_FIELDS[0], &values)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            match MetadataEntry::from_row(row) {
                Ok(entry) => {
                    if domains.is_empty() || domains.iter().any(|d| d == entry.domain()) {
                        entries.push(entry);
                    }
                }
                Err(e) => warn!(error = %e, "Skipping unreadable metadata row"),
            }
        }
        debug!(objects = object_ids.len(), entries = entries.len(), "Metadata lookup");
        Ok(entries)
    }

    /// Release the selector
    pub fn close(&mut self) {
        self.selector.close();
    }
}

impl Drop for MetadataReader {
    fn drop(&mut self) {
        self.selector.close();
    }
}
