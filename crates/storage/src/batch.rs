//! Batched writer
//!
//! Buffers rows for one entity and hands them to the underlying writer in
//! batches. A batch is flushed when the buffer reaches the batch size, on
//! `flush` and on `close`; `Drop` closes as a last resort so rows buffered on
//! an error path are not lost. A rejected batch is retried row by row, so
//! only the offending rows are lost.

use tracing::{error, trace, warn};
use vitrum_core::{
    PersistencyWriter, PrimitiveValue, Row, VitrumResult, WriterSupplier, ID_FIELD,
};

/// Buffering wrapper around a [`PersistencyWriter`]
pub struct BatchedWriter {
    entity: String,
    writer: Box<dyn PersistencyWriter>,
    batch_size: usize,
    buffer: Vec<Row>,
    closed: bool,
}

impl std::fmt::Debug for BatchedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchedWriter")
            .field("entity", &self.entity)
            .field("batch_size", &self.batch_size)
            .field("buffered", &self.buffer.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl BatchedWriter {
    /// Acquire a writer from the supplier and open it against `entity`
    ///
    /// A batch size of 0 is treated as 1.
    pub fn open(supply: &WriterSupplier, entity: &str, batch_size: usize) -> VitrumResult<Self> {
        let mut writer = supply();
        writer.open(entity)?;
        Ok(BatchedWriter {
            entity: entity.to_string(),
            writer,
            batch_size: batch_size.max(1),
            buffer: Vec::with_capacity(batch_size.clamp(1, 1024)),
            closed: false,
        })
    }

    /// Target entity
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Rows buffered but not yet flushed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer one row, flushing when the batch is full
    pub fn write(&mut self, row: Row) -> VitrumResult<()> {
        self.buffer.push(row);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Buffer several rows
    pub fn write_all(&mut self, rows: impl IntoIterator<Item = Row>) -> VitrumResult<()> {
        for row in rows {
            self.write(row)?;
        }
        Ok(())
    }

    /// Hand all buffered rows to the underlying writer
    ///
    /// If the writer rejects the batch, each row is persisted on its own.
    ///
    /// # Errors
    ///
    /// Returns the first row-level failure; every other row is persisted.
    pub fn flush(&mut self) -> VitrumResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.buffer);
        trace!(entity = %self.entity, rows = rows.len(), "Flushing batch");
        if rows.len() == 1 {
            return self.writer.persist_batch(rows);
        }
        match self.writer.persist_batch(rows.clone()) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(entity = %self.entity, rows = rows.len(), error = %e, "Batch rejected, persisting rows one at a time");
                self.persist_each(rows)
            }
        }
    }

    fn persist_each(&mut self, rows: Vec<Row>) -> VitrumResult<()> {
        let mut rejected = 0usize;
        let mut failure = None;
        for row in rows {
            if let Err(e) = self.writer.persist(row) {
                rejected += 1;
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => {
                error!(entity = %self.entity, rejected, "Rows rejected by writer");
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Whether the id exists in storage or in the unflushed buffer
    pub fn id_exists(&self, id: &str) -> VitrumResult<bool> {
        let needle = PrimitiveValue::from(id);
        if self
            .buffer
            .iter()
            .any(|row| row.get(ID_FIELD) == Some(&needle))
        {
            return Ok(true);
        }
        self.writer.id_exists(id)
    }

    /// Flush and release the underlying writer; idempotent
    pub fn close(&mut self) -> VitrumResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.flush();
        self.writer.close();
        result
    }
}

impl Drop for BatchedWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(entity = %self.entity, error = %e, "Failed to flush batch on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryEntityCreator, MemoryStore, MemoryWriter};
    use std::sync::Arc;
    use vitrum_core::{AttributeDefinition, AttributeType, EntityCreator, FeatureDescriptor};

    fn setup() -> (Arc<MemoryStore>, WriterSupplier) {
        let store = Arc::new(MemoryStore::new());
        MemoryEntityCreator::new(store.clone())
            .create_entity(
                "t",
                &[
                    AttributeDefinition::new(ID_FIELD, AttributeType::String),
                    AttributeDefinition::new("feature", AttributeType::Text),
                ],
            )
            .unwrap();
        let s = store.clone();
        let supply: WriterSupplier =
            Arc::new(move || Box::new(MemoryWriter::new(s.clone())) as Box<dyn PersistencyWriter>);
        (store, supply)
    }

    fn row(id: &str) -> Row {
        FeatureDescriptor::text(id, "x").to_row()
    }

    #[test]
    fn test_flushes_at_threshold() {
        let (store, supply) = setup();
        let mut writer = BatchedWriter::open(&supply, "t", 2).unwrap();
        writer.write(row("a")).unwrap();
        assert_eq!(store.row_count("t"), Some(0));
        writer.write(row("b")).unwrap();
        assert_eq!(store.row_count("t"), Some(2));
        writer.write(row("c")).unwrap();
        assert_eq!(writer.buffered(), 1);
        writer.close().unwrap();
        assert_eq!(store.row_count("t"), Some(3));
    }

    #[test]
    fn test_drop_flushes() {
        let (store, supply) = setup();
        {
            let mut writer = BatchedWriter::open(&supply, "t", 100).unwrap();
            writer.write_all(vec![row("a"), row("b")]).unwrap();
        }
        assert_eq!(store.row_count("t"), Some(2));
    }

    #[test]
    fn test_id_exists_sees_buffer() {
        let (_store, supply) = setup();
        let mut writer = BatchedWriter::open(&supply, "t", 100).unwrap();
        writer.write(row("a")).unwrap();
        assert!(writer.id_exists("a").unwrap());
        assert!(!writer.id_exists("b").unwrap());
    }

    #[test]
    fn test_zero_batch_size_writes_through() {
        let (store, supply) = setup();
        let mut writer = BatchedWriter::open(&supply, "t", 0).unwrap();
        writer.write(row("a")).unwrap();
        assert_eq!(store.row_count("t"), Some(1));
    }

    #[test]
    fn test_rejected_batch_keeps_good_rows() {
        let (store, supply) = setup();
        let mut writer = BatchedWriter::open(&supply, "t", 100).unwrap();
        writer.write(row("a")).unwrap();
        let mut bad = row("b");
        bad.insert("bogus".to_string(), PrimitiveValue::from("x"));
        writer.write(bad).unwrap();
        writer.write(row("c")).unwrap();

        assert!(writer.flush().is_err());
        assert_eq!(writer.buffered(), 0);
        assert_eq!(store.row_count("t"), Some(2));
        assert!(writer.id_exists("a").unwrap());
        assert!(!writer.id_exists("b").unwrap());
        assert!(writer.id_exists("c").unwrap());
        writer.close().unwrap();
    }

    #[test]
    fn test_open_missing_entity_fails() {
        let (_store, supply) = setup();
        assert!(BatchedWriter::open(&supply, "missing", 10).is_err());
    }
}
