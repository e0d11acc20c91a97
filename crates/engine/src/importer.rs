//! Parallel batch import
//!
//! Each source file becomes one independent task on a [`WorkerPool`]. A task
//! parses its file with an [`Importer`] and writes the rows through its own
//! [`BatchedWriter`]. A failing file is logged and counted; it never cancels
//! its siblings or the wait.

use crate::background::{TaskHandle, WorkerPool};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use vitrum_core::{FeatureDescriptor, Row, VitrumResult, WriterSupplier};
use vitrum_features::{AUDIO_TRANSCRIPTION_TABLE_NAME, DESCRIPTION_TEXT_TABLE_NAME};
use vitrum_storage::BatchedWriter;
use walkdir::WalkDir;

/// Depth the bundled handlers walk below the import root
pub const IMPORT_WALK_DEPTH: usize = 2;

/// Source of rows for one target entity
pub trait Importer: Send {
    /// Next row, `None` once exhausted
    fn read_next(&mut self) -> Option<Row>;
}

// ============================================================================
// Bundled importers
// ============================================================================

/// Captions keyed by segment id
///
/// The file is a JSON object mapping each segment id to one caption or an
/// array of captions; each caption becomes one row.
#[derive(Debug)]
pub struct CaptionTextImporter {
    rows: std::vec::IntoIter<Row>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Captions {
    One(String),
    Many(Vec<String>),
}

impl CaptionTextImporter {
    /// Parse a caption file
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and a serialization
    /// error if it is not a caption object.
    pub fn open(path: &Path) -> VitrumResult<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Parse caption JSON
    pub fn parse(content: &str) -> VitrumResult<Self> {
        let captions: BTreeMap<String, Captions> = serde_json::from_str(content)?;
        let mut rows = Vec::new();
        for (id, captions) in captions {
            let texts = match captions {
                Captions::One(text) => vec![text],
                Captions::Many(texts) => texts,
            };
            rows.extend(
                texts
                    .into_iter()
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| FeatureDescriptor::text(id.as_str(), t).to_row()),
            );
        }
        Ok(CaptionTextImporter {
            rows: rows.into_iter(),
        })
    }
}

impl Importer for CaptionTextImporter {
    fn read_next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

/// Transcripts as a JSON array of `{segmentId, text}` records
#[derive(Debug)]
pub struct AudioTranscriptionImporter {
    rows: std::vec::IntoIter<Row>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptRecord {
    segment_id: String,
    text: String,
}

impl AudioTranscriptionImporter {
    /// Parse a transcript file
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and a serialization
    /// error if it is not an array of transcript records.
    pub fn open(path: &Path) -> VitrumResult<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Parse transcript JSON
    pub fn parse(content: &str) -> VitrumResult<Self> {
        let records: Vec<TranscriptRecord> = serde_json::from_str(content)?;
        let rows: Vec<Row> = records
            .into_iter()
            .filter(|r| !r.text.trim().is_empty())
            .map(|r| FeatureDescriptor::text(r.segment_id, r.text).to_row())
            .collect();
        Ok(AudioTranscriptionImporter {
            rows: rows.into_iter(),
        })
    }
}

impl Importer for AudioTranscriptionImporter {
    fn read_next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

// ============================================================================
// DataImportRunner
// ============================================================================

/// Drains one importer into one entity
pub struct DataImportRunner<I: Importer> {
    importer: I,
    entity: String,
    source: String,
}

impl<I: Importer> DataImportRunner<I> {
    /// Runner writing `importer`'s rows to `entity`; `source` names the data in logs
    pub fn new(importer: I, entity: impl Into<String>, source: impl Into<String>) -> Self {
        DataImportRunner {
            importer,
            entity: entity.into(),
            source: source.into(),
        }
    }

    /// Write every row, returning how many were written
    ///
    /// The writer is closed on the error path too.
    pub fn run(mut self, writers: &WriterSupplier, batch_size: usize) -> VitrumResult<usize> {
        let mut writer = BatchedWriter::open(writers, &self.entity, batch_size)?;
        let mut count = 0usize;
        while let Some(row) = self.importer.read_next() {
            writer.write(row)?;
            count += 1;
        }
        writer.close()?;
        debug!(entity = %self.entity, source = %self.source, rows = count, "Import task finished");
        Ok(count)
    }
}

// ============================================================================
// DataImportHandler
// ============================================================================

/// Outcome of a batch import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    /// Tasks that finished without error
    pub succeeded: usize,
    /// Tasks that failed and were logged
    pub failed: usize,
    /// Rows written by successful tasks
    pub rows: usize,
}

/// Worker pool plus the handles of submitted import tasks
pub struct DataImportHandler {
    pool: WorkerPool,
    batch_size: usize,
    writers: WriterSupplier,
    tasks: Vec<(PathBuf, TaskHandle<usize>)>,
}

impl std::fmt::Debug for DataImportHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataImportHandler")
            .field("pool", &self.pool)
            .field("batch_size", &self.batch_size)
            .field("pending", &self.tasks.len())
            .finish()
    }
}

impl DataImportHandler {
    /// Handler with `threads` workers writing in batches of `batch_size`
    pub fn new(writers: WriterSupplier, threads: usize, batch_size: usize) -> VitrumResult<Self> {
        Ok(DataImportHandler {
            pool: WorkerPool::new(threads)?,
            batch_size,
            writers,
            tasks: Vec::new(),
        })
    }

    /// Tasks submitted and not yet waited for
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Submit one file; `open` runs on the worker so parse errors stay per-file
    pub fn submit<I, F>(&mut self, path: PathBuf, entity: &str, source: &str, open: F) -> VitrumResult<()>
    where
        I: Importer + 'static,
        F: FnOnce(&Path) -> VitrumResult<I> + Send + 'static,
    {
        let writers = self.writers.clone();
        let batch_size = self.batch_size;
        let entity = entity.to_string();
        let source = source.to_string();
        let task_path = path.clone();
        let handle = self.pool.submit(move || {
            let importer = open(&task_path)?;
            DataImportRunner::new(importer, entity, source).run(&writers, batch_size)
        })?;
        self.tasks.push((path, handle));
        Ok(())
    }

    /// Submit every file under `root` (to `depth`) whose extension matches
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `root` cannot be walked at all.
    pub fn submit_tree<I, F>(
        &mut self,
        root: &Path,
        depth: usize,
        extension: &str,
        entity: &str,
        source: &str,
        open: F,
    ) -> VitrumResult<usize>
    where
        I: Importer + 'static,
        F: Fn(&Path) -> VitrumResult<I> + Clone + Send + 'static,
    {
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("import root '{}' is not a directory", root.display()),
            )
            .into());
        }
        let extension = extension.to_lowercase();
        let mut submitted = 0;
        for entry in WalkDir::new(root).max_depth(depth).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let matches = entry
                .path()
                .extension()
                .is_some_and(|e| e.to_string_lossy().to_lowercase() == extension);
            if entry.file_type().is_file() && matches {
                self.submit(entry.into_path(), entity, source, open.clone())?;
                submitted += 1;
            }
        }
        Ok(submitted)
    }

    /// Block until every submitted task has resolved
    ///
    /// Failed tasks are logged and counted; this never fails or hangs on a
    /// single task's error.
    pub fn wait_for_completion(&mut self) -> ImportSummary {
        let mut summary = ImportSummary::default();
        for (path, handle) in self.tasks.drain(..) {
            match handle.wait() {
                Ok(rows) => {
                    summary.succeeded += 1;
                    summary.rows += rows;
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(path = %path.display(), error = %e, "Import task failed");
                }
            }
        }
        summary
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Imports a directory of source files
pub trait ImportHandler {
    /// Import everything under `root` and wait for it
    ///
    /// # Errors
    ///
    /// Returns an error only when the import cannot start at all.
    fn do_import(&mut self, root: &Path) -> VitrumResult<ImportSummary>;
}

/// Caption files into `features_captioning`
#[derive(Debug)]
pub struct CaptionDataImportHandler {
    handler: DataImportHandler,
}

impl CaptionDataImportHandler {
    /// Handler with `threads` workers
    pub fn new(writers: WriterSupplier, threads: usize, batch_size: usize) -> VitrumResult<Self> {
        Ok(CaptionDataImportHandler {
            handler: DataImportHandler::new(writers, threads, batch_size)?,
        })
    }
}

impl ImportHandler for CaptionDataImportHandler {
    fn do_import(&mut self, root: &Path) -> VitrumResult<ImportSummary> {
        info!(root = %root.display(), "Starting caption import");
        let submitted = self.handler.submit_tree(
            root,
            IMPORT_WALK_DEPTH,
            "json",
            DESCRIPTION_TEXT_TABLE_NAME,
            "captions",
            CaptionTextImporter::open,
        )?;
        let summary = self.handler.wait_for_completion();
        info!(root = %root.display(), submitted, succeeded = summary.succeeded, failed = summary.failed, "Completed caption import");
        Ok(summary)
    }
}

/// Transcript files into `features_audiotranscription`
#[derive(Debug)]
pub struct AudioTranscriptImportHandler {
    handler: DataImportHandler,
}

impl AudioTranscriptImportHandler {
    /// Handler with `threads` workers
    pub fn new(writers: WriterSupplier, threads: usize, batch_size: usize) -> VitrumResult<Self> {
        Ok(AudioTranscriptImportHandler {
            handler: DataImportHandler::new(writers, threads, batch_size)?,
        })
    }
}

impl ImportHandler for AudioTranscriptImportHandler {
    fn do_import(&mut self, root: &Path) -> VitrumResult<ImportSummary> {
        info!(root = %root.display(), "Starting transcript import");
        let submitted = self.handler.submit_tree(
            root,
            IMPORT_WALK_DEPTH,
            "json",
            AUDIO_TRANSCRIPTION_TABLE_NAME,
            "audio file",
            AudioTranscriptionImporter::open,
        )?;
        let summary = self.handler.wait_for_completion();
        info!(root = %root.display(), submitted, succeeded = summary.succeeded, failed = summary.failed, "Completed transcript import");
        Ok(summary)
    }
}
