//! Item providers and segmenters
//!
//! An [`ExtractionItemProvider`] hands out a lazy, finite, non-restartable
//! sequence of [`ExtractionItem`]s. Providers are shared between workers, so
//! `next_item` takes `&self`. A [`Segmenter`] turns one item into the
//! segments feature modules process.

use crate::listener::CompletionListener;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vitrum_core::{SegmentContainer, VitrumError, VitrumResult};
use walkdir::WalkDir;

use crate::config::InputConfig;

/// One ingestable unit
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionItem {
    /// Media object the item belongs to
    pub object_id: String,
    /// Where the item's content lives
    pub source: ItemSource,
}

/// Content of an [`ExtractionItem`]
#[derive(Debug, Clone, PartialEq)]
pub enum ItemSource {
    /// A file on disk, segmented on the worker
    Path(PathBuf),
    /// Segments already in memory
    Segments(Vec<SegmentContainer>),
}

impl ExtractionItem {
    /// Item backed by a file; the object id is the file stem
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let object_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        ExtractionItem {
            object_id,
            source: ItemSource::Path(path),
        }
    }

    /// Item carrying its segments
    pub fn from_segments(object_id: impl Into<String>, segments: Vec<SegmentContainer>) -> Self {
        ExtractionItem {
            object_id: object_id.into(),
            source: ItemSource::Segments(segments),
        }
    }

    /// Path of a file-backed item
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            ItemSource::Path(p) => Some(p),
            ItemSource::Segments(_) => None,
        }
    }
}

/// Source of extraction items
pub trait ExtractionItemProvider: Send + Sync {
    /// Next item, `None` once exhausted or closed
    fn next_item(&self) -> Option<ExtractionItem>;

    /// Whether the provider can still hand out items
    fn is_open(&self) -> bool;

    /// Release resources; later `next_item` calls return `None`
    fn close(&self);
}

// ============================================================================
// VecItemProvider
// ============================================================================

/// Provider over an in-memory list of items
#[derive(Debug, Default)]
pub struct VecItemProvider {
    items: Mutex<Option<VecDeque<ExtractionItem>>>,
}

impl VecItemProvider {
    /// Provider handing out `items` in order
    pub fn new(items: Vec<ExtractionItem>) -> Self {
        VecItemProvider {
            items: Mutex::new(Some(items.into())),
        }
    }

    /// Items not handed out yet
    pub fn remaining(&self) -> usize {
        self.items.lock().as_ref().map_or(0, VecDeque::len)
    }
}

impl ExtractionItemProvider for VecItemProvider {
    fn next_item(&self) -> Option<ExtractionItem> {
        self.items.lock().as_mut()?.pop_front()
    }

    fn is_open(&self) -> bool {
        self.items.lock().is_some()
    }

    fn close(&self) {
        self.items.lock().take();
    }
}

impl CompletionListener for VecItemProvider {
    fn extraction_complete(&self) {
        self.close();
    }
}

// ============================================================================
// TreeWalkPathProvider
// ============================================================================

/// Provider walking a directory tree to a bounded depth
///
/// Files are filtered by extension (case-insensitive). Unreadable entries
/// are skipped with a warning. Also a completion listener: when the run
/// finishes it closes itself and drops the walk.
pub struct TreeWalkPathProvider {
    root: PathBuf,
    extensions: Vec<String>,
    walk: Mutex<Option<walkdir::IntoIter>>,
}

impl std::fmt::Debug for TreeWalkPathProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWalkPathProvider")
            .field("root", &self.root)
            .field("extensions", &self.extensions)
            .field("open", &self.is_open())
            .finish()
    }
}

impl TreeWalkPathProvider {
    /// Walk `root` to `depth`, accepting files with one of `extensions`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `root` is not a directory.
    pub fn new<S: AsRef<str>>(root: &Path, depth: usize, extensions: &[S]) -> VitrumResult<Self> {
        if !root.is_dir() {
            return Err(VitrumError::invalid_config(format!(
                "input path '{}' is not a directory",
                root.display()
            )));
        }
        let walk = WalkDir::new(root)
            .max_depth(depth)
            .sort_by_file_name()
            .into_iter();
        info!(root = %root.display(), depth, "Walking input tree");
        Ok(TreeWalkPathProvider {
            root: root.to_path_buf(),
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            walk: Mutex::new(Some(walk)),
        })
    }

    /// Provider for the `[input]` section of an ingest config
    pub fn from_config(input: &InputConfig) -> VitrumResult<Self> {
        let root = input
            .path
            .as_deref()
            .ok_or_else(|| VitrumError::invalid_config("[input] has no path"))?;
        Self::new(root, input.depth, &input.extensions)
    }

    /// Root of the walk
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| self.extensions.contains(&e))
    }
}

impl ExtractionItemProvider for TreeWalkPathProvider {
    fn next_item(&self) -> Option<ExtractionItem> {
        let mut guard = self.walk.lock();
        let walk = guard.as_mut()?;
        for entry in walk.by_ref() {
            match entry {
                Ok(entry) if entry.file_type().is_file() && self.accepts(entry.path()) => {
                    return Some(ExtractionItem::from_path(entry.into_path()));
                }
                Ok(_) => {}
                Err(e) => warn!(root = %self.root.display(), error = %e, "Skipping unreadable entry"),
            }
        }
        None
    }

    fn is_open(&self) -> bool {
        self.walk.lock().is_some()
    }

    fn close(&self) {
        if self.walk.lock().take().is_some() {
            debug!(root = %self.root.display(), "Closed tree walk");
        }
    }
}

impl CompletionListener for TreeWalkPathProvider {
    fn extraction_complete(&self) {
        self.close();
    }
}

// ============================================================================
// Segmenters
// ============================================================================

/// Turns an item into segments
pub trait Segmenter: Send + Sync {
    /// Segments of `item`
    ///
    /// # Errors
    ///
    /// Returns an error when the item's content cannot be read or parsed;
    /// the dispatcher counts the item as failed.
    fn segment(&self, item: &ExtractionItem) -> VitrumResult<Vec<SegmentContainer>>;
}

/// Segmenter reading a JSON array of segment records
///
/// Records missing an object id inherit the item's. In-memory items are
/// passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSegmenter;

#[derive(Deserialize)]
#[serde(untagged)]
enum SegmentFile {
    List(Vec<SegmentContainer>),
    Wrapped { segments: Vec<SegmentContainer> },
}

impl Segmenter for JsonSegmenter {
    fn segment(&self, item: &ExtractionItem) -> VitrumResult<Vec<SegmentContainer>> {
        let path = match &item.source {
            ItemSource::Segments(segments) => return Ok(segments.clone()),
            ItemSource::Path(path) => path,
        };
        let content = std::fs::read_to_string(path)?;
        let file: SegmentFile = serde_json::from_str(&content).map_err(|e| {
            VitrumError::Serialization(format!("{}: {}", path.display(), e))
        })?;
        let mut segments = match file {
            SegmentFile::List(s) | SegmentFile::Wrapped { segments: s } => s,
        };
        for segment in &mut segments {
            if segment.object_id.is_empty() {
                segment.object_id = item.object_id.clone();
            }
        }
        debug!(path = %path.display(), segments = segments.len(), "Segmented item");
        Ok(segments)
    }
}
