//! Directory-watching source.

use super::{QueueSlot, SourceError, SourceHandler};
use crate::pipeline::{DocumentRef, ProcessingQueue};
use crate::sync::lock;
use async_trait::async_trait;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

const SOURCE_LABEL: &str = "folder";

/// Watches one directory (non-recursively) and enqueues supported files as they appear.
///
/// On start, files already present are enqueued in file-name order after the watcher is
/// installed, so nothing dropped into the directory around start-up is missed. A file can be
/// reported twice in that window; the pipeline skips references whose file has already moved.
pub struct FolderSourceHandler {
    watch_directory: PathBuf,
    supported_formats: Arc<BTreeSet<String>>,
    queue: QueueSlot,
    active: Mutex<Option<ActiveWatch>>,
}

struct ActiveWatch {
    // Dropping the watcher ends its event thread.
    _watcher: RecommendedWatcher,
    sink: Arc<EventSink>,
}

/// Filters filesystem events down to supported files and forwards them to the queue.
struct EventSink {
    slot: QueueSlot,
    supported_formats: Arc<BTreeSet<String>>,
}

impl EventSink {
    fn handle(&self, event: notify::Result<Event>) {
        match event {
            Ok(event) => {
                for path in created_paths(&event) {
                    self.offer(path);
                }
            }
            Err(error) => tracing::warn!(error = %error, "Filesystem watch error"),
        }
    }

    fn offer(&self, path: &Path) {
        if !path.is_file() {
            return;
        }
        if !is_supported(path, &self.supported_formats) {
            tracing::debug!(path = %path.display(), "Ignoring unsupported file");
            return;
        }
        if self.slot.push(DocumentRef::new(SOURCE_LABEL, path)) {
            tracing::info!(path = %path.display(), "New file detected");
        }
    }
}

/// Paths an event reports as newly present in the directory.
fn created_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To))
        | EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => &event.paths,
        _ => &[],
    }
}

fn is_supported(path: &Path, supported_formats: &BTreeSet<String>) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| supported_formats.contains(&extension.to_ascii_lowercase()))
}

impl FolderSourceHandler {
    /// Watch `watch_directory` for files whose extension is in `supported_formats`.
    ///
    /// Extensions are matched case-insensitively and may be given with or without a leading dot.
    pub fn new(
        watch_directory: impl Into<PathBuf>,
        supported_formats: impl IntoIterator<Item = String>,
    ) -> Self {
        let supported_formats = supported_formats
            .into_iter()
            .map(|format| format.trim_start_matches('.').to_ascii_lowercase())
            .filter(|format| !format.is_empty())
            .collect();
        Self {
            watch_directory: watch_directory.into(),
            supported_formats: Arc::new(supported_formats),
            queue: QueueSlot::default(),
            active: Mutex::new(None),
        }
    }

    /// Directory being watched.
    pub fn watch_directory(&self) -> &Path {
        &self.watch_directory
    }

    /// Supported files directly inside the watched directory, sorted by file name.
    fn existing_files(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.watch_directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_type().is_file() && is_supported(entry.path(), &self.supported_formats) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl SourceHandler for FolderSourceHandler {
    fn kind(&self) -> &'static str {
        SOURCE_LABEL
    }

    fn set_processing_queue(&self, queue: ProcessingQueue) {
        self.queue.set(queue);
    }

    async fn start(&self) -> Result<(), SourceError> {
        let queue = self.queue.get()?;
        let mut active = lock(&self.active);
        if active.is_some() {
            return Err(SourceError::AlreadyRunning);
        }
        if !self.watch_directory.is_dir() {
            return Err(SourceError::MissingDirectory(self.watch_directory.clone()));
        }

        let sink = Arc::new(EventSink {
            slot: QueueSlot::new(Some(queue)),
            supported_formats: Arc::clone(&self.supported_formats),
        });
        let callback_sink = Arc::clone(&sink);
        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<Event>| {
                callback_sink.handle(event)
            })?;
        watcher.watch(&self.watch_directory, RecursiveMode::NonRecursive)?;
        tracing::info!(directory = %self.watch_directory.display(), "Started watching directory");

        let existing = match self.existing_files() {
            Ok(existing) => existing,
            Err(error) => {
                sink.slot.close();
                return Err(error);
            }
        };
        if !existing.is_empty() {
            tracing::info!(count = existing.len(), "Queueing files already present");
        }
        for path in &existing {
            sink.slot.push(DocumentRef::new(SOURCE_LABEL, path));
        }

        *active = Some(ActiveWatch {
            _watcher: watcher,
            sink,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        let watch = lock(&self.active).take();
        if let Some(watch) = watch {
            watch.sink.slot.close();
            drop(watch);
            tracing::info!(directory = %self.watch_directory.display(), "Stopped watching directory");
        }
        Ok(())
    }
}
