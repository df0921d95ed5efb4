//! Source tree scanning and change classification.
//!
//! The scanner walks one profile's source tree depth-first, builds a
//! FileRecord for every file it reaches, classifies it against the loaded
//! index, and turns the classifications into a queue of copy and move
//! operations. It never touches the destination tree itself; that is the
//! executor's job, after the scan has fully completed.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::fs_ops;
use crate::index::BackupIndex;
use crate::log::LogSink;
use crate::model::{
    Classification, ClassifiedRecord, FileId, FileRecord, IndexEntry, OperationQueue, ScanStats,
};
use crate::profile::Profile;

/// Everything a completed scan produces.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Classified records in visit order
    pub records: Vec<ClassifiedRecord>,
    /// Entries that make up the next index, superseding the loaded one
    /// wholesale once written
    pub retained: Vec<IndexEntry>,
    /// Scheduled operations for the executor
    pub queue: OperationQueue,
    /// Index entries whose identity was never observed during the walk,
    /// implying the source file disappeared since the last run. Surfaced
    /// only; deleting their backup copies is an explicit caller policy.
    pub stale: Vec<IndexEntry>,
    pub stats: ScanStats,
}

impl ScanOutcome {
    fn empty() -> ScanOutcome {
        ScanOutcome {
            records: Vec::new(),
            retained: Vec::new(),
            queue: OperationQueue::new(),
            stale: Vec::new(),
            stats: ScanStats::default(),
        }
    }
}

/// Walks a profile's source tree and classifies every file against the
/// last run's index.
pub struct Scanner<'a> {
    profile: &'a Profile,
    index: &'a BackupIndex,
    log: &'a dyn LogSink,
}

impl<'a> Scanner<'a> {
    pub fn new(profile: &'a Profile, index: &'a BackupIndex, log: &'a dyn LogSink) -> Scanner<'a> {
        Scanner { profile, index, log }
    }

    /// Scan the profile's source tree.
    ///
    /// # Errors
    /// An unreadable source root is profile-fatal and returned here.
    /// Everything below the root is isolated: unreadable subtrees and
    /// vanished files are logged and skipped.
    pub fn scan(&self) -> Result<ScanOutcome> {
        let root = &self.profile.original_path;
        let metadata = match fs::metadata(root) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::SourceNotFound { path: root.clone() })
            }
            Err(e) => {
                return Err(EngineError::EnumerationFailed {
                    path: root.clone(),
                    source: e,
                })
            }
        };
        if !metadata.is_dir() {
            return Err(EngineError::InvalidPath {
                path: root.clone(),
                reason: "source root is not a directory".to_string(),
            });
        }

        let mut outcome = ScanOutcome::empty();
        let mut seen: HashSet<FileId> = HashSet::new();
        self.walk(root, &mut outcome, &mut seen)?;

        // Entries never matched by any visited identity: the source files
        // behind them are gone (or their volume is not mounted).
        let mut stale: Vec<IndexEntry> = self
            .index
            .entries()
            .filter(|entry| !seen.contains(&entry.id))
            .cloned()
            .collect();
        stale.sort_by_key(|entry| entry.id);
        outcome.stats.stale = stale.len();
        outcome.stale = stale;

        outcome.stats.bytes_queued = outcome.queue.total_copy_bytes();
        Ok(outcome)
    }

    /// Depth-first descent. A directory whose path contains a blacklist
    /// substring is pruned here, before its children are ever listed.
    fn walk(
        &self,
        dir: &Path,
        outcome: &mut ScanOutcome,
        seen: &mut HashSet<FileId>,
    ) -> Result<()> {
        if self.profile.is_excluded(dir) {
            return Ok(());
        }

        let entries = fs::read_dir(dir).map_err(|e| EngineError::EnumerationFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.log.log(&format!("EnumerationError: {} ({})", dir.display(), e));
                    outcome.stats.skipped += 1;
                    continue;
                }
            };
            let path = entry.path();

            // Stat at visit time; the entry may have vanished since the
            // directory was listed.
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.log.log(&format!("FileNotFoundError: {}", path.display()));
                    outcome.stats.skipped += 1;
                    continue;
                }
                Err(_) => {
                    self.log.log(&format!("PermissionError: {}", path.display()));
                    outcome.stats.skipped += 1;
                    continue;
                }
            };

            if metadata.is_dir() {
                // never descend through a directory symlink; a cycle back
                // into an ancestor would not terminate
                let is_symlink = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
                if is_symlink {
                    continue;
                }
                // Unreadable subtrees are skipped, not fatal; only the
                // source root itself aborts the profile.
                if let Err(err) = self.walk(&path, outcome, seen) {
                    self.log.log(&err.to_string());
                    outcome.stats.skipped += 1;
                }
            } else if metadata.is_file() {
                self.classify_file(&path, &metadata, outcome, seen);
            }
        }

        Ok(())
    }

    fn classify_file(
        &self,
        path: &Path,
        metadata: &fs::Metadata,
        outcome: &mut ScanOutcome,
        seen: &mut HashSet<FileId>,
    ) {
        let mtime_ns = match fs_ops::modified_ns(metadata) {
            Ok(ns) => ns,
            Err(_) => {
                self.log.log(&format!("MetadataError: {}", path.display()));
                outcome.stats.skipped += 1;
                return;
            }
        };

        let id = fs_ops::file_identity(path, metadata);
        let record = FileRecord {
            id,
            size: metadata.len(),
            mtime_ns,
            source_path: path.to_path_buf(),
            destination_path: self.profile.destination_for(path),
        };
        seen.insert(id);

        let Some(prior) = self.index.get(&id) else {
            outcome.queue.push_copy(&record);
            outcome.retained.push(IndexEntry::from_record(&record));
            outcome.stats.new += 1;
            outcome.records.push(ClassifiedRecord {
                record,
                classification: Classification::New,
                relocated: false,
            });
            return;
        };

        // The rename check and the content-change check are independent
        // conditions; both can fire for the same file.
        let relocated = self.relocated(&record, prior);
        if relocated {
            outcome.queue.push_move(&record, prior.destination_path.clone());
            outcome.stats.moved += 1;
        }

        if record.mtime_ns > prior.mtime_ns {
            outcome.queue.push_copy(&record);
            outcome.retained.push(IndexEntry::from_record(&record));
            outcome.stats.modified += 1;
            outcome.records.push(ClassifiedRecord {
                record,
                classification: Classification::Modified,
                relocated,
            });
        } else {
            // Content unchanged; carry the prior entry forward, repointed
            // only if the file moved.
            let retained = if relocated {
                IndexEntry {
                    id,
                    mtime_ns: prior.mtime_ns,
                    source_path: record.source_path.clone(),
                    destination_path: record.destination_path.clone(),
                }
            } else {
                prior.clone()
            };
            outcome.retained.push(retained);
            outcome.stats.unchanged += 1;
            outcome.records.push(ClassifiedRecord {
                record,
                classification: Classification::Unchanged,
                relocated,
            });
        }
    }

    /// True when the file's path relative to the source root no longer
    /// matches the indexed destination's path relative to the backup root.
    fn relocated(&self, record: &FileRecord, prior: &IndexEntry) -> bool {
        let source_rel = record.source_path.strip_prefix(&self.profile.original_path).ok();
        let indexed_rel = prior
            .destination_path
            .strip_prefix(&self.profile.backup_path)
            .ok();
        match (source_rel, indexed_rel) {
            (Some(source_rel), Some(indexed_rel)) => source_rel != indexed_rel,
            // an indexed destination outside the current backup root means
            // the backup root itself changed; reposition
            _ => true,
        }
    }
}
