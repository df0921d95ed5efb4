//! Core data model for backup runs.
//!
//! This module defines the main data structures of the engine:
//! - FileId / FileRecord: live metadata snapshot of one source file
//! - IndexEntry: the persisted subset of a FileRecord
//! - CopyOp / MoveOp / OperationQueue: scheduled work, pure data
//! - ScanStats / OpStats / ExecStats / RunReport: run bookkeeping

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filesystem identity of a file: device id plus inode-equivalent id.
///
/// Used to recognize "the same file" across runs independent of its path.
/// Identity values are assumed unique within one run. Filesystems may
/// recycle an inode number after a deletion, so a deleted-and-replaced file
/// can be misclassified as Moved or Modified instead of New; the engine does
/// not defend against this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId {
    /// Device id of the filesystem holding the file
    pub device: u64,

    /// Inode number, or the platform equivalent
    pub file: u64,
}

impl FileId {
    /// Parse the `device:file` form used in the index file.
    pub fn parse(text: &str) -> Option<FileId> {
        let (device, file) = text.split_once(':')?;
        Some(FileId {
            device: device.trim().parse().ok()?,
            file: file.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.file)
    }
}

/// Snapshot of one source file's identity and metadata, captured during a
/// scan. The destination path is recomputed every run from the profile's
/// roots and is never persisted in this form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Filesystem identity
    pub id: FileId,

    /// File size in bytes
    pub size: u64,

    /// Modification time, nanoseconds since the Unix epoch
    pub mtime_ns: i64,

    /// Absolute path of the source file
    pub source_path: PathBuf,

    /// Computed location under the backup root
    pub destination_path: PathBuf,
}

/// The persisted subset of a FileRecord, one per tracked identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Filesystem identity
    pub id: FileId,

    /// Modification time recorded when the file was last backed up
    pub mtime_ns: i64,

    /// Source path at the time of the last backup
    pub source_path: PathBuf,

    /// Where the backup copy lives
    pub destination_path: PathBuf,
}

impl IndexEntry {
    /// Derive the persisted entry for a freshly scanned record.
    pub fn from_record(record: &FileRecord) -> IndexEntry {
        IndexEntry {
            id: record.id,
            mtime_ns: record.mtime_ns,
            source_path: record.source_path.clone(),
            destination_path: record.destination_path.clone(),
        }
    }
}

/// Content-change classification of a scanned file.
///
/// Orthogonal to relocation: a renamed file can be Unchanged (timestamp
/// untouched) or Modified (timestamp newer) at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No index entry exists for this identity
    New,
    /// Identity known, modification time newer than the indexed one
    Modified,
    /// Identity known, modification time matches the indexed one
    Unchanged,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::New => write!(f, "New"),
            Classification::Modified => write!(f, "Modified"),
            Classification::Unchanged => write!(f, "Unchanged"),
        }
    }
}

/// A scanned record together with its classification.
#[derive(Debug, Clone)]
pub struct ClassifiedRecord {
    pub record: FileRecord,
    pub classification: Classification,
    /// True when the file's source-root-relative path no longer matches the
    /// indexed destination's backup-root-relative path
    pub relocated: bool,
}

/// Scheduled copy of one source file into the backup tree. Overwrites the
/// destination if it already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOp {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub size: u64,
}

/// Scheduled repositioning of an existing backup copy after its source file
/// was renamed or moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOp {
    pub old_destination: PathBuf,
    pub new_destination: PathBuf,
}

/// Source directory → destination directory pairs whose attributes are
/// propagated once at the end of a run.
pub type DirAttrSyncMap = HashMap<PathBuf, PathBuf>;

/// Operations accumulated by one scan, consumed by the executor.
///
/// Moves and copies are kept apart because the move phase runs to completion
/// before the first copy begins. Enqueuing also records the operation's
/// source directory → destination directory pair for the attribute pass;
/// the first pair seen for a source directory wins.
#[derive(Debug, Default)]
pub struct OperationQueue {
    pub moves: Vec<MoveOp>,
    pub copies: Vec<CopyOp>,
    dir_attrs: DirAttrSyncMap,
}

impl OperationQueue {
    pub fn new() -> OperationQueue {
        OperationQueue::default()
    }

    /// Schedule a copy of `record` into its computed destination.
    pub fn push_copy(&mut self, record: &FileRecord) {
        self.record_dir_pair(record);
        self.copies.push(CopyOp {
            source: record.source_path.clone(),
            destination: record.destination_path.clone(),
            size: record.size,
        });
    }

    /// Schedule repositioning of `record`'s existing backup copy from the
    /// indexed destination to the newly computed one.
    pub fn push_move(&mut self, record: &FileRecord, old_destination: PathBuf) {
        self.record_dir_pair(record);
        self.moves.push(MoveOp {
            old_destination,
            new_destination: record.destination_path.clone(),
        });
    }

    fn record_dir_pair(&mut self, record: &FileRecord) {
        if let (Some(src_dir), Some(dst_dir)) = (
            record.source_path.parent(),
            record.destination_path.parent(),
        ) {
            self.dir_attrs
                .entry(src_dir.to_path_buf())
                .or_insert_with(|| dst_dir.to_path_buf());
        }
    }

    /// Directory pairs recorded while enqueuing, first occurrence per
    /// source directory.
    pub fn dir_attrs(&self) -> &DirAttrSyncMap {
        &self.dir_attrs
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.copies.is_empty()
    }

    /// Total bytes scheduled for copying.
    pub fn total_copy_bytes(&self) -> u64 {
        self.copies.iter().map(|op| op.size).sum()
    }
}

/// Per-classification counts for one scan.
///
/// The counts are orthogonal where the classifications are: a renamed file
/// whose content is untouched increments both `moved` and `unchanged`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub new: usize,
    pub modified: usize,
    pub moved: usize,
    pub unchanged: usize,
    /// Files skipped over transient errors (vanished, unreadable)
    pub skipped: usize,
    /// Index entries whose identity was never observed
    pub stale: usize,
    /// Total bytes scheduled for copying
    pub bytes_queued: u64,
}

/// Outcome counts for one batch of operations of a single kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpStats {
    pub completed: usize,
    pub failed: usize,
    /// Bytes actually transferred (copies only)
    pub bytes: u64,
}

impl OpStats {
    pub fn attempted(&self) -> usize {
        self.completed + self.failed
    }
}

/// Outcome of executing one profile's operation queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecStats {
    pub moves: OpStats,
    pub copies: OpStats,
    /// Destination directories whose attributes were synced
    pub dirs_synced: usize,
    /// Stale-entry removal outcome, present only when the caller opted in
    pub removed: Option<OpStats>,
}

/// Summary of one profile's backup run, assembled by the orchestrator.
#[derive(Debug)]
pub struct RunReport {
    pub id: Uuid,
    pub profile: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub scan: ScanStats,
    pub exec: Option<ExecStats>,
}

impl RunReport {
    /// Start a report for the named profile, stamping the start time.
    pub fn begin(profile: &str) -> RunReport {
        RunReport {
            id: Uuid::new_v4(),
            profile: profile.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            scan: ScanStats::default(),
            exec: None,
        }
    }

    /// Stamp the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock duration of the run, if finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn record(id: FileId, source: &str, destination: &str) -> FileRecord {
        FileRecord {
            id,
            size: 10,
            mtime_ns: 100,
            source_path: PathBuf::from(source),
            destination_path: PathBuf::from(destination),
        }
    }

    #[test]
    fn test_file_id_round_trips_through_display() {
        let id = FileId { device: 64769, file: 1048577 };
        let parsed = FileId::parse(&id.to_string()).expect("Failed to parse id");
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_file_id_parse_rejects_garbage() {
        assert!(FileId::parse("no-separator").is_none());
        assert!(FileId::parse("1:not-a-number").is_none());
        assert!(FileId::parse("").is_none());
    }

    #[test]
    fn test_index_entry_from_record_copies_all_fields() {
        let record = record(FileId { device: 1, file: 2 }, "/src/a.txt", "/dst/a.txt");
        let entry = IndexEntry::from_record(&record);
        assert_eq!(entry.id, record.id);
        assert_eq!(entry.mtime_ns, record.mtime_ns);
        assert_eq!(entry.source_path, record.source_path);
        assert_eq!(entry.destination_path, record.destination_path);
    }

    #[test]
    fn test_queue_records_first_dir_pair_only() {
        let mut queue = OperationQueue::new();
        queue.push_copy(&record(FileId { device: 1, file: 1 }, "/src/sub/a.txt", "/dst/sub/a.txt"));
        // second file in the same source directory, pointed elsewhere
        queue.push_copy(&record(FileId { device: 1, file: 2 }, "/src/sub/b.txt", "/other/sub/b.txt"));

        assert_eq!(queue.dir_attrs().len(), 1);
        assert_eq!(
            queue.dir_attrs().get(Path::new("/src/sub")),
            Some(&PathBuf::from("/dst/sub"))
        );
    }

    #[test]
    fn test_queue_totals() {
        let mut queue = OperationQueue::new();
        assert!(queue.is_empty());

        queue.push_copy(&record(FileId { device: 1, file: 1 }, "/src/a", "/dst/a"));
        queue.push_move(
            &record(FileId { device: 1, file: 2 }, "/src/b", "/dst/b"),
            PathBuf::from("/dst/old-b"),
        );

        assert!(!queue.is_empty());
        assert_eq!(queue.copies.len(), 1);
        assert_eq!(queue.moves.len(), 1);
        assert_eq!(queue.total_copy_bytes(), 10);
        assert_eq!(queue.moves[0].old_destination, PathBuf::from("/dst/old-b"));
        assert_eq!(queue.moves[0].new_destination, PathBuf::from("/dst/b"));
    }

    #[test]
    fn test_run_report_lifecycle() {
        let mut report = RunReport::begin("documents");
        assert_eq!(report.profile, "documents");
        assert!(report.finished_at.is_none());
        assert!(report.elapsed().is_none());

        report.finish();
        assert!(report.finished_at.is_some());
        assert!(report.elapsed().expect("Expected elapsed") >= chrono::Duration::zero());
    }
}
