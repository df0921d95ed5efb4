//! Batch execution of scheduled operations against the backup tree.
//!
//! Moves run strictly before copies: a rename detected through the
//! identity-plus-path heuristic repositions existing backup content first,
//! so a wholesale directory rename costs a handful of renames instead of
//! re-copying every file. Individual operation failures are logged and
//! skipped; they never abort the batch, and partial application of a batch
//! is an accepted outcome.

use std::fs;
use std::io;

use crate::fs_ops;
use crate::log::LogSink;
use crate::model::{CopyOp, DirAttrSyncMap, ExecStats, IndexEntry, MoveOp, OperationQueue, OpStats};
use crate::progress::{Phase, PhaseProgress};

/// Runs queued operations against the destination tree.
pub struct Executor<'a> {
    log: &'a dyn LogSink,
    progress: Option<&'a dyn PhaseProgress>,
}

impl<'a> Executor<'a> {
    pub fn new(log: &'a dyn LogSink) -> Executor<'a> {
        Executor { log, progress: None }
    }

    pub fn with_progress(log: &'a dyn LogSink, progress: &'a dyn PhaseProgress) -> Executor<'a> {
        Executor {
            log,
            progress: Some(progress),
        }
    }

    /// Run the whole queue: every move, then every copy, then one
    /// attribute pass over the accumulated directory map.
    pub fn execute(&self, queue: &OperationQueue) -> ExecStats {
        let moves = self.run_moves(&queue.moves);
        let copies = self.run_copies(&queue.copies);
        let dirs_synced = self.sync_dir_attrs(queue.dir_attrs());
        ExecStats {
            moves,
            copies,
            dirs_synced,
            removed: None,
        }
    }

    /// Reposition previously backed-up files whose sources were renamed.
    pub fn run_moves(&self, ops: &[MoveOp]) -> OpStats {
        if let Some(progress) = self.progress {
            progress.on_phase_started(Phase::Move, ops.len(), 0);
        }

        let mut stats = OpStats::default();
        for (i, op) in ops.iter().enumerate() {
            match fs_ops::move_file(&op.old_destination, &op.new_destination) {
                Ok(()) => stats.completed += 1,
                Err(err) => {
                    stats.failed += 1;
                    self.log.log(&err.to_string());
                }
            }
            if let Some(progress) = self.progress {
                progress.on_operation_completed(Phase::Move, i + 1, ops.len(), 0);
            }
        }

        self.log.log(&format!(
            "Move Operations Completed {}/{}",
            stats.completed,
            ops.len()
        ));
        if let Some(progress) = self.progress {
            progress.on_phase_completed(Phase::Move, &stats);
        }
        stats
    }

    /// Copy new and modified files into the backup tree.
    pub fn run_copies(&self, ops: &[CopyOp]) -> OpStats {
        let total_bytes: u64 = ops.iter().map(|op| op.size).sum();
        if let Some(progress) = self.progress {
            progress.on_phase_started(Phase::Copy, ops.len(), total_bytes);
        }

        let mut stats = OpStats::default();
        let mut bytes_done = 0u64;
        for (i, op) in ops.iter().enumerate() {
            match fs_ops::copy_file_with_metadata(&op.source, &op.destination) {
                Ok(bytes) => {
                    stats.completed += 1;
                    stats.bytes += bytes;
                }
                Err(err) => {
                    stats.failed += 1;
                    self.log.log(&err.to_string());
                }
            }
            // progress is accounted in scheduled sizes so the bar total
            // stays consistent even when an operation fails
            bytes_done += op.size;
            if let Some(progress) = self.progress {
                progress.on_operation_completed(Phase::Copy, i + 1, ops.len(), bytes_done);
            }
        }

        self.log.log(&format!(
            "Copy Operations Completed {}/{}",
            stats.completed,
            ops.len()
        ));
        if let Some(progress) = self.progress {
            progress.on_phase_completed(Phase::Copy, &stats);
        }
        stats
    }

    /// Propagate source-directory attributes onto their destination
    /// directories, so directory metadata reflects the source tree rather
    /// than the moment this executor created the directories.
    ///
    /// # Returns
    /// Number of directories successfully synced
    pub fn sync_dir_attrs(&self, map: &DirAttrSyncMap) -> usize {
        let mut synced = 0;
        for (src, dst) in map {
            match fs_ops::sync_dir_attributes(src, dst) {
                Ok(()) => synced += 1,
                Err(err) => self.log.log(&err.to_string()),
            }
        }
        synced
    }

    /// Delete the backup copies behind stale index entries.
    ///
    /// Destructive and deliberately opt-in: a source volume that is merely
    /// unmounted looks identical to a mass deletion, so this is never
    /// invoked unless the caller decided that policy. An already-missing
    /// backup copy counts as completed.
    pub fn remove_stale(&self, entries: &[IndexEntry]) -> OpStats {
        let mut stats = OpStats::default();
        for entry in entries {
            match fs::remove_file(&entry.destination_path) {
                Ok(()) => stats.completed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => stats.completed += 1,
                Err(e) => {
                    stats.failed += 1;
                    self.log.log(&format!(
                        "RemoveError: {} ({})",
                        entry.destination_path.display(),
                        e
                    ));
                }
            }
        }

        self.log.log(&format!(
            "Stale Entries Removed {}/{}",
            stats.completed,
            entries.len()
        ));
        stats
    }
}
