//! # Mirror Engine - Incremental Backup Library
//!
//! A headless, metadata-driven incremental backup engine in Rust.
//! Designed as the foundation for multiple front ends (CLI, automation).
//!
//! ## Overview
//!
//! The engine mirrors changed content from a source tree into a backup
//! tree while minimizing redundant copying. It features:
//! - Change detection by filesystem identity and modification time, with
//!   no content hashing
//! - Rename detection that repositions existing backup files instead of
//!   re-copying them
//! - A persisted per-profile index, replaced wholesale after each run
//! - Per-file and per-operation error isolation
//! - Logging and progress through injected collaborator traits, decoupled
//!   from any UI technology
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{load_profiles, BackupIndex, Executor, Scanner, StderrLog};
//!
//! # fn main() -> engine::Result<()> {
//! let log = StderrLog;
//! let profiles = load_profiles("profiles.json".as_ref())?;
//!
//! for profile in profiles.iter().filter(|p| p.is_executable()) {
//!     // Load the previous run's index
//!     let index = BackupIndex::load(&profile.index_path);
//!
//!     // Classify every source file and schedule operations
//!     let outcome = Scanner::new(profile, &index, &log).scan()?;
//!     println!("{} new, {} moved", outcome.stats.new, outcome.stats.moved);
//!
//!     // Apply the operations: moves first, then copies
//!     Executor::new(&log).execute(&outcome.queue);
//!
//!     // Persist the new index for the next run
//!     BackupIndex::rewrite(&profile.index_path, &outcome.retained)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (FileRecord, IndexEntry, operations)
//! - **error**: Error types and handling
//! - **profile**: Backup profiles and their configuration file
//! - **index**: The persisted backup index
//! - **fs_ops**: Low-level filesystem operations
//! - **scanner**: Tree walking and change classification
//! - **executor**: Batch execution against the backup tree
//! - **progress**: Progress estimation and the phase callback trait
//! - **log**: Log sink collaborator trait

pub mod error;
pub mod executor;
pub mod fs_ops;
pub mod index;
pub mod log;
pub mod model;
pub mod profile;
pub mod progress;
pub mod scanner;

// Re-export main types and functions
pub use error::{EngineError, Result};
pub use executor::Executor;
pub use index::BackupIndex;
pub use log::{LogSink, NullLog, StderrLog};
pub use model::{
    Classification, ClassifiedRecord, CopyOp, DirAttrSyncMap, ExecStats, FileId, FileRecord,
    IndexEntry, MoveOp, OperationQueue, OpStats, RunReport, ScanStats,
};
pub use profile::{load_profiles, Profile, ProfileConfig};
pub use progress::{Phase, PhaseProgress, ProgressTracker};
pub use scanner::{ScanOutcome, Scanner};
