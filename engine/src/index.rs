//! The persisted backup index.
//!
//! One text line per tracked file, fields joined with a multi-character
//! delimiter token so paths containing commas survive a round trip. The
//! index is the engine's only state across runs: it is loaded once at run
//! start, consulted read-only during the scan, and overwritten wholesale
//! from the scan's retained entries afterwards. Losing it is not a crash;
//! the next run simply treats everything as new and re-copies.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::model::{FileId, IndexEntry};

/// Field delimiter token. Multi-character so no single path character can
/// collide with it.
const FIELD_DELIMITER: &str = "[index-sep]";

/// In-memory mapping from file identity to its last-known entry.
#[derive(Debug, Default)]
pub struct BackupIndex {
    entries: HashMap<FileId, IndexEntry>,
}

impl BackupIndex {
    pub fn new() -> BackupIndex {
        BackupIndex::default()
    }

    /// Load the index file at `path`.
    ///
    /// Never fails: a missing or unreadable file yields an empty index so a
    /// first run behaves as "everything is new", and corrupt lines are
    /// skipped rather than poisoning the rest of the file.
    pub fn load(path: &Path) -> BackupIndex {
        let mut index = BackupIndex::new();
        let Ok(text) = fs::read_to_string(path) else {
            return index;
        };
        for line in text.lines() {
            if let Some(entry) = parse_line(line) {
                index.entries.insert(entry.id, entry);
            }
        }
        index
    }

    pub fn get(&self, id: &FileId) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &FileId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Render index lines for a retained entry set, ordered by identity so
    /// repeated runs over an unchanged tree produce identical files.
    pub fn serialize(entries: &[IndexEntry]) -> Vec<String> {
        let mut sorted: Vec<&IndexEntry> = entries.iter().collect();
        sorted.sort_by_key(|entry| entry.id);
        sorted.into_iter().map(format_line).collect()
    }

    /// Overwrite the index file wholesale with the given lines.
    ///
    /// # Errors
    /// `IndexWriteFailed` on any I/O error; the caller treats this as
    /// profile-fatal since the next run would otherwise re-copy everything.
    pub fn write(path: &Path, lines: &[String]) -> Result<()> {
        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        fs::write(path, text).map_err(|e| EngineError::IndexWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Serialize and write in one step.
    pub fn rewrite(path: &Path, entries: &[IndexEntry]) -> Result<()> {
        BackupIndex::write(path, &BackupIndex::serialize(entries))
    }
}

fn format_line(entry: &IndexEntry) -> String {
    format!(
        "{}{sep}{}{sep}{}{sep}{}",
        entry.id,
        entry.mtime_ns,
        entry.source_path.display(),
        entry.destination_path.display(),
        sep = FIELD_DELIMITER,
    )
}

/// Parse one index line; `None` on any malformed field. Lines without the
/// delimiter token fall back to comma splitting, a tolerance kept for index
/// files written by early versions of the format.
fn parse_line(line: &str) -> Option<IndexEntry> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }

    let fields: Vec<&str> = if line.contains(FIELD_DELIMITER) {
        line.split(FIELD_DELIMITER).collect()
    } else {
        line.split(',').collect()
    };
    if fields.len() != 4 {
        return None;
    }

    Some(IndexEntry {
        id: FileId::parse(fields[0])?,
        mtime_ns: fields[1].trim().parse().ok()?,
        source_path: PathBuf::from(fields[2]),
        destination_path: PathBuf::from(fields[3]),
    })
}
