//! Low-level filesystem operations.
//!
//! This module provides the primitives the scanner and executor build on:
//! - Capturing a file's identity and modification metadata
//! - Copying files with metadata preservation
//! - Repositioning backup files after a source rename
//! - Creating directories and propagating directory attributes

use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use filetime::FileTime;

use crate::error::EngineError;
use crate::model::FileId;

/// Read the filesystem identity of a file from its metadata.
#[cfg(unix)]
pub fn file_identity(_path: &Path, metadata: &fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    FileId {
        device: metadata.dev(),
        file: metadata.ino(),
    }
}

/// Fallback identity for targets without device/inode metadata: a stable
/// hash of the path. Rename detection does not work here; a renamed file is
/// seen as a new file plus a stale entry.
#[cfg(not(unix))]
pub fn file_identity(path: &Path, _metadata: &fs::Metadata) -> FileId {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    FileId {
        device: 0,
        file: hasher.finish(),
    }
}

/// Modification time as nanoseconds since the Unix epoch (negative for
/// pre-epoch timestamps).
pub fn modified_ns(metadata: &fs::Metadata) -> io::Result<i64> {
    let modified = metadata.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    })
}

/// Ensure the parent directory of a path exists, creating it if necessary.
/// Creating an already-existing directory is not an error.
///
/// # Errors
/// Returns `DirectoryCreationFailed` if creation fails or the parent exists
/// but is not a directory.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

/// Copy a file into the backup tree, overwriting any existing destination
/// and preserving the source's modification time.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns `ReadError`/`WriteError` depending on which side failed, and
/// `WriteError` when source and destination are the same file (copying a
/// file onto itself would truncate it).
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    if src == dst {
        return Err(EngineError::WriteError {
            path: dst.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "source and destination are the same file",
            ),
        });
    }

    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_mtime = src_metadata.modified().ok();

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;

    // Preserve modification time if available
    if let Some(mtime) = src_mtime {
        let _ = filetime::set_file_mtime(dst, FileTime::from_system_time(mtime));
    }

    Ok(bytes_copied)
}

/// Reposition an existing backup file after its source was renamed. The
/// destination's parent is created first; moving a path onto itself is a
/// no-op.
///
/// # Errors
/// Returns `WriteError` when the rename fails (missing old file,
/// permissions, or a destination on a different filesystem).
pub fn move_file(old: &Path, new: &Path) -> Result<(), EngineError> {
    if old == new {
        return Ok(());
    }

    ensure_parent_dir_exists(new)?;

    fs::rename(old, new).map_err(|e| EngineError::WriteError {
        path: new.to_path_buf(),
        source: e,
    })
}

/// Propagate a source directory's permissions and modification time onto
/// its destination directory, so the backup directory reflects the source
/// tree's own directory rather than the moment the executor created it.
///
/// # Errors
/// `ReadError` when the source directory's metadata is unreadable,
/// `WriteError` when the destination rejects the attributes.
pub fn sync_dir_attributes(src: &Path, dst: &Path) -> Result<(), EngineError> {
    let metadata = fs::metadata(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    fs::set_permissions(dst, metadata.permissions()).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(dst, mtime).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_identity_is_stable_across_stats() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("file.txt");
        fs::write(&path, "data").expect("Failed to write file");

        let first = file_identity(&path, &fs::metadata(&path).expect("Failed to stat"));
        let second = file_identity(&path, &fs::metadata(&path).expect("Failed to stat"));
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_identity_survives_rename() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let old = temp_dir.path().join("old.txt");
        let new = temp_dir.path().join("new.txt");
        fs::write(&old, "data").expect("Failed to write file");

        let before = file_identity(&old, &fs::metadata(&old).expect("Failed to stat"));
        fs::rename(&old, &new).expect("Failed to rename");
        let after = file_identity(&new, &fs::metadata(&new).expect("Failed to stat"));
        assert_eq!(before, after);
    }

    #[test]
    fn test_modified_ns_tracks_pinned_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("file.txt");
        fs::write(&path, "data").expect("Failed to write file");
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1000, 500)).expect("Failed to set mtime");

        let ns = modified_ns(&fs::metadata(&path).expect("Failed to stat")).expect("Failed to read mtime");
        assert_eq!(ns, 1000 * 1_000_000_000 + 500);
    }

    #[test]
    fn test_copy_file_with_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("nested").join("dest.txt");

        let mut file = fs::File::create(&src_file).expect("Failed to create source");
        file.write_all(b"test content").expect("Failed to write source");
        drop(file);
        filetime::set_file_mtime(&src_file, FileTime::from_unix_time(1234, 0)).expect("Failed to set mtime");

        let bytes = copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(bytes, 12);

        let content = fs::read_to_string(&dst_file).expect("Failed to read dest");
        assert_eq!(content, "test content");

        // modification time carried over
        let dst_ns = modified_ns(&fs::metadata(&dst_file).expect("Failed to stat")).expect("Failed to read mtime");
        assert_eq!(dst_ns, 1234 * 1_000_000_000);
    }

    #[test]
    fn test_copy_onto_itself_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("file.txt");
        fs::write(&path, "data").expect("Failed to write file");

        let result = copy_file_with_metadata(&path, &path);
        assert!(result.is_err());
        // the file must not have been truncated
        assert_eq!(fs::read_to_string(&path).expect("Failed to read file"), "data");
    }

    #[test]
    fn test_move_file_creates_parents() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let old = temp_dir.path().join("a.txt");
        let new = temp_dir.path().join("sub").join("dir").join("b.txt");
        fs::write(&old, "payload").expect("Failed to write file");

        move_file(&old, &new).expect("Failed to move");
        assert!(!old.exists());
        assert_eq!(fs::read_to_string(&new).expect("Failed to read file"), "payload");
    }

    #[test]
    fn test_move_missing_source_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = move_file(
            &temp_dir.path().join("absent.txt"),
            &temp_dir.path().join("dest.txt"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");
        assert!(path.parent().unwrap().exists());

        // idempotent
        ensure_parent_dir_exists(&path).expect("Second call should succeed");
    }

    #[test]
    fn test_sync_dir_attributes_applies_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src-dir");
        let dst = temp_dir.path().join("dst-dir");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::create_dir(&dst).expect("Failed to create dst dir");
        filetime::set_file_mtime(&src, FileTime::from_unix_time(2000, 0)).expect("Failed to set mtime");

        sync_dir_attributes(&src, &dst).expect("Failed to sync attributes");

        let dst_ns = modified_ns(&fs::metadata(&dst).expect("Failed to stat")).expect("Failed to read mtime");
        assert_eq!(dst_ns, 2000 * 1_000_000_000);
    }

    #[test]
    fn test_sync_dir_attributes_missing_destination_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src-dir");
        fs::create_dir(&src).expect("Failed to create src dir");

        let result = sync_dir_attributes(&src, &temp_dir.path().join("absent"));
        assert!(result.is_err());
    }
}
