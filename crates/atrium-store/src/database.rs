use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::content_type::ContentTypeMap;
use crate::error::{Result, StoreError};
use crate::mode::StoreMode;

/// Retry budget for [`Database::create_unique`].
const MAX_UNIQUE_ATTEMPTS: u32 = 64;

/// A retrieved file: payload bytes plus the metadata a data source needs.
#[derive(Clone, Debug)]
pub struct StoredFile {
    /// The final path segment.
    pub name: String,
    /// MIME type, determined from the file name.
    pub content_type: String,
    /// Last modification time, when the filesystem reports one.
    pub modified: SystemTime,
    /// The payload.
    pub data: Vec<u8>,
}

/// One storage area: a read-only base root overlaid by a writable root.
///
/// Reads prefer the write root and fall back to the read root; writes always
/// target the write root. The two roots may be the same directory. A
/// database is constructed once at startup and never mutated afterwards
/// except through the file operations it exposes.
#[derive(Debug)]
pub struct Database {
    label: String,
    read_root: PathBuf,
    write_root: Option<PathBuf>,
    content_types: Arc<ContentTypeMap>,
    rng: Mutex<StdRng>,
}

impl Database {
    /// Open a database over the given roots.
    ///
    /// The read root must already exist. A missing write root directory is
    /// created (recursively, idempotently). Passing `None` for the write
    /// root yields a read-only database.
    pub fn open(
        label: impl Into<String>,
        read_root: impl Into<PathBuf>,
        write_root: Option<PathBuf>,
        content_types: Arc<ContentTypeMap>,
    ) -> Result<Self> {
        let label = label.into();
        let read_root = read_root.into();

        let meta = fs::metadata(&read_root)
            .map_err(|e| StoreError::from_io(&read_root.display().to_string(), e))?;
        if !meta.is_dir() {
            return Err(StoreError::InvalidPath {
                path: read_root.display().to_string(),
                reason: "read root is not a directory".to_string(),
            });
        }

        if let Some(write_root) = &write_root {
            fs::create_dir_all(write_root)
                .map_err(|e| StoreError::from_io(&write_root.display().to_string(), e))?;
        }

        debug!(
            db = %label,
            read_root = %read_root.display(),
            write_root = ?write_root,
            "database opened"
        );

        Ok(Self {
            label,
            read_root,
            write_root,
            content_types,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// The label used in log output and errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The read-only base root.
    pub fn read_root(&self) -> &Path {
        &self.read_root
    }

    /// The writable overlay root, if configured.
    pub fn write_root(&self) -> Option<&Path> {
        self.write_root.as_deref()
    }

    /// The content-type table this database reports MIME types from.
    pub fn content_types(&self) -> &ContentTypeMap {
        &self.content_types
    }

    /// `true` iff a write root is configured and currently writable.
    pub fn is_writable(&self) -> bool {
        match &self.write_root {
            Some(root) => fs::metadata(root)
                .map(|m| !m.permissions().readonly())
                .unwrap_or(false),
            None => false,
        }
    }

    /// `true` iff the file exists in either root.
    pub fn exists(&self, path: &str) -> bool {
        check_relative(path).is_ok()
            && (self
                .write_root
                .as_ref()
                .is_some_and(|w| w.join(path).exists())
                || self.read_root.join(path).exists())
    }

    /// Retrieve a file, preferring the write root.
    ///
    /// Fails with `NotFound` when the file is absent from both roots and
    /// with `AccessDenied` when it is present but unreadable.
    pub fn get(&self, path: &str) -> Result<StoredFile> {
        check_relative(path)?;

        if let Some(write_root) = &self.write_root {
            match self.read_stored(path, &write_root.join(path)) {
                Err(StoreError::NotFound { .. }) => {}
                other => return other,
            }
        }
        self.read_stored(path, &self.read_root.join(path))
    }

    fn read_stored(&self, path: &str, full: &Path) -> Result<StoredFile> {
        let data = fs::read(full).map_err(|e| StoreError::from_io(path, e))?;
        let modified = fs::metadata(full)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let content_type = self.content_types.content_type_for(&name).to_string();
        Ok(StoredFile {
            name,
            content_type,
            modified,
            data,
        })
    }

    /// Store a file under the write root, subject to the given mode.
    ///
    /// Parent directories are created as needed. The payload is written to
    /// a temporary file in the target directory and renamed into place, so
    /// a reader sees either the previous state or the complete new file.
    pub fn put(&self, path: &str, data: &[u8], mode: StoreMode) -> Result<()> {
        check_relative(path)?;
        let write_root = self.require_writable()?;
        let target = write_root.join(path);

        match mode {
            StoreMode::MustNotExist => {
                // The atomic check happens again at rename time via
                // persist_noclobber; this early check just fails fast.
                if target.exists() {
                    return Err(StoreError::AlreadyExists {
                        path: path.to_string(),
                    });
                }
            }
            StoreMode::MustExist => {
                if !self.exists(path) {
                    return Err(StoreError::NotFound {
                        path: path.to_string(),
                    });
                }
            }
            StoreMode::Either => {}
        }

        self.write_atomic(path, &target, data, mode == StoreMode::MustNotExist)?;
        debug!(db = %self.label, path, bytes = data.len(), %mode, "file stored");
        Ok(())
    }

    /// Create a file under a unique name derived from `path` by replacing
    /// `token` with a random discriminator, retrying while the name is
    /// taken. Returns the path actually used.
    ///
    /// The token must be non-empty, occur exactly once in `path`, and fall
    /// within the final path segment.
    pub fn create_unique(&self, path: &str, token: &str, data: &[u8]) -> Result<String> {
        check_relative(path)?;
        let invalid = |reason: &str| StoreError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if token.is_empty() {
            return Err(invalid("replacement token must not be empty"));
        }
        let first = match path.find(token) {
            Some(pos) => pos,
            None => return Err(invalid("replacement token does not occur in path")),
        };
        if path[first + token.len()..].contains(token) {
            return Err(invalid("replacement token occurs more than once"));
        }
        if let Some(slash) = path.rfind('/') {
            if first < slash {
                return Err(invalid("replacement token must fall in the final path segment"));
            }
        }

        let write_root = self.require_writable()?;
        for _ in 0..MAX_UNIQUE_ATTEMPTS {
            let discriminator = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                format!("{:016x}", rng.gen::<u64>())
            };
            let candidate = path.replacen(token, &discriminator, 1);
            let target = write_root.join(&candidate);
            if target.exists() {
                continue;
            }
            match self.write_atomic(&candidate, &target, data, true) {
                Ok(()) => {
                    debug!(db = %self.label, path = %candidate, "unique file created");
                    return Ok(candidate);
                }
                // Lost a race for this name; try another.
                Err(StoreError::AlreadyExists { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::UniqueNamesExhausted {
            path: path.to_string(),
            attempts: MAX_UNIQUE_ATTEMPTS,
        })
    }

    /// Delete a file.
    ///
    /// Fails with `NotFound` when the file exists in neither root. When the
    /// roots are distinct and the read root also holds the file, that copy
    /// is removed as well, since the overlay read would otherwise resurrect
    /// it.
    pub fn delete(&self, path: &str) -> Result<()> {
        check_relative(path)?;
        let write_root = self.require_writable()?;
        let write_target = write_root.join(path);
        let distinct = write_root != self.read_root;
        let read_target = self.read_root.join(path);

        let in_write = write_target.exists();
        let in_read = distinct && read_target.exists();
        if !in_write && !in_read {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }

        if in_write {
            fs::remove_file(&write_target).map_err(|e| StoreError::from_io(path, e))?;
        }
        if in_read {
            fs::remove_file(&read_target).map_err(|e| StoreError::from_io(path, e))?;
        }
        debug!(db = %self.label, path, "file deleted");
        Ok(())
    }

    /// Recursively remove a directory and everything beneath it, in both
    /// roots when they are distinct. A directory that does not exist is a
    /// no-op.
    pub fn empty_directory(&self, path: &str) -> Result<()> {
        check_relative(path)?;
        let write_root = self.require_writable()?;

        let mut targets = vec![write_root.join(path)];
        if write_root != self.read_root {
            targets.push(self.read_root.join(path));
        }
        for target in targets {
            match fs::remove_dir_all(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::from_io(path, e)),
            }
        }
        debug!(db = %self.label, path, "directory emptied");
        Ok(())
    }

    /// List the entry names under a directory: the union across both roots,
    /// sorted. A directory that exists in neither root yields an empty
    /// list.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        check_relative(path)?;

        let mut dirs = vec![self.read_root.join(path)];
        if let Some(write_root) = &self.write_root {
            if *write_root != self.read_root {
                dirs.push(write_root.join(path));
            }
        }

        let mut names = BTreeSet::new();
        for dir in dirs {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::from_io(path, e)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| StoreError::from_io(path, e))?;
                names.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names.into_iter().collect())
    }

    fn require_writable(&self) -> Result<&Path> {
        self.write_root.as_deref().ok_or_else(|| StoreError::ReadOnly {
            label: self.label.clone(),
        })
    }

    fn write_atomic(&self, path: &str, target: &Path, data: &[u8], noclobber: bool) -> Result<()> {
        let parent = target.parent().ok_or_else(|| StoreError::InvalidPath {
            path: path.to_string(),
            reason: "path has no parent directory".to_string(),
        })?;
        fs::create_dir_all(parent).map_err(|e| StoreError::from_io(path, e))?;

        let mut tmp =
            NamedTempFile::new_in(parent).map_err(|e| StoreError::from_io(path, e))?;
        tmp.write_all(data).map_err(|e| StoreError::from_io(path, e))?;

        let result = if noclobber {
            tmp.persist_noclobber(target)
        } else {
            tmp.persist(target)
        };
        result
            .map(|_| ())
            .map_err(|e| StoreError::from_io(path, e.error))
    }
}

/// Reject paths that are unusable at the storage layer: empty, absolute, or
/// traversing parent directories. Grammar validation proper happens above
/// this layer, before translation.
fn check_relative(path: &str) -> Result<()> {
    let invalid = |reason: &str| StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(invalid("must be a relative, forward-slash path"));
    }
    for component in path.split('/') {
        if component.is_empty() {
            return Err(invalid("components must not be empty"));
        }
        if component == "." || component == ".." {
            return Err(invalid("must not traverse directories"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn overlay_db(read: &Path, write: &Path) -> Database {
        Database::open(
            "test",
            read,
            Some(write.to_path_buf()),
            Arc::new(ContentTypeMap::standard()),
        )
        .unwrap()
    }

    #[test]
    fn overlay_read_prefers_write_root() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        fs::write(read.path().join("a.txt"), b"base").unwrap();
        fs::write(write.path().join("a.txt"), b"overlay").unwrap();

        let db = overlay_db(read.path(), write.path());
        assert_eq!(db.get("a.txt").unwrap().data, b"overlay");

        fs::remove_file(write.path().join("a.txt")).unwrap();
        assert_eq!(db.get("a.txt").unwrap().data, b"base");
    }

    #[test]
    fn get_reports_not_found_and_metadata() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        let db = overlay_db(read.path(), write.path());

        assert!(matches!(
            db.get("missing.txt"),
            Err(StoreError::NotFound { .. })
        ));

        db.put("dir/file.xml", b"<A/>", StoreMode::Either).unwrap();
        let file = db.get("dir/file.xml").unwrap();
        assert_eq!(file.name, "file.xml");
        assert_eq!(file.content_type, "text/xml");
        assert_eq!(file.data, b"<A/>");
    }

    #[test]
    fn must_not_exist_rejects_and_preserves() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        let db = overlay_db(read.path(), write.path());

        db.put("a.txt", b"first", StoreMode::MustNotExist).unwrap();
        let err = db.put("a.txt", b"second", StoreMode::MustNotExist);
        assert!(matches!(err, Err(StoreError::AlreadyExists { .. })));
        assert_eq!(db.get("a.txt").unwrap().data, b"first");
    }

    #[test]
    fn must_not_exist_ignores_read_root_copy() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        fs::write(read.path().join("a.txt"), b"factory").unwrap();

        let db = overlay_db(read.path(), write.path());
        db.put("a.txt", b"overlaid", StoreMode::MustNotExist).unwrap();
        assert_eq!(db.get("a.txt").unwrap().data, b"overlaid");
    }

    #[test]
    fn must_exist_requires_presence_in_either_root() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        fs::write(read.path().join("a.txt"), b"factory").unwrap();

        let db = overlay_db(read.path(), write.path());
        assert!(matches!(
            db.put("b.txt", b"x", StoreMode::MustExist),
            Err(StoreError::NotFound { .. })
        ));
        db.put("a.txt", b"updated", StoreMode::MustExist).unwrap();
        assert_eq!(db.get("a.txt").unwrap().data, b"updated");
    }

    #[test]
    fn delete_twice_reports_not_found_second_time() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        let db = overlay_db(read.path(), write.path());

        db.put("a.txt", b"x", StoreMode::Either).unwrap();
        db.delete("a.txt").unwrap();
        assert!(matches!(db.delete("a.txt"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn delete_removes_both_copies() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        fs::write(read.path().join("a.txt"), b"base").unwrap();
        fs::write(write.path().join("a.txt"), b"overlay").unwrap();

        let db = overlay_db(read.path(), write.path());
        db.delete("a.txt").unwrap();
        assert!(matches!(db.get("a.txt"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn empty_directory_tolerates_absence() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        let db = overlay_db(read.path(), write.path());

        db.empty_directory("nope").unwrap();
        db.empty_directory("nope").unwrap();

        db.put("d/one.txt", b"1", StoreMode::Either).unwrap();
        db.put("d/sub/two.txt", b"2", StoreMode::Either).unwrap();
        db.empty_directory("d").unwrap();
        assert!(matches!(db.get("d/one.txt"), Err(StoreError::NotFound { .. })));
        assert!(db.list("d").unwrap().is_empty());
    }

    #[test]
    fn list_unions_both_roots() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        fs::create_dir_all(read.path().join("d")).unwrap();
        fs::write(read.path().join("d/base.txt"), b"1").unwrap();

        let db = overlay_db(read.path(), write.path());
        db.put("d/overlay.txt", b"2", StoreMode::Either).unwrap();
        assert_eq!(db.list("d").unwrap(), vec!["base.txt", "overlay.txt"]);
    }

    #[test]
    fn create_unique_replaces_token_once() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        let db = overlay_db(read.path(), write.path());

        let path = db.create_unique("drafts/page-TOKEN.xml", "TOKEN", b"x").unwrap();
        assert!(path.starts_with("drafts/page-"));
        assert!(path.ends_with(".xml"));
        assert!(db.get(&path).is_ok());

        // Token constraints.
        assert!(db.create_unique("a.xml", "TOKEN", b"x").is_err());
        assert!(db.create_unique("TOKEN/a-TOKEN.xml", "TOKEN", b"x").is_err());
        assert!(db.create_unique("a-TOKEN-TOKEN.xml", "TOKEN", b"x").is_err());
    }

    #[test]
    fn read_only_database_rejects_writes() {
        let read = tempdir().unwrap();
        fs::write(read.path().join("a.txt"), b"base").unwrap();

        let db = Database::open("ro", read.path(), None, Arc::new(ContentTypeMap::standard()))
            .unwrap();
        assert!(!db.is_writable());
        assert_eq!(db.get("a.txt").unwrap().data, b"base");
        assert!(matches!(
            db.put("b.txt", b"x", StoreMode::Either),
            Err(StoreError::ReadOnly { .. })
        ));
        assert!(matches!(db.delete("a.txt"), Err(StoreError::ReadOnly { .. })));
    }

    #[test]
    fn storage_layer_path_checks() {
        let read = tempdir().unwrap();
        let write = tempdir().unwrap();
        let db = overlay_db(read.path(), write.path());

        for path in ["", "/abs.txt", "a//b.txt", "../escape.txt", "a/./b.txt"] {
            assert!(
                matches!(db.get(path), Err(StoreError::InvalidPath { .. })),
                "{path}"
            );
        }
    }
}
