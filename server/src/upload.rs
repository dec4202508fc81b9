//! File uploads.
//!
//! [`UploadStore`] is the storage seam; [`FsUploadStore`] keeps files under a
//! fixed root directory. Bucket and path strings from the request are
//! sanitized segment by segment before anything touches the filesystem:
//!
//! - `/` and `\` both separate segments
//! - empty, `.` and `..` segments are dropped
//! - characters outside `[A-Za-z0-9._-]` become `-`
//!
//! ```
//! use portal_server::upload::sanitize_path;
//!
//! assert_eq!(sanitize_path("../../etc/passwd"), "etc/passwd");
//! assert_eq!(sanitize_path("..\\promo banner.png"), "promo-banner.png");
//! ```

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::UploadConfig;
use crate::error::UploadError;

/// One file to store.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub bucket: &'a str,
    pub path: &'a str,
    pub bytes: &'a [u8],
    /// Overwrite an existing file instead of rejecting the upload.
    pub upsert: bool,
}

/// Where an upload ended up, relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// `<bucket>/<path>` after sanitization.
    pub path: String,
}

/// Storage backend for uploaded files.
pub trait UploadStore: Send + Sync {
    /// Stores one file.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::DisallowedExtension`] or
    /// [`UploadError::InvalidPath`] for unacceptable targets,
    /// [`UploadError::AlreadyExists`] when the target exists and `upsert` is
    /// not set, and [`UploadError::TooLarge`] above the size limit.
    fn store(&self, request: UploadRequest<'_>) -> Result<StoredObject, UploadError>;
}

/// Sanitizes a slash- or backslash-separated path.
pub fn sanitize_path(raw: &str) -> String {
    raw.split(['/', '\\'])
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .map(sanitize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Stores uploads on the local filesystem under a single root.
#[derive(Debug, Clone)]
pub struct FsUploadStore {
    root: PathBuf,
    allowed_extensions: Vec<String>,
    max_bytes: usize,
}

impl FsUploadStore {
    pub fn new(root: impl Into<PathBuf>, allowed_extensions: Vec<String>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_bytes,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            config.root.clone(),
            config.allowed_extensions.clone(),
            config.max_bytes,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn is_allowed(&self, path: &str) -> bool {
        extension(path).is_some_and(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
    }

    /// Resolves `relative` under the root, creating parent directories one
    /// segment at a time. A symlinked segment is refused before anything is
    /// created beneath it, and every created directory must canonicalize to
    /// a path inside the root.
    fn resolve(&self, relative: &str) -> Result<PathBuf, UploadError> {
        std::fs::create_dir_all(&self.root)?;
        let root = self.root.canonicalize()?;

        let mut segments: Vec<&str> = relative.split('/').collect();
        let file_name = segments.pop().ok_or(UploadError::InvalidPath)?;

        let mut current = root.clone();
        for segment in segments {
            let next = current.join(segment);
            refuse_symlink(&next)?;
            match std::fs::create_dir(&next) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
            let next = next.canonicalize()?;
            if !next.starts_with(&root) {
                warn!(path = %relative, "Upload path resolves outside the root");
                return Err(UploadError::InvalidPath);
            }
            current = next;
        }

        let resolved = current.join(file_name);
        refuse_symlink(&resolved)?;
        Ok(resolved)
    }
}

fn refuse_symlink(path: &Path) -> Result<(), UploadError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(UploadError::InvalidPath),
        _ => Ok(()),
    }
}

impl UploadStore for FsUploadStore {
    fn store(&self, request: UploadRequest<'_>) -> Result<StoredObject, UploadError> {
        let bucket = sanitize_path(request.bucket);
        let path = sanitize_path(request.path);
        if bucket.is_empty() || path.is_empty() {
            warn!(bucket = request.bucket, path = request.path, "Rejected upload path");
            return Err(UploadError::InvalidPath);
        }
        if !self.is_allowed(&path) {
            warn!(path = %path, "Rejected upload extension");
            return Err(UploadError::DisallowedExtension(
                extension(&path).unwrap_or_default(),
            ));
        }
        if request.bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge(self.max_bytes));
        }

        let relative = format!("{bucket}/{path}");
        let target = self.resolve(&relative)?;

        let mut options = OpenOptions::new();
        options.write(true);
        if request.upsert {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(&target).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => UploadError::AlreadyExists(relative.clone()),
            _ => UploadError::IoError(e),
        })?;
        file.write_all(request.bytes)?;
        file.sync_all()?;

        info!(path = %relative, bytes = request.bytes.len(), "Stored upload");
        Ok(StoredObject { path: relative })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> FsUploadStore {
        FsUploadStore::new(root, vec!["png".into(), ".PDF".into()], 1024)
    }

    fn request<'a>(bucket: &'a str, path: &'a str, upsert: bool) -> UploadRequest<'a> {
        UploadRequest {
            bucket,
            path,
            bytes: b"data",
            upsert,
        }
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("../secrets"), "secrets");
        assert_eq!(sanitize_path("./a//b/../c.png"), "a/b/c.png");
        assert_eq!(sanitize_path("..\\..\\win.ini"), "win.ini");
        assert_eq!(sanitize_path("café/<x>.png"), "caf-/-x-.png");
        assert_eq!(sanitize_path("../.."), "");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b/logo.PNG").as_deref(), Some("png"));
        assert_eq!(extension("a/passwd"), None);
        assert_eq!(extension("a/.png"), None);
        assert_eq!(extension("a/file."), None);
    }

    #[test]
    fn test_traversal_without_allowed_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        let result = store(&root).store(request("../secrets", "../../etc/passwd", false));
        assert!(matches!(result, Err(UploadError::DisallowedExtension(_))));
        assert!(!dir.path().join("secrets").exists());
        assert!(!root.join("secrets").exists());
    }

    #[test]
    fn test_traversal_is_contained_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        let stored = store(&root)
            .store(request("../secrets", "../../etc/passwd.png", false))
            .unwrap();
        assert_eq!(stored.path, "secrets/etc/passwd.png");
        assert_eq!(
            std::fs::read(root.join("secrets/etc/passwd.png")).unwrap(),
            b"data"
        );
        assert!(!dir.path().join("secrets").exists());
    }

    #[test]
    fn test_existing_file_requires_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.store(request("docs", "contract.pdf", false)).unwrap();
        assert!(matches!(
            store.store(request("docs", "contract.pdf", false)),
            Err(UploadError::AlreadyExists(path)) if path == "docs/contract.pdf"
        ));

        let replaced = UploadRequest {
            bytes: b"v2",
            ..request("docs", "contract.pdf", true)
        };
        store.store(replaced).unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("docs/contract.pdf")).unwrap(),
            b"v2"
        );
    }

    #[test]
    fn test_empty_bucket_or_path_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(
            store.store(request("..", "a.png", false)),
            Err(UploadError::InvalidPath)
        ));
        assert!(matches!(
            store.store(request("media", "../", false)),
            Err(UploadError::InvalidPath)
        ));
    }

    #[test]
    fn test_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsUploadStore::new(dir.path(), vec!["png".into()], 2);
        assert!(matches!(
            store.store(request("media", "a.png", false)),
            Err(UploadError::TooLarge(2))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_cannot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(root.join("media")).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("media/link")).unwrap();

        let store = store(&root);
        for path in ["link/x.png", "link/a/b/x.png"] {
            assert!(matches!(
                store.store(request("media", path, false)),
                Err(UploadError::InvalidPath)
            ));
        }
        assert_eq!(std::fs::read_dir(&outside).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        let outside = dir.path().join("target.png");
        std::fs::create_dir_all(root.join("media")).unwrap();
        std::fs::write(&outside, b"original").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("media/logo.png")).unwrap();

        assert!(matches!(
            store(&root).store(request("media", "logo.png", true)),
            Err(UploadError::InvalidPath)
        ));
        assert_eq!(std::fs::read(&outside).unwrap(), b"original");
    }
}
