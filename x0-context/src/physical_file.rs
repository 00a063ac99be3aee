use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A `stat()`-snapshotted file reference (spec §6 "physical file path/
/// exists/is-reg/is-dir/is-exe/mtime/size/etag/mimetype"). The metadata is
/// captured once, at construction, rather than re-`stat`ed on every
/// accessor call — the original's `xzero::File` is itself a cached handle,
/// not a live path.
#[derive(Debug, Clone)]
pub struct PhysicalFile {
    path: PathBuf,
    metadata: Option<std::fs::Metadata>,
    mimetype: Option<String>,
}

impl PhysicalFile {
    /// Stats `path` once. A stat failure (most commonly "not found") isn't
    /// an error here — `exists()` simply reports `false` and every other
    /// accessor degrades to its absent-file default, matching how the
    /// Flow builtin surface treats a missing file as ordinary, checkable
    /// state rather than a thrown error.
    pub fn stat(path: impl Into<PathBuf>, mimetype: Option<String>) -> Self {
        let path = path.into();
        let metadata = std::fs::metadata(&path).ok();
        Self { path, metadata, mimetype }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn is_regular(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.is_file())
    }

    pub fn is_directory(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.is_dir())
    }

    #[cfg(unix)]
    pub fn is_executable(&self) -> bool {
        use std::os::unix::fs::PermissionsExt;
        self.metadata.as_ref().is_some_and(|m| m.permissions().mode() & 0o111 != 0)
    }

    #[cfg(not(unix))]
    pub fn is_executable(&self) -> bool {
        false
    }

    pub fn size(&self) -> u64 {
        self.metadata.as_ref().map(|m| m.len()).unwrap_or(0)
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.metadata.as_ref().and_then(|m| m.modified().ok())
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    /// A weak `mtime-size` etag, quoted per RFC 7232. Good enough for
    /// conditional requests on a local filesystem without hashing the
    /// file's content on every request.
    pub fn etag(&self) -> Option<String> {
        let mtime = self.mtime()?.duration_since(std::time::UNIX_EPOCH).ok()?;
        Some(format!("\"{:x}-{:x}\"", mtime.as_secs(), self.size()))
    }
}
