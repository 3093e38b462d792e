//! Maps request path segments onto files inside a report directory.

use std::path::{Component, Path, PathBuf};

use kernel::ReportId;

use crate::domain::BuildStorage;
use crate::error::ServeError;

const SEP: &str = "/";

/// A canonical path that was inside its report root and pointed to a regular
/// file when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    /// Canonical report root the path was checked against
    pub root: PathBuf,
    /// The relative path as requested, safe to echo back in messages
    pub relative: String,
}

impl ResolvedFile {
    /// Resolves the same relative path again against the stored canonical root.
    ///
    /// The tree may change while a request waits for the report lock, so this
    /// runs again once the lock is held.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`].
    pub async fn revalidate(self) -> Result<Self, ServeError> {
        locate(self.root, &self.relative).await
    }
}

/// Directory holding all files of the report.
pub fn report_root<S: BuildStorage + ?Sized>(storage: &S, id: &ReportId) -> PathBuf {
    storage
        .build_dir(id.project_id, id.build_number)
        .join(id.kind.dir())
        .join(&id.report_name)
}

/// Report names become a directory name, so they must be one plain component.
#[must_use]
pub fn is_valid_report_name(name: &str) -> bool {
    if name.trim().is_empty() || name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Joins request segments into a relative path.
///
/// Segments that are blank after trimming are skipped. Returns `None` when
/// nothing is left.
pub fn relative_path<S: AsRef<str>>(segments: &[S]) -> Option<String> {
    let joined = segments
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(SEP);
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Resolves `relative` against `root` and checks containment.
///
/// Symlinks and `..` are followed by canonicalization before the containment
/// check. A path outside the root fails exactly like a missing file does.
///
/// # Errors
///
/// [`ServeError::NotFound`] when the root or target is missing, the target is
/// a directory, or the target lies outside the root.
pub async fn resolve(root: &Path, relative: &str) -> Result<ResolvedFile, ServeError> {
    let root = tokio::fs::canonicalize(root).await.map_err(|e| {
        tracing::debug!("report root {} unavailable: {e}", root.display());
        path_not_found(relative)
    })?;

    locate(root, relative).await
}

pub(crate) fn path_not_found(relative: &str) -> ServeError {
    ServeError::NotFound(format!(
        "report path '{relative}' does not exist or is a directory"
    ))
}

/// `root` must already be canonical.
async fn locate(root: PathBuf, relative: &str) -> Result<ResolvedFile, ServeError> {
    let not_found = || path_not_found(relative);

    let candidate = tokio::fs::canonicalize(root.join(relative))
        .await
        .map_err(|_| not_found())?;

    if candidate == root || !candidate.starts_with(&root) {
        tracing::warn!(
            "rejected path '{relative}' resolving to {} outside of {}",
            candidate.display(),
            root.display()
        );
        return Err(not_found());
    }

    let meta = tokio::fs::metadata(&candidate)
        .await
        .map_err(|_| not_found())?;
    if !meta.is_file() {
        return Err(not_found());
    }

    Ok(ResolvedFile {
        path: candidate,
        root,
        relative: relative.to_owned(),
    })
}
