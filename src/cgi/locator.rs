//! Script resolution inside a restricted root.
//!
//! # Responsibilities
//! - Map a request path's final segment to a script file under the root
//! - Neutralize directory traversal; the resolved path never escapes
//! - Require a regular, executable file
//!
//! # Design Decisions
//! - Every failure collapses to the same not-found signal; callers cannot
//!   distinguish "missing" from "wrong kind of entry"

use std::path::{Path, PathBuf};

/// Resolves request paths to executable scripts inside a fixed root.
#[derive(Debug, Clone)]
pub struct ScriptLocator {
    root: PathBuf,
}

impl ScriptLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the script named by the request path's final segment.
    ///
    /// Returns `None` for anything that is not a plain, executable file
    /// sitting directly inside the root.
    pub fn locate(&self, request_path: &str) -> Option<PathBuf> {
        let name = request_path.trim_end_matches('/').rsplit('/').next()?;

        if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
            return None;
        }

        let root = self.root.canonicalize().ok()?;
        let candidate = root.join(name);

        let metadata = candidate.metadata().ok()?;
        if !metadata.is_file() {
            return None;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return None;
            }
        }

        // A symlinked script must still land inside the root.
        let resolved = candidate.canonicalize().ok()?;
        if !resolved.starts_with(&root) {
            return None;
        }

        Some(resolved)
    }
}
