//! Process identity: exact executable name plus install-dir containment.

use guardian_core::ProcessRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Normalise a path for containment checks.
///
/// Lowercases, converts `\` to `/`, collapses repeated separators and drops a
/// trailing separator.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_sep = false;
    for ch in path.chars() {
        let ch = if ch == '\\' { '/' } else { ch };
        if ch == '/' {
            if last_was_sep {
                continue;
            }
            last_was_sep = true;
        } else {
            last_was_sep = false;
        }
        out.extend(ch.to_lowercase());
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Identifies the processes belonging to one managed program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    /// Executable file name, compared exactly.
    pub name: String,
    /// When set, the executable path must contain this directory.
    pub install_dir: Option<PathBuf>,
}

impl ProcessIdentity {
    pub fn new(name: impl Into<String>, install_dir: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            install_dir,
        }
    }

    /// Identity of an executable: its file name, scoped to its directory.
    pub fn for_executable(exe: &Path) -> Option<Self> {
        let name = exe.file_name()?.to_string_lossy().into_owned();
        Some(Self {
            name,
            install_dir: exe.parent().map(Path::to_path_buf),
        })
    }

    /// True when `exe_path` lies under the install dir (or no dir is set).
    pub fn path_matches(&self, exe_path: Option<&Path>) -> bool {
        let Some(dir) = &self.install_dir else {
            return true;
        };
        let dir = normalize_path(&dir.to_string_lossy());
        if dir.is_empty() {
            return true;
        }
        match exe_path {
            Some(exe) => normalize_path(&exe.to_string_lossy()).contains(&dir),
            None => false,
        }
    }

    pub fn matches(&self, record: &ProcessRecord) -> bool {
        record.name == self.name && self.path_matches(record.exe_path.as_deref())
    }
}
