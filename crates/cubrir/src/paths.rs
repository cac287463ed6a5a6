//! Path utilities: lexical normalisation, content-directory definitions and
//! the route/proxy paths derived from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

fn is_glob_segment(segment: &OsStr) -> bool {
    segment
        .to_string_lossy()
        .contains(['*', '?', '['])
}

/// Lexically normalise a path: drop `.` components and fold `..` into the
/// preceding component. Never touches the filesystem.
///
/// A `..` after a glob segment (`**/..`) is kept, since the glob may stand
/// for any number of directories.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(last)) if !is_glob_segment(last) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Final non-empty segment of a slash-separated path, prefixed with `leader`.
///
/// Trailing separators are ignored, so `"./src/"` and `"./src"` both give
/// `"/src"` with the default leader.
pub fn extract_last_segment(path: &str, leader: &str) -> String {
    let segment = path
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .next_back()
        .unwrap_or_default();
    format!("{leader}{segment}")
}

/// Ensure `raw` starts with `leader`, adding it when missing.
pub fn force_leading_slash(raw: &str, leader: &str) -> String {
    if raw.starts_with(leader) {
        raw.to_string()
    } else {
        format!("{leader}{raw}")
    }
}

/// A unique working directory name under `base`: `<base>/<prefix>-<suffix>`.
pub fn unique_dir_name(base: &Path, prefix: &str, suffix: &str) -> PathBuf {
    base.join(format!("{prefix}-{suffix}"))
}

/// Long-form definition of a directory served to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DirSpec {
    /// Location on disk, relative to the working directory unless absolute
    #[serde(alias = "filePath")]
    pub file_path: String,
    /// Route the directory is served under by the coverage server
    #[serde(default, alias = "routePath", skip_serializing_if = "Option::is_none")]
    pub route_path: Option<String>,
    /// Path the test runner proxies to the coverage server
    #[serde(default, alias = "proxyPath", skip_serializing_if = "Option::is_none")]
    pub proxy_path: Option<String>,
}

/// A content or source directory, in short (`"./src"`) or long form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirDef {
    /// Bare path; routes derive from its last segment
    Short(String),
    /// Explicit file, route and proxy paths
    Long(DirSpec),
}

impl DirDef {
    /// Short-form definition
    pub fn short(path: impl Into<String>) -> Self {
        Self::Short(path.into())
    }

    /// Location on disk as written in the definition
    pub fn file_path(&self) -> &str {
        match self {
            Self::Short(path) => path,
            Self::Long(spec) => &spec.file_path,
        }
    }

    /// Route the coverage server serves this directory under
    pub fn route_path(&self) -> String {
        match self {
            Self::Long(DirSpec {
                route_path: Some(route),
                ..
            }) => force_leading_slash(route, "/"),
            _ => extract_last_segment(self.file_path(), "/"),
        }
    }

    /// Path the test runner proxies to the coverage server
    pub fn proxy_path(&self) -> String {
        match self {
            Self::Long(DirSpec {
                proxy_path: Some(proxy),
                ..
            }) => force_leading_slash(proxy, "/"),
            _ => self.route_path(),
        }
    }

    /// Long-form copy of this definition with a different file path and the
    /// same routing
    pub fn relocated(&self, file_path: impl Into<String>) -> Self {
        Self::Long(DirSpec {
            file_path: file_path.into(),
            route_path: Some(self.route_path()),
            proxy_path: Some(self.proxy_path()),
        })
    }
}

/// Resolves configured paths against a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    cwd: PathBuf,
}

impl PathResolver {
    /// Create a resolver rooted at `cwd`
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    /// Working directory paths resolve against
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Resolve `path` against the working directory and normalise it
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        normalize_path(&self.cwd.join(path))
    }

    /// Resolved on-disk location of a directory definition
    pub fn content_path(&self, def: &DirDef) -> PathBuf {
        self.resolve(def.file_path())
    }

    /// Map each source directory onto its instrumented copy under
    /// `instrumented_root`, keeping the original routing.
    pub fn instrumented_source_dirs(
        &self,
        instrumented_root: &Path,
        source_dirs: &BTreeMap<String, DirDef>,
    ) -> BTreeMap<String, DirDef> {
        source_dirs
            .iter()
            .map(|(key, def)| {
                let target = self.instrumented_path(instrumented_root, def);
                (key.clone(), def.relocated(target.to_string_lossy()))
            })
            .collect()
    }

    /// Where a source directory lands inside `instrumented_root`
    pub fn instrumented_path(&self, instrumented_root: &Path, def: &DirDef) -> PathBuf {
        let segment = extract_last_segment(def.file_path(), "");
        self.resolve(instrumented_root).join(segment)
    }
}
