//! On-disk layout: `<root>/config.json` and `<root>/logs/client.jsonl`.

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Overrides the default root when `--base-dir` is not given.
pub const HOME_ENV: &str = "FEEDKIT_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Root from `explicit`, else `$FEEDKIT_HOME`, else `~/.feedkit`.
    pub fn resolve(explicit: Option<PathBuf>) -> CoreResult<Self> {
        if let Some(root) = explicit {
            return Ok(Self::at(root));
        }
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::at(PathBuf::from(root)));
        }
        dirs::home_dir()
            .map(|home| Self::at(home.join(".feedkit")))
            .ok_or_else(|| CoreError::Path("no home directory to place ~/.feedkit in".into()))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("client.jsonl")
    }

    /// Create the root and log directories.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.logs_dir()).map_err(|e| {
            CoreError::Path(format!("cannot create {}: {}", self.logs_dir().display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_root() {
        let paths = Paths::at("/srv/feedkit");
        assert_eq!(paths.root(), Path::new("/srv/feedkit"));
        assert_eq!(paths.config_file(), PathBuf::from("/srv/feedkit/config.json"));
        assert_eq!(paths.log_file(), PathBuf::from("/srv/feedkit/logs/client.jsonl"));
    }

    #[test]
    fn test_explicit_root_wins() {
        let paths = Paths::resolve(Some(PathBuf::from("/opt/fk"))).unwrap();
        assert_eq!(paths, Paths::at("/opt/fk"));
    }

    #[test]
    fn test_ensure_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::at(tmp.path().join("a").join("b"));
        assert!(!paths.logs_dir().exists());

        paths.ensure_dirs().unwrap();
        assert!(paths.logs_dir().is_dir());
        // Idempotent.
        paths.ensure_dirs().unwrap();
    }
}
