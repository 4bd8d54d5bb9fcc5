use std::path::{Component, Path, PathBuf};

use fira_models::config::OutputConfig;
use tracing::debug;

use crate::error::StoreError;

/// The one shared output directory every adapter reads from and writes to.
///
/// Relative names are anchored under `root`. A name whose first segment is
/// the store's own root segment (e.g. `outputs/chart.png`) has that segment
/// stripped first, so the root folder never nests inside itself. Absolute
/// paths pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputStore {
    root: PathBuf,
    root_segment: String,
}

impl OutputStore {
    /// Create a store rooted at `root`. The root segment defaults to the
    /// directory's own name.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root_segment = root
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "outputs".to_string());
        Self { root, root_segment }
    }

    pub fn with_root_segment(mut self, segment: impl Into<String>) -> Self {
        self.root_segment = segment.into();
        self
    }

    /// Build a store from configuration, anchoring a relative `dir` at the
    /// current working directory, and create the directory.
    pub fn from_config(config: &OutputConfig) -> Result<Self, StoreError> {
        let dir = PathBuf::from(&config.dir);
        let root = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()?.join(dir)
        };
        let store = Self::new(root).with_root_segment(config.root_segment.clone());
        store.ensure_dir()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn root_segment(&self) -> &str {
        &self.root_segment
    }

    /// Create the root directory if missing. Safe to call repeatedly.
    pub fn ensure_dir(&self) -> Result<&Path, StoreError> {
        std::fs::create_dir_all(&self.root)?;
        Ok(&self.root)
    }

    /// The name relative to the root, with `./` and a leading root segment
    /// removed. Absolute paths are returned as-is.
    pub fn logical_name(&self, name: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        let path = name.as_ref();
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }

        let mut rel = PathBuf::new();
        let mut first = true;
        for component in path.components() {
            match component {
                Component::CurDir => continue,
                Component::Normal(seg) => {
                    if first && seg.to_string_lossy() == self.root_segment {
                        first = false;
                        continue;
                    }
                    first = false;
                    rel.push(seg);
                }
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::OutsideRoot(path.display().to_string()));
                }
            }
        }
        Ok(rel)
    }

    /// Absolute path for `name` without touching the filesystem.
    pub fn locate(&self, name: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        let rel = self.logical_name(name)?;
        if rel.is_absolute() {
            return Ok(rel);
        }
        Ok(self.root.join(rel))
    }

    /// Absolute path for `name`, creating its parent directories.
    pub fn resolve(&self, name: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        let path = self.locate(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Absolute path for `name` when the file already exists.
    pub fn resolve_existing(&self, name: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        let name = name.as_ref();
        let path = self.locate(name)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(StoreError::NotFound(name.display().to_string()))
        }
    }

    /// Names of the regular files directly under the root, sorted,
    /// optionally filtered by extension (`"csv"` or `".csv"`).
    pub fn list(&self, extension: Option<&str>) -> Result<Vec<String>, StoreError> {
        self.ensure_dir()?;
        let wanted = extension
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty());

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(ext) = &wanted {
                let matches = path
                    .extension()
                    .map(|e| e.to_string_lossy().to_ascii_lowercase() == *ext)
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
        files.sort();
        debug!(count = files.len(), extension = ?wanted, "Listed output files");
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, OutputStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs"));
        store.ensure_dir().unwrap();
        (dir, store)
    }

    #[test]
    fn resolves_under_root() {
        let (_dir, store) = temp_store();
        let path = store.resolve("report.md").unwrap();
        assert_eq!(path, store.root().join("report.md"));
    }

    #[test]
    fn strips_redundant_root_segment() {
        let (_dir, store) = temp_store();
        let plain = store.resolve("chart.png").unwrap();
        let prefixed = store.resolve("outputs/chart.png").unwrap();
        assert_eq!(plain, prefixed);
        assert!(!prefixed.to_string_lossy().contains("outputs/outputs"));
    }

    #[test]
    fn root_stripping_is_idempotent() {
        let (_dir, store) = temp_store();
        for name in ["a.csv", "sub/b.csv", "./c.md"] {
            let once = store.resolve(name).unwrap();
            let twice = store.resolve(&once).unwrap();
            let prefixed = store.resolve(format!("outputs/{name}")).unwrap();
            assert_eq!(once, twice, "{name}");
            assert_eq!(once, prefixed, "{name}");
        }
    }

    #[test]
    fn only_leading_segment_is_stripped() {
        let (_dir, store) = temp_store();
        let path = store.resolve("runs/outputs/x.csv").unwrap();
        assert_eq!(path, store.root().join("runs/outputs/x.csv"));
    }

    #[test]
    fn absolute_paths_pass_through() {
        let (_dir, store) = temp_store();
        let abs = PathBuf::from("/var/tmp/elsewhere.csv");
        assert_eq!(store.locate(&abs).unwrap(), abs);
    }

    #[test]
    fn parent_components_are_rejected() {
        let (_dir, store) = temp_store();
        let result = store.resolve("../secrets.txt");
        assert!(matches!(result, Err(StoreError::OutsideRoot(_))));
    }

    #[test]
    fn resolve_creates_parents() {
        let (_dir, store) = temp_store();
        let path = store.resolve("nested/deeper/file.csv").unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let (_dir, store) = temp_store();
        std::fs::write(store.root().join("keep.md"), "x").unwrap();
        store.ensure_dir().unwrap();
        store.ensure_dir().unwrap();
        assert_eq!(store.list(None).unwrap(), vec!["keep.md"]);
    }

    #[test]
    fn list_filters_by_extension() {
        let (_dir, store) = temp_store();
        for name in ["b.csv", "a.CSV", "report.md", "chart.png"] {
            std::fs::write(store.root().join(name), "x").unwrap();
        }
        std::fs::create_dir(store.root().join("dir.csv")).unwrap();

        assert_eq!(store.list(Some("csv")).unwrap(), vec!["a.CSV", "b.csv"]);
        assert_eq!(store.list(Some(".md")).unwrap(), vec!["report.md"]);
        assert_eq!(store.list(None).unwrap().len(), 4);
    }

    #[test]
    fn resolve_existing_reports_missing() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.resolve_existing("nope.csv"),
            Err(StoreError::NotFound(_))
        ));
        std::fs::write(store.root().join("yes.csv"), "x").unwrap();
        assert!(store.resolve_existing("outputs/yes.csv").is_ok());
    }

    #[test]
    fn from_config_uses_configured_segment() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig {
            dir: dir.path().join("artifacts").display().to_string(),
            root_segment: "artifacts".to_string(),
        };
        let store = OutputStore::from_config(&config).unwrap();
        assert!(store.root().is_dir());
        assert_eq!(
            store.locate("artifacts/x.md").unwrap(),
            store.root().join("x.md")
        );
    }
}
