use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::StoreError;
use crate::store::OutputStore;

/// A logical filename and the absolute path it resolves to.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file: String,
    pub path: PathBuf,
    pub exists: bool,
}

/// Files referenced by a report, keyed by logical name. Two references to
/// the same logical name collapse into one entry.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ArtifactManifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl ArtifactManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from names as an agent wrote them.
    pub fn from_names<I, S>(store: &OutputStore, names: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut manifest = Self::new();
        for name in names {
            manifest.record(store, name.as_ref())?;
        }
        Ok(manifest)
    }

    pub fn record(&mut self, store: &OutputStore, name: &str) -> Result<&ManifestEntry, StoreError> {
        let logical = store.logical_name(name)?.to_string_lossy().into_owned();
        let path = store.locate(name)?;
        let exists = path.is_file();
        let entry = self
            .entries
            .entry(logical.clone())
            .or_insert_with(|| ManifestEntry {
                file: logical,
                path,
                exists,
            });
        Ok(entry)
    }

    pub fn get(&self, file: &str) -> Option<&ManifestEntry> {
        self.entries.get(file)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Logical names whose files are not on disk.
    pub fn missing(&self) -> Vec<&str> {
        self.entries
            .values()
            .filter(|e| !e.exists)
            .map(|e| e.file.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_logical_name_same_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs"));
        store.ensure_dir().unwrap();
        std::fs::write(store.root().join("chart.png"), b"png").unwrap();

        let manifest = ArtifactManifest::from_names(
            &store,
            ["chart.png", "outputs/chart.png", "./chart.png", "table.csv"],
        )
        .unwrap();

        assert_eq!(manifest.len(), 2);
        let chart = manifest.get("chart.png").unwrap();
        assert_eq!(chart.path, store.root().join("chart.png"));
        assert!(chart.exists);
        assert_eq!(manifest.missing(), vec!["table.csv"]);
    }

    #[test]
    fn rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs"));
        let result = ArtifactManifest::from_names(&store, ["../../etc/passwd"]);
        assert!(result.is_err());
    }
}
