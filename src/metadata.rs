use std::path::Path;

use crate::{
    chunking::Chunk,
    error::{Error, Result},
};

/// Provenance and text for every indexed vector, in index order.
///
/// Entry `i` describes the vector stored at position `i` of the
/// [`FlatIndex`](crate::vector_index::FlatIndex). Persisted as a
/// pretty-printed JSON array of `{"source", "text"}` records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    entries: Vec<Chunk>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Chunk) {
        self.entries.push(chunk);
    }

    pub fn get(&self, position: usize) -> Option<&Chunk> {
        self.entries.get(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a store written by [`MetadataStore::save`]. Unreadable files,
    /// invalid UTF-8 and malformed JSON are all `CorruptSnapshot`.
    pub fn load(path: &Path) -> Result<Self> {
        let corrupt = |reason: String| Error::CorruptSnapshot {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = std::fs::read(path)
            .map_err(|e| corrupt(format!("cannot read metadata: {e}")))?;
        let entries: Vec<Chunk> = serde_json::from_slice(&bytes)
            .map_err(|e| corrupt(e.to_string()))?;
        Ok(Self { entries })
    }
}

impl FromIterator<Chunk> for MetadataStore {
    fn from_iter<I: IntoIterator<Item = Chunk>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_preserve_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metadata.json");

        let store: MetadataStore = [
            Chunk::new("b.md", "second file"),
            Chunk::new("a.md", "first file"),
            Chunk::new("b.md", "second file, more"),
        ]
        .into_iter()
        .collect();
        store.save(&path).unwrap();

        let loaded = MetadataStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.get(1).unwrap().source, "a.md");
        assert!(loaded.get(3).is_none());
    }

    #[test]
    fn saved_file_is_an_array_of_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metadata.json");

        let mut store = MetadataStore::new();
        store.push(Chunk::new("devices.csv", "devices: Studio 7 → Basement"));
        store.save(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap())
                .unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"source": "devices.csv", "text": "devices: Studio 7 → Basement"}
            ])
        );
    }

    #[test]
    fn malformed_json_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metadata.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();

        let err = MetadataStore::load(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptSnapshot { .. }));
    }

    #[test]
    fn invalid_utf8_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metadata.json");
        std::fs::write(&path, [b'[', b'"', 0xff, 0xfe, b'"', b']']).unwrap();

        let err = MetadataStore::load(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptSnapshot { .. }));
    }

    #[test]
    fn unreadable_file_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metadata.json");
        std::fs::create_dir(&path).unwrap();

        match MetadataStore::load(&path).unwrap_err() {
            Error::CorruptSnapshot { path: reported, .. } => {
                assert_eq!(reported, path)
            }
            other => panic!("expected CorruptSnapshot, got {other:?}"),
        }
    }
}
