//! Temporary playlist catalog files

use std::io::Write;
use std::path::Path;

use serde_json::json;
use tempfile::NamedTempFile;

/// A `playlist.json` written to a temp file that is removed on drop
pub struct CatalogFixture {
    file: NamedTempFile,
}

impl CatalogFixture {
    /// Write `(id, name)` pairs as a catalog array
    pub fn with_entries(entries: &[(&str, &str)]) -> std::io::Result<Self> {
        let items: Vec<serde_json::Value> = entries
            .iter()
            .map(|(id, name)| json!({"id": id, "name": name}))
            .collect();
        Self::with_raw(&serde_json::to_string_pretty(&items)?)
    }

    /// Write arbitrary file contents, e.g. to exercise parse failures
    pub fn with_raw(contents: &str) -> std::io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(Self { file })
    }

    /// A small catalog of mood playlists
    pub fn sample() -> std::io::Result<Self> {
        Self::with_entries(&[
            ("PLchill001", "chill lofi beats to study"),
            ("PLgym0002", "high energy gym workout"),
            ("PLjazz003", "late night jazz piano"),
            ("PLrain004", "rainy day acoustic"),
        ])
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
