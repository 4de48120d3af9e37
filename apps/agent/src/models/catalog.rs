//! Playlist catalog loaded from a JSON file at startup

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named playlist with a stable identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CatalogError {
    /// Whether the catalog file does not exist
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Read a `[{"id": ..., "name": ...}]` catalog file
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogItem>, CatalogError> {
    let display = path.display().to_string();

    let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: display.clone(),
        source,
    })?;

    serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
        path: display,
        source,
    })
}
