//! Selector and id renaming maps

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Rewrites style selectors; a miss leaves the selector unchanged
pub trait CssRenamingMap: Send + Sync {
    fn get(&self, selector: &str) -> Option<String>;
}

/// Rewrites element ids; a miss leaves the id unchanged
pub trait IdRenamingMap: Send + Sync {
    fn get(&self, id: &str) -> Option<String>;
}

/// Errors that can occur when loading or parsing renaming maps
#[derive(Error, Debug)]
pub enum RenamingMapError {
    #[error("failed to read renaming map: {0}")]
    IoError(#[from] std::io::Error),
    #[error("failed to parse renaming map TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// A table-backed renaming map usable for selectors and ids
#[derive(Debug, Clone, Default)]
pub struct RenamingMap {
    pub name: Option<String>,
    entries: HashMap<String, String>,
}

#[derive(Deserialize)]
struct TomlRenamingMap {
    metadata: Option<TomlMetadata>,
    #[serde(default)]
    map: HashMap<String, String>,
}

#[derive(Deserialize)]
struct TomlMetadata {
    name: Option<String>,
}

impl RenamingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a renaming map from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, RenamingMapError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a renaming map from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, RenamingMapError> {
        let parsed: TomlRenamingMap = toml::from_str(content)?;
        Ok(Self {
            name: parsed.metadata.and_then(|m| m.name),
            entries: parsed.map,
        })
    }

    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.entries.insert(from.into(), to.into());
        self
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CssRenamingMap for RenamingMap {
    fn get(&self, selector: &str) -> Option<String> {
        self.lookup(selector).map(str::to_string)
    }
}

impl IdRenamingMap for RenamingMap {
    fn get(&self, id: &str) -> Option<String> {
        self.lookup(id).map(str::to_string)
    }
}

/// Rename a selector, passing unmapped selectors through
pub fn rename_selector(map: Option<&dyn CssRenamingMap>, selector: &str) -> String {
    map.and_then(|m| m.get(selector))
        .unwrap_or_else(|| selector.to_string())
}

/// Rename an id, passing unmapped ids through
pub fn rename_id(map: Option<&dyn IdRenamingMap>, id: &str) -> String {
    map.and_then(|m| m.get(id)).unwrap_or_else(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_passes_misses_through() {
        let map = RenamingMap::new().with("header", "a");
        assert_eq!(rename_selector(Some(&map), "header"), "a");
        assert_eq!(rename_selector(Some(&map), "footer"), "footer");
        assert_eq!(rename_selector(None, "header"), "header");
    }

    #[test]
    fn test_rename_id() {
        let map = RenamingMap::new().with("main", "m1");
        assert_eq!(rename_id(Some(&map), "main"), "m1");
        assert_eq!(rename_id(Some(&map), "side"), "side");
    }

    #[test]
    fn test_from_toml() {
        let map = RenamingMap::from_str(
            r#"
            [metadata]
            name = "compact"

            [map]
            header = "h"
            "#,
        )
        .unwrap();
        assert_eq!(map.name.as_deref(), Some("compact"));
        assert_eq!(map.lookup("header"), Some("h"));
    }
}
