//! Class Name Table
//!
//! The ordered list of class names, where the position of a name is its
//! class index. It is produced once from the training directory and persisted
//! as plain text, one name per line, so inference reproduces the exact order.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::error::{ClassifierError, Result};

/// Ordered class names; index = class index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNameTable {
    names: Vec<String>,
}

impl ClassNameTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the class name for a given index
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Get the index for a given class name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Write the table, one name per line in index order
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(bad) = self.names.iter().find(|n| n.contains('\n') || n.contains('\r')) {
            return Err(ClassifierError::Dataset(format!(
                "class name {:?} cannot be stored one per line",
                bad
            )));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut contents = String::new();
        for name in &self.names {
            contents.push_str(name);
            contents.push('\n');
        }
        fs::write(path, contents)?;

        info!("Saved {} class names to {:?}", self.names.len(), path);
        Ok(())
    }

    /// Read a table written by [`ClassNameTable::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        // Lines are names verbatim; only the terminator is removed
        let names: Vec<String> = contents.lines().map(str::to_string).collect();

        debug!("Loaded {} class names from {:?}", names.len(), path);
        Ok(Self { names })
    }

    /// Load the table if the file exists
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl From<Vec<String>> for ClassNameTable {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table(names: &[&str]) -> ClassNameTable {
        ClassNameTable::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model/class_names.txt");

        let original = table(&["bird", "cat", "dog", "pole with spaces", "zebra"]);
        original.save(&path).unwrap();

        let loaded = ClassNameTable::load(&path).unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.name(3), Some("pole with spaces"));
    }

    #[test]
    fn test_file_format_is_one_name_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("class_names.txt");

        table(&["a", "b"]).save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_load_tolerates_crlf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("class_names.txt");
        fs::write(&path, "cat\r\ndog\r\n").unwrap();

        let loaded = ClassNameTable::load(&path).unwrap();
        assert_eq!(loaded, table(&["cat", "dog"]));
    }

    #[test]
    fn test_round_trip_keeps_whitespace_edged_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("class_names.txt");

        let original = table(&[" ", "cat ", "dog"]);
        original.save(&path).unwrap();

        let loaded = ClassNameTable::load(&path).unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.index_of("cat "), Some(1));
    }

    #[test]
    fn test_load_optional_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded = ClassNameTable::load_optional(dir.path().join("absent.txt")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_index_lookup() {
        let names = table(&["bird", "cat", "dog"]);
        assert_eq!(names.index_of("cat"), Some(1));
        assert_eq!(names.index_of("fish"), None);
        assert_eq!(names.name(5), None);
    }

    #[test]
    fn test_save_rejects_multiline_names() {
        let dir = TempDir::new().unwrap();
        let result = table(&["ok", "bad\nname"]).save(dir.path().join("names.txt"));
        assert!(matches!(result, Err(ClassifierError::Dataset(_))));
    }
}
