//! Registered stores and their on-disk list.
//!
//! The store list is a small JSON file (`stores.json`) holding every store the
//! user registered, how its theme was obtained, and where its working copy lives.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// How a store's theme files are obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadMethod {
    /// Pull the published theme from the storefront.
    Pull,
    /// Clone the theme from a git repository.
    Clone { git_url: String },
}

impl DownloadMethod {
    pub fn label(&self) -> &'static str {
        match self {
            DownloadMethod::Pull => "pull",
            DownloadMethod::Clone { .. } => "git",
        }
    }
}

/// A registered store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRef {
    /// Display name, unique within the store list.
    pub name: String,
    /// Storefront domain (e.g. `my-shop.myshopify.com`).
    pub url: String,
    /// Local working copy, once materialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub method: DownloadMethod,
}

impl StoreRef {
    pub fn new(name: impl Into<String>, url: impl Into<String>, method: DownloadMethod) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            path: None,
            method,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// The persisted list of stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreBook {
    pub stores: Vec<StoreRef>,
}

impl StoreBook {
    /// Loads the store list, returning an empty one if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read store file {}", path.display()))
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse store file {}", path.display()))
    }

    /// Writes the store list as pretty JSON, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("failed to encode store list")?;
        fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn get(&self, name: &str) -> Option<&StoreRef> {
        self.stores.iter().find(|store| store.name == name)
    }

    pub fn add(&mut self, store: StoreRef) -> Result<()> {
        if store.name.trim().is_empty() {
            bail!("store name cannot be empty");
        }
        if store.url.trim().is_empty() {
            bail!("store url cannot be empty");
        }
        if self.get(&store.name).is_some() {
            bail!("a store named '{}' already exists", store.name);
        }
        self.stores.push(store);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<StoreRef> {
        let Some(idx) = self.stores.iter().position(|store| store.name == name) else {
            bail!("no store named '{}'", name);
        };
        Ok(self.stores.remove(idx))
    }

    /// Records where a store's working copy was materialized.
    pub fn set_path(&mut self, name: &str, path: PathBuf) -> Result<()> {
        let Some(store) = self.stores.iter_mut().find(|store| store.name == name) else {
            bail!("no store named '{}'", name);
        };
        store.path = Some(path);
        Ok(())
    }
}

/// Creates (if needed) and returns the working-copy directory for a store.
pub fn store_dir(themes_dir: &Path, name: &str) -> Result<PathBuf> {
    let dir = themes_dir.join(dir_name(name));
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

fn dir_name(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if slug.is_empty() {
        "store".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let book = StoreBook::load(&dir.path().join("stores.json")).unwrap();
        assert!(book.stores.is_empty());
    }

    #[test]
    fn save_then_load_preserves_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stores.json");
        let mut book = StoreBook::default();
        book.add(StoreRef::new("Shop A", "shop-a.myshopify.com", DownloadMethod::Pull))
            .unwrap();
        book.add(StoreRef::new(
            "Shop B",
            "shop-b.myshopify.com",
            DownloadMethod::Clone {
                git_url: "git@github.com:me/theme.git".into(),
            },
        ))
        .unwrap();
        book.set_path("Shop A", PathBuf::from("/tmp/shop-a")).unwrap();
        book.save(&path).unwrap();

        let loaded = StoreBook::load(&path).unwrap();
        assert_eq!(loaded, book);
        assert_eq!(
            loaded.get("Shop A").and_then(|s| s.path.clone()),
            Some(PathBuf::from("/tmp/shop-a"))
        );
    }

    #[test]
    fn add_rejects_duplicates_and_blanks() {
        let mut book = StoreBook::default();
        book.add(StoreRef::new("Shop", "shop.myshopify.com", DownloadMethod::Pull))
            .unwrap();
        assert!(book
            .add(StoreRef::new("Shop", "other.myshopify.com", DownloadMethod::Pull))
            .is_err());
        assert!(book
            .add(StoreRef::new("  ", "x.myshopify.com", DownloadMethod::Pull))
            .is_err());
        assert!(book.add(StoreRef::new("Other", "", DownloadMethod::Pull)).is_err());
        assert_eq!(book.stores.len(), 1);
    }

    #[test]
    fn remove_unknown_store_fails() {
        let mut book = StoreBook::default();
        assert!(book.remove("nope").is_err());
    }

    #[test]
    fn store_dir_is_filesystem_safe() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_dir(dir.path(), "My Shop / EU").unwrap();
        assert!(path.is_dir());
        assert_eq!(path.file_name().unwrap(), "my-shop---eu");
    }
}
