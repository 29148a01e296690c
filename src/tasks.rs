//! One-shot working-copy commands.
//!
//! These run to completion with the terminal inherited and are not tracked by
//! the supervisor: fetching a store's theme (pull or git clone), and pulling or
//! pushing changes in an existing working copy.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::command::{CommandTemplate, Placeholders};
use crate::config::Settings;
use crate::store::{store_dir, DownloadMethod, StoreBook, StoreRef};

/// Materializes a store's working copy and records its path in the store file.
pub async fn fetch(settings: &Settings, book: &mut StoreBook, name: &str) -> Result<PathBuf> {
    let store = book
        .get(name)
        .cloned()
        .with_context(|| format!("no store named '{}'", name))?;
    let dir = store_dir(&settings.themes_dir, &store.name)?;
    let template = match &store.method {
        DownloadMethod::Pull => &settings.pull_command,
        DownloadMethod::Clone { .. } => &settings.clone_command,
    };
    let store = store.with_path(&dir);
    run(template, &store, &dir).await?;
    book.set_path(name, dir.clone())?;
    book.save(&settings.stores_file)?;
    info!(store = %name, path = %dir.display(), "working copy ready");
    Ok(dir)
}

/// Pulls the latest theme files into the store's working copy.
pub async fn pull(settings: &Settings, store: &StoreRef) -> Result<()> {
    let dir = working_copy(store)?;
    run(&settings.pull_command, store, dir).await
}

/// Pushes the store's working copy to the storefront.
pub async fn push(settings: &Settings, store: &StoreRef) -> Result<()> {
    let dir = working_copy(store)?;
    run(&settings.push_command, store, dir).await
}

fn working_copy(store: &StoreRef) -> Result<&Path> {
    match store.path.as_deref() {
        Some(path) if path.is_dir() => Ok(path),
        Some(path) => bail!(
            "working copy for '{}' is missing at {}",
            store.name,
            path.display()
        ),
        None => bail!(
            "'{}' has no working copy yet (run `themerack fetch \"{}\"`)",
            store.name,
            store.name
        ),
    }
}

async fn run(template: &CommandTemplate, store: &StoreRef, dir: &Path) -> Result<()> {
    let values = Placeholders {
        store: Some(store),
        port: None,
    };
    let rendered = template.display(values);
    info!(store = %store.name, command = %rendered, "running");
    let status = template
        .to_command(values)
        .current_dir(dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("failed to run {}", rendered))?;
    if !status.success() {
        match status.code() {
            Some(code) => bail!("{} exited with code {}", rendered, code),
            None => bail!("{} was terminated by a signal", rendered),
        }
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{Config, Overrides};

    fn settings(root: &Path, pull: &str) -> Settings {
        let config = Config {
            pull_command: Some(pull.to_string()),
            clone_command: Some("sh -c 'echo {git_url} > origin.txt'".to_string()),
            stores_file: Some(root.join("stores.json")),
            themes_dir: Some(root.join("themes")),
            ..Config::default()
        };
        Settings::resolve(config, Overrides::default()).unwrap()
    }

    #[tokio::test]
    async fn fetch_records_working_copy() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path(), "sh -c 'echo {store} > store.txt'");
        let mut book = StoreBook::default();
        book.add(StoreRef::new("Shop A", "shop-a.myshopify.com", DownloadMethod::Pull))
            .unwrap();

        let dir = fetch(&settings, &mut book, "Shop A").await.unwrap();
        let written = std::fs::read_to_string(dir.join("store.txt")).unwrap();
        assert_eq!(written.trim(), "shop-a.myshopify.com");

        let saved = StoreBook::load(&settings.stores_file).unwrap();
        assert_eq!(saved.get("Shop A").and_then(|s| s.path.clone()), Some(dir));
    }

    #[tokio::test]
    async fn fetch_uses_clone_for_git_stores() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path(), "false");
        let mut book = StoreBook::default();
        book.add(StoreRef::new(
            "Shop B",
            "shop-b.myshopify.com",
            DownloadMethod::Clone {
                git_url: "https://example.com/theme.git".into(),
            },
        ))
        .unwrap();
        let dir = fetch(&settings, &mut book, "Shop B").await.unwrap();
        let written = std::fs::read_to_string(dir.join("origin.txt")).unwrap();
        assert_eq!(written.trim(), "https://example.com/theme.git");
    }

    #[tokio::test]
    async fn failed_fetch_leaves_store_untouched() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path(), "sh -c 'exit 3'");
        let mut book = StoreBook::default();
        book.add(StoreRef::new("Shop A", "shop-a.myshopify.com", DownloadMethod::Pull))
            .unwrap();
        let err = fetch(&settings, &mut book, "Shop A").await.unwrap_err();
        assert!(err.to_string().contains("exited with code 3"));
        assert!(book.get("Shop A").unwrap().path.is_none());
    }

    #[tokio::test]
    async fn pull_requires_working_copy() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path(), "true");
        let store = StoreRef::new("Shop A", "shop-a.myshopify.com", DownloadMethod::Pull);
        assert!(pull(&settings, &store).await.is_err());
        let store = store.with_path(root.path());
        pull(&settings, &store).await.unwrap();
    }
}
