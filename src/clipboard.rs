use anyhow::{Context, Result};

/// Puts a dev server's URL on the system clipboard.
pub fn copy_url(url: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("clipboard is not available")?;
    clipboard
        .set_text(url.to_owned())
        .with_context(|| format!("failed to copy {}", url))
}
