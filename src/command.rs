//! External command templates.
//!
//! Commands are written as a single shell-like string (`"shopify theme dev --store {store}"`),
//! split with `shell-words`, and rendered per store by substituting placeholders:
//! `{store}` (storefront URL), `{name}`, `{port}`, `{path}`, and `{git_url}`.

use std::path::Path;

use crate::error::SupervisorError;
use crate::store::{DownloadMethod, StoreRef};

pub const DEFAULT_DEV_COMMAND: &str = "shopify theme dev --store {store} --port {port}";
pub const DEFAULT_PULL_COMMAND: &str = "shopify theme pull --store {store} --path .";
pub const DEFAULT_PUSH_COMMAND: &str = "shopify theme push --store {store}";
pub const DEFAULT_CLONE_COMMAND: &str = "git clone {git_url} .";

/// A program plus argument templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

/// Values substituted into a template.
#[derive(Debug, Clone, Copy, Default)]
pub struct Placeholders<'a> {
    pub store: Option<&'a StoreRef>,
    pub port: Option<u16>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parses a shell-like command line.
    pub fn parse(raw: &str) -> Result<Self, SupervisorError> {
        let mut parts = shell_words::split(raw)
            .map_err(|err| SupervisorError::Command(format!("{}: {}", raw, err)))?;
        if parts.is_empty() {
            return Err(SupervisorError::Command("command is empty".to_string()));
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }

    /// The dev-server command used when nothing is configured.
    pub fn default_dev() -> Self {
        Self::new(
            "shopify",
            ["theme", "dev", "--store", "{store}", "--port", "{port}"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    /// Renders the arguments with the given placeholder values.
    pub fn render_args(&self, values: Placeholders<'_>) -> Vec<String> {
        self.args.iter().map(|arg| substitute(arg, values)).collect()
    }

    /// Builds a ready-to-spawn command. The working directory is left to the caller.
    pub fn to_command(&self, values: Placeholders<'_>) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(substitute(&self.program, values));
        command.args(self.render_args(values));
        command
    }

    /// Human-readable rendering, for logs and status messages.
    pub fn display(&self, values: Placeholders<'_>) -> String {
        let mut parts = vec![substitute(&self.program, values)];
        parts.extend(self.render_args(values));
        shell_words::join(parts)
    }
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self::default_dev()
    }
}

fn substitute(template: &str, values: Placeholders<'_>) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    let mut out = template.to_string();
    if let Some(store) = values.store {
        out = out.replace("{store}", &store.url).replace("{name}", &store.name);
        if let Some(path) = store.path.as_deref() {
            out = out.replace("{path}", &path_str(path));
        }
        if let DownloadMethod::Clone { git_url } = &store.method {
            out = out.replace("{git_url}", git_url);
        }
    }
    if let Some(port) = values.port {
        out = out.replace("{port}", &port.to_string());
    }
    out
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_arguments() {
        let template = CommandTemplate::parse("sh -c 'echo ready on {port}'").unwrap();
        assert_eq!(template.program, "sh");
        let args = template.render_args(Placeholders {
            store: None,
            port: Some(9300),
        });
        assert_eq!(args, vec!["-c", "echo ready on 9300"]);
    }

    #[test]
    fn default_dev_matches_documented_string() {
        assert_eq!(
            CommandTemplate::parse(DEFAULT_DEV_COMMAND).unwrap(),
            CommandTemplate::default_dev()
        );
    }

    #[test]
    fn renders_store_values() {
        let store = StoreRef::new(
            "Shop A",
            "shop-a.myshopify.com",
            DownloadMethod::Clone {
                git_url: "git@github.com:me/theme.git".into(),
            },
        );
        let values = Placeholders {
            store: Some(&store),
            port: Some(9292),
        };
        let dev = CommandTemplate::default_dev();
        assert_eq!(
            dev.render_args(values),
            vec!["theme", "dev", "--store", "shop-a.myshopify.com", "--port", "9292"]
        );
        let clone = CommandTemplate::parse(DEFAULT_CLONE_COMMAND).unwrap();
        assert_eq!(
            clone.render_args(values),
            vec!["clone", "git@github.com:me/theme.git", "."]
        );
    }

    #[test]
    fn rejects_empty_and_unbalanced() {
        assert!(CommandTemplate::parse("   ").is_err());
        assert!(CommandTemplate::parse("sh -c 'oops").is_err());
    }
}
