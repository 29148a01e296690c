//! themerack: run and juggle storefront theme dev servers from one terminal.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! loads configuration and the store list, and either runs a one-shot store
//! command or opens the dev-server view, whose event loop drives the supervisor.

mod app;
mod clipboard;
mod command;
mod config;
mod error;
mod events;
mod output;
mod ports;
mod process;
mod store;
mod supervisor;
mod tasks;
mod tui;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::{App, AppAction};
use crate::config::{Config, Overrides, Settings};
use crate::error::SupervisorError;
use crate::events::Event;
use crate::store::{DownloadMethod, StoreBook, StoreRef};
use crate::supervisor::Supervisor;

const LOG_ENV: &str = "THEMERACK_LOG";

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "themerack",
    version,
    about = "Run storefront theme dev servers side by side",
    styles = help_styles(),
    color = clap::ColorChoice::Always,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to themerack.toml configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ignore the themerack.toml in the config directory.
    #[arg(long, global = true)]
    no_config: bool,
    /// Path to the store list (stores.json).
    #[arg(long, global = true)]
    stores_file: Option<PathBuf>,
    /// First port handed out to a dev server.
    #[arg(long, global = true)]
    base_port: Option<u16>,
    /// Max log lines kept per dev server.
    #[arg(long, global = true)]
    max_lines: Option<usize>,
    /// Time to wait after a stop signal before force-killing (ms, 0 kills only on quit).
    #[arg(long, global = true)]
    stop_grace_ms: Option<u64>,
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open the dev-server view, optionally starting servers for the named stores.
    Dev {
        /// Stores to start right away.
        stores: Vec<String>,
    },
    /// Manage registered stores.
    Stores {
        #[command(subcommand)]
        command: StoreCommands,
    },
    /// Download a store's theme into its working copy.
    Fetch { name: String },
    /// Pull the latest theme files into a store's working copy.
    Pull { name: String },
    /// Push a store's working copy to the storefront.
    Push { name: String },
    /// Show version information.
    Version,
}

#[derive(Debug, Subcommand)]
enum StoreCommands {
    /// List registered stores.
    List,
    /// Register a store.
    Add {
        /// Display name.
        name: String,
        /// Storefront domain (e.g. my-shop.myshopify.com).
        url: String,
        /// Clone the theme from this git repository instead of pulling it.
        #[arg(long)]
        git: Option<String>,
    },
    /// Forget a store (its working copy is left on disk).
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let command = cli.command.unwrap_or(Commands::Dev { stores: Vec::new() });
    let interactive = matches!(command, Commands::Dev { .. });
    init_tracing(cli.verbose, interactive.then_some(settings.log_file.as_path()))?;

    let mut book = StoreBook::load(&settings.stores_file)?;
    match command {
        Commands::Version => {
            println!("themerack {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Stores { command } => run_store_command(command, &settings, &mut book),
        Commands::Fetch { name } => {
            let dir = tasks::fetch(&settings, &mut book, &name).await?;
            println!("'{}' is ready at {}", name, dir.display());
            Ok(())
        }
        Commands::Pull { name } => tasks::pull(&settings, find_store(&book, &name)?).await,
        Commands::Push { name } => tasks::push(&settings, find_store(&book, &name)?).await,
        Commands::Dev { stores } => run_dev(settings, book, stores).await,
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let config = if cli.no_config {
        Config::default()
    } else {
        match cli.config.clone().or_else(config::default_config_path) {
            Some(path) => config::load_config(&path)?,
            None => Config::default(),
        }
    };
    let overrides = Overrides {
        base_port: cli.base_port,
        max_log_lines: cli.max_lines,
        stop_grace_ms: cli.stop_grace_ms,
        stores_file: cli.stores_file.clone(),
    };
    Settings::resolve(config, overrides)
}

// While the TUI owns the terminal, log records go to a file instead of stderr.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn find_store<'a>(book: &'a StoreBook, name: &str) -> Result<&'a StoreRef> {
    book.get(name)
        .with_context(|| format!("no store named '{}' (see `themerack stores list`)", name))
}

fn run_store_command(command: StoreCommands, settings: &Settings, book: &mut StoreBook) -> Result<()> {
    match command {
        StoreCommands::List => {
            if book.stores.is_empty() {
                println!("No stores registered.");
            }
            for store in &book.stores {
                let path = store
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not fetched)".to_string());
                println!("{}\t{}\t{}\t{}", store.name, store.url, store.method.label(), path);
            }
            Ok(())
        }
        StoreCommands::Add { name, url, git } => {
            let method = match git {
                Some(git_url) => DownloadMethod::Clone { git_url },
                None => DownloadMethod::Pull,
            };
            book.add(StoreRef::new(name.trim(), url.trim(), method))?;
            book.save(&settings.stores_file)?;
            println!("Added '{}'. Run `themerack fetch \"{}\"` to download its theme.", name.trim(), name.trim());
            Ok(())
        }
        StoreCommands::Remove { name } => {
            let removed = book.remove(&name)?;
            book.save(&settings.stores_file)?;
            println!("Removed '{}'.", removed.name);
            Ok(())
        }
    }
}

async fn run_dev(settings: Settings, book: StoreBook, initial: Vec<String>) -> Result<()> {
    for name in &initial {
        if book.get(name).is_none() {
            bail!("no store named '{}' (see `themerack stores list`)", name);
        }
    }

    let supervisor = Supervisor::new(settings.supervisor.clone());
    let mut app = App::new(book.stores);
    for name in initial {
        if supervisor.is_active(&name) {
            continue;
        }
        handle_app_action(AppAction::Start(name.clone()), &mut app, &supervisor).await;
        app.select(&name);
    }

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let mut terminal = tui::init_terminal()?;
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx);

    let mut ticker = tokio::time::interval(settings.tick);
    let mut result = Ok(());
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    Event::Key(key) => {
                        let action = app.handle_key(key);
                        handle_app_action(action, &mut app, &supervisor).await;
                    }
                    Event::Mouse(mouse) => {
                        let action = app.handle_mouse(mouse);
                        handle_app_action(action, &mut app, &supervisor).await;
                    }
                    Event::Resize { width, height } => {
                        debug!(width, height, "terminal resized");
                        let _ = terminal.autoresize();
                    }
                    Event::Shutdown { signal } => {
                        info!(signal, "received signal, shutting down");
                        app.should_quit = true;
                    }
                }
            }
            _ = ticker.tick() => {}
        }

        if app.should_quit {
            let running = supervisor.count_active();
            if running > 0 {
                app.set_status_warning_persistent(format!("stopping {} dev server(s)...", running));
            }
        }
        if let Err(err) = tui::draw(&mut app, &supervisor, &mut terminal) {
            result = Err(err.into());
            break;
        }
        if app.should_quit {
            break;
        }
    }

    supervisor.shutdown().await;
    tui::restore_terminal(terminal)?;
    result
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            let event = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key))
                    if key.kind == crossterm::event::KeyEventKind::Press =>
                {
                    Event::Key(key)
                }
                Ok(crossterm::event::Event::Mouse(mouse)) => Event::Mouse(mouse),
                Ok(crossterm::event::Event::Resize(width, height)) => Event::Resize { width, height },
                _ => continue,
            };
            if tx.blocking_send(event).is_err() {
                break;
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = tx.send(Event::Shutdown { signal: "SIGINT" }).await;
                }
                _ = sigterm.recv() => {
                    let _ = tx.send(Event::Shutdown { signal: "SIGTERM" }).await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            let _ = tx.send(Event::Shutdown { signal: "Ctrl-C" }).await;
        }
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

async fn handle_app_action(action: AppAction, app: &mut App, supervisor: &Supervisor) {
    match action {
        AppAction::Start(name) => {
            let Some(store) = app.stores.iter().find(|store| store.name == name).cloned() else {
                app.set_status_warning(format!("no store named '{}'", name));
                return;
            };
            if store.path.is_none() {
                app.set_status_warning(format!(
                    "'{}' has no working copy; run `themerack fetch \"{}\"` first",
                    name, name
                ));
                return;
            }
            match supervisor.start(&store) {
                Ok(process) => {
                    app.set_status_message(format!("{} running at {}", name, process.url()))
                }
                Err(err @ SupervisorError::AlreadyRunning { .. }) => {
                    app.set_status_message(err.to_string())
                }
                Err(err) => {
                    warn!(store = %name, error = %err, "failed to start dev server");
                    app.set_status_warning(err.to_string());
                }
            }
        }
        AppAction::Stop(name) => match supervisor.stop(&name) {
            Ok(()) => app.set_status_message(format!("stopped {}", name)),
            Err(err) => app.set_status_warning(err.to_string()),
        },
        AppAction::StopAll => {
            let count = supervisor.count_active();
            supervisor.stop_all();
            app.set_status_message(format!("stopped {} dev server(s)", count));
        }
        AppAction::SendInput(name, bytes) => {
            let Some(process) = supervisor.get(&name) else {
                app.set_status_warning(format!("no dev server running for '{}'", name));
                return;
            };
            if let Err(err) = process.send_input(&bytes).await {
                app.set_status_warning(err.to_string());
            }
        }
        AppAction::CopyUrl(name) => {
            let Some(process) = supervisor.get(&name) else {
                app.set_status_warning(format!("no dev server running for '{}'", name));
                return;
            };
            match clipboard::copy_url(process.url()) {
                Ok(()) => app.set_status_message(format!("copied {}", process.url())),
                Err(err) => app.set_status_warning(format!("clipboard failed: {:#}", err)),
            }
        }
        AppAction::Quit | AppAction::None => {}
    }
}
