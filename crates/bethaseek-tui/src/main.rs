use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use bethaseek_core::{
    send, ApiClient, Config, FileStore, KeyValueStore, MemoryStore, SessionStore,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

mod app;
mod handler;
mod render;
mod tui;
mod ui;

use app::App;

#[derive(Parser)]
#[command(name = "bethaseek")]
#[command(about = "Terminal chat client for the BethaSeek generation backend")]
struct Cli {
    /// Backend base URL (overrides config and BETHASEEK_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Directory for chat history and logs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep history in memory only
    #[arg(long)]
    ephemeral: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question in the active conversation and print the reply
    Ask {
        /// Your question
        question: String,
        /// Start a new conversation for this question
        #[arg(short, long)]
        new: bool,
    },
    /// Check whether the backend is reachable
    Health,
    /// Store backend settings in the user config file
    Config {
        /// Backend base URL
        #[arg(long)]
        api_url: Option<String>,
        /// Number of documents the backend retrieves per query
        #[arg(long)]
        top_k: Option<u32>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {e:#}");
        Config::new()
    });
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = Some(dir);
    }
    let data_dir = config.resolved_data_dir()?;

    // CLI beats the environment, which beats the config file
    let api_url = cli.api_url.clone().unwrap_or_else(|| config.resolved_api_url());
    let api = ApiClient::with_timeout(&api_url, config.request_timeout())
        .context("building HTTP client")?
        .top_k(config.resolved_top_k());

    match cli.command {
        Some(Commands::Ask { question, new }) => {
            init_stderr_logging(cli.verbose);
            let mut store = open_store(&data_dir, cli.ephemeral);
            ask(&mut store, &api, &question, new).await
        }
        Some(Commands::Health) => {
            init_stderr_logging(cli.verbose);
            health(&api).await
        }
        Some(Commands::Config { api_url, top_k, timeout }) => {
            config.api_url = api_url.or(config.api_url);
            config.top_k = top_k.or(config.top_k);
            config.request_timeout_secs = timeout.or(config.request_timeout_secs);
            config.save()?;
            println!("{config:#?}");
            Ok(())
        }
        None => {
            init_file_logging(&data_dir, cli.verbose)?;
            let store = open_store(&data_dir, cli.ephemeral);
            run_tui(store, api).await
        }
    }
}

fn open_store(data_dir: &Path, ephemeral: bool) -> SessionStore {
    let backend: Box<dyn KeyValueStore> = if ephemeral {
        Box::new(MemoryStore::new())
    } else {
        Box::new(FileStore::new(data_dir))
    };
    SessionStore::load(backend)
}

async fn ask(store: &mut SessionStore, api: &ApiClient, question: &str, new: bool) -> Result<()> {
    let id = if new {
        store.create_conversation()
    } else {
        store
            .collection()
            .active_id()
            .cloned()
            .context("no active conversation")?
    };

    send(store, api, &id, question).await?;

    if let Some(reply) = store
        .collection()
        .get(&id)
        .and_then(|c| c.last_assistant_message())
    {
        println!("{}", reply.content);
    }
    Ok(())
}

async fn health(api: &ApiClient) -> Result<()> {
    if api.health_check().await {
        println!("{} is up", api.base_url());
        Ok(())
    } else {
        anyhow::bail!("{} is not reachable", api.base_url())
    }
}

async fn run_tui(store: SessionStore, api: ApiClient) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let mut app = App::new(store, api, events.sender());
    app.spawn_health_check();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

fn log_filter(verbosity: u8, default_level: &str) -> EnvFilter {
    let level = match verbosity {
        0 => default_level,
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_stderr_logging(verbosity: u8) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(log_filter(verbosity, "warn"))
        .init();
}

/// The TUI owns the terminal, so logs go to a file in the data directory.
fn init_file_logging(data_dir: &Path, verbosity: u8) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let log_path = data_dir.join("bethaseek.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(log_filter(verbosity, "info"))
        .init();
    Ok(())
}
