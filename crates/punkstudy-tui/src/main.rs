use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use punkstudy_core::conversation::ReplyOrdering;
use punkstudy_core::{
    Backend, Config, ConversationStore, GatewayClient, RetryingBackend, UploadWidget,
};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "punkstudy")]
#[command(about = "Upload study notes and ask questions about them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and print the reply
    Ask {
        /// Your question
        question: String,
    },
    /// Upload one document (PDF, DOCX, TXT)
    Upload {
        /// File to upload
        file: PathBuf,
    },
    /// Generate text from a prompt
    Generate {
        /// Prompt text
        prompt: String,
        /// Maximum length of the generated text
        #[arg(short, long)]
        max_length: Option<u32>,
    },
    /// Show or update the saved configuration
    Config {
        /// Backend base URL
        #[arg(long)]
        base_url: Option<String>,
        /// User identifier sent with uploads and queries
        #[arg(long)]
        user_id: Option<String>,
        /// Reply ordering: completion or submission
        #[arg(long, value_parser = parse_ordering)]
        ordering: Option<ReplyOrdering>,
        /// Retries for transient backend failures (0 disables)
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

fn parse_ordering(s: &str) -> Result<ReplyOrdering, String> {
    ReplyOrdering::from_str(s)
        .ok_or_else(|| format!("unknown ordering '{}' (completion|submission)", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|err| {
        eprintln!("{}: {:#}", "Ignoring unreadable config".yellow(), err);
        Config::new()
    });

    match cli.command {
        None => {
            init_file_logging()?;
            run_tui(&config).await
        }
        Some(command) => {
            init_stderr_logging();
            match command {
                Commands::Ask { question } => ask(&config, &question).await,
                Commands::Upload { file } => upload(&config, file).await,
                Commands::Generate { prompt, max_length } => {
                    let max_length = max_length.unwrap_or_else(|| config.max_length());
                    generate(&config, &prompt, max_length).await
                }
                Commands::Config { base_url, user_id, ordering, max_retries } => {
                    update_config(config, base_url, user_id, ordering, max_retries)
                }
            }
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// The TUI owns the terminal, so logs go to a file under the cache dir.
fn init_file_logging() -> Result<()> {
    let log_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("punkstudy");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("punkstudy.log"))
        .context("opening log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();
    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn build_backend(config: &Config) -> Arc<dyn Backend> {
    let gateway = GatewayClient::new(config.base_url());
    let policy = config.retry_policy();
    if policy.max_retries > 0 {
        Arc::new(RetryingBackend::new(gateway, policy))
    } else {
        Arc::new(gateway)
    }
}

async fn run_tui(config: &Config) -> Result<()> {
    tracing::info!(base_url = config.base_url(), "starting PunkStudy");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(build_backend(config), config, events.sender());

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event)?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

async fn ask(config: &Config, question: &str) -> Result<()> {
    let backend = build_backend(config);
    let mut store = ConversationStore::new(config.reply_ordering());

    println!("🤖 Asking {} ...\n", config.base_url().bold().magenta());
    if !store.submit_query(backend.as_ref(), question, config.user_id()).await {
        println!("{}", "Nothing to ask: the question is empty".yellow());
        return Ok(());
    }

    if let Some(reply) = store.last() {
        println!("{}", "PunkBot:".bold().green());
        println!("{}", reply.content);
    }
    Ok(())
}

async fn upload(config: &Config, file: PathBuf) -> Result<()> {
    let backend = build_backend(config);
    let mut widget = UploadWidget::new();

    println!("⬆  Uploading {} ...", file.display().to_string().cyan());
    match widget.upload(backend.as_ref(), &[file], config.user_id()).await {
        Some(notice) if notice.succeeded() => println!("{}", notice.message().bold().green()),
        Some(notice) => println!("{}", notice.message().bold().red()),
        None => {}
    }
    Ok(())
}

async fn generate(config: &Config, prompt: &str, max_length: u32) -> Result<()> {
    let backend = build_backend(config);

    match backend.generate_text(prompt, max_length).await {
        Ok(result) => {
            println!("{}", "Generated:".bold().green());
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Err(err) => {
            println!("{}: {}", "Text generation failed".red(), err);
            println!("Make sure the backend is running at {}", config.base_url().bold());
        }
    }
    Ok(())
}

fn update_config(
    mut config: Config,
    base_url: Option<String>,
    user_id: Option<String>,
    ordering: Option<ReplyOrdering>,
    max_retries: Option<u32>,
) -> Result<()> {
    let changed = base_url.is_some()
        || user_id.is_some()
        || ordering.is_some()
        || max_retries.is_some();

    if let Some(base_url) = base_url {
        config.base_url = Some(base_url);
    }
    if let Some(user_id) = user_id {
        config.user_id = Some(user_id);
    }
    if let Some(ordering) = ordering {
        config.reply_ordering = Some(ordering);
    }
    if let Some(max_retries) = max_retries {
        config.max_retries = Some(max_retries);
    }

    if changed {
        let path = config.save()?;
        println!("{} {}", "Saved".green(), path.display());
    }

    println!("{}", "⚙  PunkStudy configuration".bold().blue());
    println!("{}", "=".repeat(30).dimmed());
    println!("  base_url:       {}", config.base_url());
    println!("  user_id:        {}", config.user_id());
    println!("  max_length:     {}", config.max_length());
    println!("  reply_ordering: {}", config.reply_ordering().as_str());
    println!("  max_retries:    {}", config.retry_policy().max_retries);
    Ok(())
}
