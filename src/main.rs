use anyhow::{bail, Context, Result};
use autosend::config::Settings;
use autosend::state::StateStore;
use autosend::titles::load_titles;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "autosend")]
#[command(version, about = "Resumable search-and-forward automation for Telegram media bots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the persisted run state
    Status,
    /// Delete the persisted run state
    Reset {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Print the titles that a batch run would queue
    Titles {
        /// Titles file (defaults to TITLES_PATH)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Check that the configuration is complete for a run
    Check,
}

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    api_hash_var: Regex,
    api_hash: Regex,
    password_var: Regex,
    phone_var: Regex,
    phone: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            api_hash_var: Regex::new(r"(TG_API_HASH\s*[=:]\s*)[^\s&,]+")?,
            api_hash: Regex::new(r"\b[0-9a-f]{32}\b")?,
            password_var: Regex::new(r"((?:TG_2FA_PASSWORD|TG_PASSWORD)\s*[=:]\s*)[^\s&,]+")?,
            phone_var: Regex::new(r"(TG_PHONE\s*[=:]\s*)[^\s&,]+")?,
            phone: Regex::new(r"\+[0-9]{10,15}\b")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = self
            .api_hash_var
            .replace_all(input, "$1[MASKED]")
            .to_string();
        output = self
            .api_hash
            .replace_all(&output, "[API_HASH]")
            .to_string();
        output = self
            .password_var
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .phone_var
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self.phone.replace_all(&output, "[PHONE]").to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // The caller's buffer was consumed even if the redacted text is shorter
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let patterns = Arc::new(
        RedactionPatterns::new().context("Failed to compile redaction patterns")?,
    );
    init_logging(patterns);

    let cli = Cli::parse();
    let settings = Settings::new().context("Failed to load configuration")?;
    info!("Configuration loaded");

    match cli.command {
        Commands::Status => cmd_status(&settings).await,
        Commands::Reset { yes } => cmd_reset(&settings, yes).await,
        Commands::Titles { file } => cmd_titles(&settings, file).await,
        Commands::Check => cmd_check(&settings),
    }
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let debug = std::env::var("DEBUG_MODE")
            .is_ok_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"));
        EnvFilter::new(if debug { "autosend=debug" } else { "autosend=info" })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

async fn cmd_status(settings: &Settings) -> Result<()> {
    let store = StateStore::new(&settings.state_path);
    let state = store
        .load()
        .await
        .with_context(|| format!("Failed to read state from {}", store.path().display()))?;

    let summary = serde_json::json!({
        "phase": state.phase,
        "current_index": state.current_index,
        "titles": state.titles.len(),
        "current_title": state.current_title(),
        "last_title": state.last_title,
        "last_media_message_id": state.last_media_message_id,
        "sent_total": state.sent_total,
        "dedup_entries": state.sent_ids.len(),
        "updated_at": state.updated_at,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_reset(settings: &Settings, yes: bool) -> Result<()> {
    let store = StateStore::new(&settings.state_path);
    if !yes {
        print!("Delete state at {}? [y/N] ", store.path().display());
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted");
            return Ok(());
        }
    }

    store.reset().await.context("Failed to reset state")?;
    println!("State reset: {}", store.path().display());
    Ok(())
}

async fn cmd_titles(settings: &Settings, file: Option<PathBuf>) -> Result<()> {
    let path = file.unwrap_or_else(|| PathBuf::from(&settings.titles_path));
    let titles = load_titles(&path).await?;
    for (index, title) in titles.iter().enumerate() {
        println!("{index:>4}  {title}");
    }
    info!("{} titles in {}", titles.len(), path.display());
    Ok(())
}

fn cmd_check(settings: &Settings) -> Result<()> {
    if let Err(e) = settings.validate_for_run() {
        error!("Configuration is incomplete: {}", e);
        bail!(e);
    }
    if settings.bot_username.trim().is_empty() {
        bail!("BOT_USERNAME is required");
    }
    println!(
        "OK: bot={} target={} mode={:?}",
        settings.bot_username, settings.target_chat_id, settings.forward_mode
    );
    Ok(())
}
