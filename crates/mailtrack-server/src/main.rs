//! mailtrack server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) plus
//! `MAILTRACK__*` environment overrides, opens the SQLite store, and serves
//! the tracking endpoints and JSON API over HTTP.
//!
//! # Offline import
//!
//! ```
//! cargo run -p mailtrack-server -- --import sends.csv --campaign outreach
//! ```
//!
//! reconciles a file against the store and prints the import summary
//! without starting the server.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `auth_password_hash`:
//!
//! ```
//! cargo run -p mailtrack-server -- --hash-password
//! ```

use std::{
  fs::File,
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use mailtrack_core::record::CampaignType;
use mailtrack_server::AppState;
use mailtrack_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "mailtrack campaign tracking server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,

  /// Import a CSV send log into the store, print the summary and exit.
  #[arg(long, value_name = "FILE", requires = "campaign")]
  import: Option<PathBuf>,

  /// Campaign type for `--import` (outreach, follow_up, reminder).
  #[arg(long)]
  campaign: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Helper mode: hash a password and exit.
  if cli.hash_password {
    let password = rpassword_or_stdin()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  // Load configuration.
  let server_cfg = mailtrack_server::load_config(&cli.config, mailtrack_server::env_source())
    .context("failed to load configuration")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Helper mode: offline import.
  if let Some(path) = cli.import {
    let campaign = CampaignType::parse(cli.campaign.as_deref().unwrap_or_default())?;
    let file = File::open(&path).with_context(|| format!("failed to open {path:?}"))?;
    let rows = mailtrack_sheet::read_rows(file)
      .with_context(|| format!("failed to read {path:?}"))?;
    let summary =
      mailtrack_api::run_import(&store, &server_cfg.classifier, rows, campaign).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    return Ok(());
  }

  let state = AppState::new(Arc::new(store), server_cfg.clone());
  if state.auth.is_none() {
    tracing::warn!("no API credentials configured; /api is unauthenticated");
  }

  let app = mailtrack_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .await
  .context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn rpassword_or_stdin() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
