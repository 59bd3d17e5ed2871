//! `dashvault` CLI — terminal shell for the encrypted dashboard token vault.
//!
//! Every invocation is a fresh session: the vault is loaded from the redb
//! file, unlocked with the master password when the command needs tokens,
//! and dropped (locked) when the process exits.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod prompt;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dashvault_core::{VaultConfig, VaultManager, VaultState, VaultStatus, VaultTokens};
use dashvault_storage::RedbBackend;
use tracing::debug;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

fn success(msg: &str) {
    println!("  {GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("  {YELLOW}{BOLD}!{RESET} {msg}");
}

// ── CLI structure ────────────────────────────────────────────────────

/// dashvault — encrypted API tokens for your dashboard.
#[derive(Parser)]
#[command(
    name = "dashvault",
    version,
    about = "dashvault CLI — store dashboard API tokens in a password-encrypted vault",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         DASHVAULT_PATH            Vault database file (default: ./dashvault.redb)\n  \
         DASHVAULT_PASSWORD        Master password (prompted for when unset)\n  \
         DASHVAULT_NEW_PASSWORD    New password for `passwd` (prompted for when unset)\n  \
         DASHVAULT_STORAGE_KEY     Storage key of the payload (default: dashboard.vault)\n  \
         DASHVAULT_KDF_ITERATIONS  PBKDF2 iterations (default and minimum: 200000)\n\n\
         {DIM}Examples:{RESET}\n  \
         dashvault init --token todoist=tok-123\n  \
         dashvault set webex abc\n  \
         dashvault get todoist"
    ),
)]
struct Cli {
    /// Path to the vault database file.
    #[arg(long, env = "DASHVAULT_PATH", default_value = "dashvault.redb")]
    path: PathBuf,

    /// Master password. Hidden from help: argv is visible in the process
    /// list, so users are pointed at `DASHVAULT_PASSWORD` or the prompt.
    #[arg(long, env = "DASHVAULT_PASSWORD", hide = true)]
    password: Option<String>,

    /// Log filter (e.g. `warn`, `info`, `dashvault_core=debug`).
    #[arg(long, env = "DASHVAULT_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether a vault exists.
    Status {
        /// Print the status as JSON.
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// Create a new vault, optionally seeded with tokens.
    Init {
        /// Initial token as SERVICE=TOKEN. Repeatable.
        #[arg(long = "token", value_name = "SERVICE=TOKEN")]
        tokens: Vec<String>,
        /// Replace an existing vault (its tokens are lost).
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// Check the master password.
    Unlock,
    /// Print the token stored for a service.
    Get {
        /// Service identifier (e.g. "todoist").
        service: String,
    },
    /// Store or replace the token for a service.
    Set {
        /// Service identifier.
        service: String,
        /// Bearer token.
        token: String,
    },
    /// Remove the token for a service.
    Clear {
        /// Service identifier.
        service: String,
    },
    /// List services that have a token.
    List,
    /// Change the master password.
    Passwd {
        /// New master password.
        #[arg(long, env = "DASHVAULT_NEW_PASSWORD", hide = true)]
        new_password: Option<String>,
    },
    /// Permanently delete the vault and every token in it.
    Wipe {
        /// Confirm the wipe.
        #[arg(long, default_value = "false")]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

fn init_logging(filter: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let vault = open_vault(&cli.path).await?;
    let password = cli.password;

    match cli.command {
        Commands::Status { json } => cmd_status(&vault, &cli.path, json).await,
        Commands::Init { tokens, force } => cmd_init(&vault, password, &tokens, force).await,
        Commands::Unlock => {
            unlock(&vault, password).await?;
            println!();
            success("Password accepted.");
            println!();
            Ok(())
        }
        Commands::Get { service } => cmd_get(&vault, password, &service).await,
        Commands::Set { service, token } => cmd_set(&vault, password, &service, &token).await,
        Commands::Clear { service } => cmd_clear(&vault, password, &service).await,
        Commands::List => cmd_list(&vault, password).await,
        Commands::Passwd { new_password } => cmd_passwd(&vault, password, new_password).await,
        Commands::Wipe { yes } => cmd_wipe(&vault, yes).await,
    }
}

async fn open_vault(path: &Path) -> Result<VaultManager> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let storage = RedbBackend::open(path)
        .with_context(|| format!("failed to open vault file {}", path.display()))?;
    let config = VaultConfig::from_env();
    debug!(path = %path.display(), key = %config.storage_key, "opening vault");
    VaultManager::load(Arc::new(storage), config)
        .await
        .context("failed to load vault")
}

/// Unlock the session or fail with a message fit for the terminal.
async fn unlock(vault: &VaultManager, provided: Option<String>) -> Result<()> {
    if !vault.has_vault().await {
        bail!("no vault found. Run `dashvault init` first");
    }
    let password = prompt::password(provided, "Master password")?;
    if !vault.unlock(&password).await.context("failed to unlock vault")? {
        bail!("incorrect password");
    }
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────────

async fn cmd_status(vault: &VaultManager, path: &Path, json: bool) -> Result<()> {
    let status = vault.status().await;
    if json {
        let body = serde_json::json!({
            "path": path.display().to_string(),
            "status": status,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    print_status(&status, path);
    Ok(())
}

fn print_status(status: &VaultStatus, path: &Path) {
    println!();
    println!("  {CYAN}{BOLD}dashvault{RESET} {DIM}{}{RESET}", path.display());
    match status.state {
        VaultState::NoVault => warning("No vault — run `dashvault init` to create one."),
        VaultState::Locked => success("Vault present (locked)."),
        VaultState::Unlocked => success("Vault present (unlocked)."),
    }
    println!();
}

async fn cmd_init(
    vault: &VaultManager,
    provided: Option<String>,
    pairs: &[String],
    force: bool,
) -> Result<()> {
    if vault.has_vault().await && !force {
        bail!("a vault already exists. Pass --force to replace it (its tokens will be lost)");
    }
    let tokens = parse_token_pairs(pairs)?;
    let count = tokens.len();
    let password = prompt::new_password(provided, "New master password")?;

    vault
        .initialize_vault(&password, tokens)
        .await
        .context("failed to initialize vault")?;

    println!();
    success(&format!("Vault created with {count} token(s)."));
    warning("There is no password recovery. A forgotten password means `dashvault wipe`.");
    println!();
    Ok(())
}

async fn cmd_get(vault: &VaultManager, provided: Option<String>, service: &str) -> Result<()> {
    unlock(vault, provided).await?;
    let Some(token) = vault.get_token(service).await else {
        bail!("no token configured for '{service}'");
    };
    // Bare output so `$(dashvault get todoist)` works.
    println!("{token}");
    Ok(())
}

async fn cmd_set(
    vault: &VaultManager,
    provided: Option<String>,
    service: &str,
    token: &str,
) -> Result<()> {
    unlock(vault, provided).await?;
    vault
        .set_service_token(service, token)
        .await
        .with_context(|| format!("failed to store token for '{service}'"))?;
    println!();
    success(&format!("Token stored for {BOLD}{service}{RESET}."));
    println!();
    Ok(())
}

async fn cmd_clear(vault: &VaultManager, provided: Option<String>, service: &str) -> Result<()> {
    unlock(vault, provided).await?;
    vault
        .clear_service_token(service)
        .await
        .with_context(|| format!("failed to remove token for '{service}'"))?;
    println!();
    success(&format!("Token removed for {BOLD}{service}{RESET}."));
    println!();
    Ok(())
}

async fn cmd_list(vault: &VaultManager, provided: Option<String>) -> Result<()> {
    unlock(vault, provided).await?;
    for service in vault.service_ids().await {
        println!("{service}");
    }
    Ok(())
}

async fn cmd_passwd(
    vault: &VaultManager,
    provided: Option<String>,
    new_password: Option<String>,
) -> Result<()> {
    unlock(vault, provided).await?;
    let password = prompt::new_password(new_password, "New master password")?;
    vault
        .set_master_password(&password)
        .await
        .context("failed to change master password")?;
    println!();
    success("Master password changed.");
    println!();
    Ok(())
}

async fn cmd_wipe(vault: &VaultManager, yes: bool) -> Result<()> {
    if !yes {
        bail!("wiping deletes every stored token for good. Re-run with --yes to confirm");
    }
    vault.clear_vault().await.context("failed to wipe vault")?;
    println!();
    warning("Vault wiped — all tokens deleted.");
    println!();
    Ok(())
}

/// Parse `SERVICE=TOKEN` arguments into a token map. Later duplicates win.
fn parse_token_pairs(pairs: &[String]) -> Result<VaultTokens> {
    let mut tokens = VaultTokens::new();
    for pair in pairs {
        let Some((service, token)) = pair.split_once('=') else {
            bail!("invalid token '{pair}': expected SERVICE=TOKEN");
        };
        let service = service.trim();
        if service.is_empty() {
            bail!("invalid token '{pair}': service name is empty");
        }
        tokens.insert(service.to_owned(), token.to_owned());
    }
    Ok(tokens)
}
