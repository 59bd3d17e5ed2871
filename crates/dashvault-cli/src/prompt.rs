//! Master password acquisition.
//!
//! Priority:
//! 1. The value clap resolved from `DASHVAULT_PASSWORD` (or the hidden
//!    `--password` flag) for scripts and headless use
//! 2. An interactive TTY prompt via `rpassword`
//!
//! Empty passwords are rejected here; the vault itself accepts them.

use std::io::IsTerminal;

use anyhow::{Context, Result, bail};
use zeroize::Zeroizing;

/// Use `provided` if set, otherwise prompt on the terminal.
pub fn password(provided: Option<String>, label: &str) -> Result<Zeroizing<String>> {
    if let Some(value) = provided {
        return non_empty(Zeroizing::new(value));
    }
    if !std::io::stdin().is_terminal() {
        bail!("no password provided. Set DASHVAULT_PASSWORD or run interactively");
    }
    non_empty(read(label)?)
}

/// Like [`password`], but an interactive prompt asks twice and requires both
/// entries to match. Used when a new password is being chosen.
pub fn new_password(provided: Option<String>, label: &str) -> Result<Zeroizing<String>> {
    if provided.is_some() || !std::io::stdin().is_terminal() {
        return password(provided, label);
    }

    let first = non_empty(read(label)?)?;
    let second = read(&format!("Confirm {}", label.to_lowercase()))?;
    if *first != *second {
        bail!("passwords do not match");
    }
    Ok(first)
}

fn read(label: &str) -> Result<Zeroizing<String>> {
    rpassword::prompt_password(format!("{label}: "))
        .map(Zeroizing::new)
        .context("failed to read password from terminal")
}

fn non_empty(value: Zeroizing<String>) -> Result<Zeroizing<String>> {
    if value.is_empty() {
        bail!("empty password not allowed");
    }
    Ok(value)
}
