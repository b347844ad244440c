//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::controller::ControllerOptions;

/// How the local permission gate answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    /// Everything already granted
    Granted,
    /// Not granted yet, granted when requested
    Ask,
    /// Not granted, requests are refused
    Denied,
}

impl FromStr for PermissionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "granted" => Ok(Self::Granted),
            "ask" => Ok(Self::Ask),
            "denied" => Ok(Self::Denied),
            other => bail!("unknown permission mode {other:?} (expected granted, ask or denied)"),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Speak the result before completing
    pub feedback_enabled: bool,

    /// How long Completed stays visible; `None` keeps it until the next command
    pub completed_hold: Option<Duration>,

    /// Stop workflows that stay active longer than this
    pub watchdog: Option<Duration>,

    /// Local permission gate behaviour
    pub permissions: PermissionMode,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voice-workflow");

        let socket_path = lookup("VOICE_WORKFLOW_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let feedback_enabled = parse_var(&lookup, "VOICE_WORKFLOW_FEEDBACK", parse_bool)?
            .unwrap_or(true);

        let completed_hold = match parse_var(&lookup, "VOICE_WORKFLOW_COMPLETED_HOLD_MS", parse_u64)? {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(Duration::from_millis(1500)),
        };

        let watchdog = match parse_var(&lookup, "VOICE_WORKFLOW_WATCHDOG_SECS", parse_u64)? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(120)),
        };

        let permissions = parse_var(&lookup, "VOICE_WORKFLOW_PERMISSIONS", PermissionMode::from_str)?
            .unwrap_or(PermissionMode::Ask);

        Ok(Self {
            socket_path,
            data_dir,
            feedback_enabled,
            completed_hold,
            watchdog,
            permissions,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            feedback_enabled: self.feedback_enabled,
            completed_hold: self.completed_hold,
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Result<T>,
) -> Result<Option<T>> {
    lookup(key)
        .map(|raw| parse(&raw).with_context(|| format!("invalid value for {key}")))
        .transpose()
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

fn parse_u64(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("expected a non-negative integer, got {raw:?}"))
}
