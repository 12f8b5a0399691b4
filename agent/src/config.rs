//! Layered configuration
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. optional TOML file (`ULTRON_CONFIG`, default `ultron.toml`)
//! 3. `ULTRON__SECTION__KEY` environment variables
//! 4. bare deployment variables (`ETH_RPC`, `TELEGRAM_BOT_TOKEN`, ...) for keys still unset

use ai_engine::GateConfig;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use ultron_core::{Address, Network, NetworkId};

use crate::error::AgentError;

pub const DEFAULT_CONFIG_PATH: &str = "ultron.toml";

/// Networks picked up from `<ID>_RPC` when no config entry names them
pub const LEGACY_NETWORKS: [&str; 4] = ["ETH", "ARBITRUM", "BSC", "POLYGON"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkSettings>,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub signer: SignerSettings,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    /// Pause between ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-network pending block fetch; 0 disables
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Per dispatch step; 0 disables
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,
    /// HTTP timeout of every JSON-RPC client
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSettings {
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerSettings {
    /// JSON-RPC signer endpoint. Unset runs the agent observe-only.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    /// Credential reference forwarded to the signer
    #[serde(default)]
    pub key_ref: String,
    #[serde(default = "default_signer_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    #[default]
    None,
    Jsonl,
    Github,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSettings {
    #[serde(default)]
    pub kind: ReportKind,
    #[serde(default = "default_report_path")]
    pub path: PathBuf,
    /// `owner/name`
    #[serde(default)]
    pub github_repo: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Append-only log file; stdout when unset
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_poll_interval() -> u64 {
    300
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_dispatch_timeout() -> u64 {
    30
}
fn default_check_timeout() -> u64 {
    10
}
fn default_rpc_timeout() -> u64 {
    30
}
fn default_signer_timeout() -> u64 {
    10
}
fn default_report_path() -> PathBuf {
    PathBuf::from("ultron-report.jsonl")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            check_timeout_secs: default_check_timeout(),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            url: None,
            address: None,
            key_ref: String::new(),
            timeout_secs: default_signer_timeout(),
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            kind: ReportKind::None,
            path: default_report_path(),
            github_repo: None,
            github_token: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

impl AgentSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        non_zero(self.poll_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        non_zero(self.dispatch_timeout_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs.max(1))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs.max(1))
    }
}

fn non_zero(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Settings {
    /// Load from `.env`, the config file and the process environment.
    pub fn load() -> Result<Self, AgentError> {
        // A missing .env is normal outside development
        let _ = dotenvy::dotenv();

        let path =
            std::env::var("ULTRON_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut settings = Self::from_sources(Some(Path::new(&path)), true)?;
        settings.apply_legacy_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Build from an optional TOML file and, when `with_env` is set, the
    /// `ULTRON__` environment layer.
    pub fn from_sources(path: Option<&Path>, with_env: bool) -> Result<Self, AgentError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        if with_env {
            builder = builder.add_source(
                Environment::with_prefix("ULTRON")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml(toml: &str) -> Result<Self, AgentError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Fill still-unset keys from bare deployment variables.
    pub fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for id in LEGACY_NETWORKS {
            let configured = self
                .networks
                .keys()
                .any(|key| NetworkId::new(key) == NetworkId::new(id));
            if configured {
                continue;
            }
            if let Some(rpc_url) = lookup(&format!("{}_RPC", id)) {
                self.networks.insert(
                    id.to_lowercase(),
                    NetworkSettings {
                        rpc_url,
                        chain_id: None,
                    },
                );
            }
        }

        if self.telegram.bot_token.is_none() {
            self.telegram.bot_token = lookup("TELEGRAM_BOT_TOKEN");
        }
        if self.telegram.chat_id.is_none() {
            self.telegram.chat_id = lookup("TELEGRAM_CHAT_ID");
        }
        if self.report.github_token.is_none() {
            self.report.github_token = lookup("GITHUB_TOKEN");
        }
        if self.report.github_repo.is_none() {
            self.report.github_repo = lookup("GITHUB_REPO");
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent.poll_interval_secs == 0 {
            return Err(AgentError::Config(
                "agent.poll_interval_secs must be positive".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.gate.test_fraction) {
            return Err(AgentError::Config(format!(
                "gate.test_fraction must be in [0, 1), got {}",
                self.gate.test_fraction
            )));
        }

        if self.gate.retrain_threshold == 0 {
            return Err(AgentError::Config(
                "gate.retrain_threshold must be positive".to_string(),
            ));
        }

        if self.signer.url.is_some() && self.signer.address.is_none() {
            return Err(AgentError::Config(
                "signer.address is required when signer.url is set".to_string(),
            ));
        }

        if self.report.kind == ReportKind::Github && self.report.github_repo.is_none() {
            return Err(AgentError::Config(
                "report.github_repo is required for the github report sink".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured networks in identifier order.
    ///
    /// Entries without an RPC URL are left out.
    pub fn networks(&self) -> Vec<Network> {
        self.networks
            .iter()
            .filter_map(|(id, entry)| {
                if entry.rpc_url.trim().is_empty() {
                    warn!("⚠️ {} has no RPC URL configured, skipping", NetworkId::new(id));
                    return None;
                }
                let network = Network::new(id, entry.rpc_url.trim());
                Some(match entry.chain_id {
                    Some(chain_id) => network.with_chain_id(chain_id),
                    None => network,
                })
            })
            .collect()
    }

    pub fn log_summary(&self) {
        info!(
            networks = self.networks.len(),
            poll_interval_secs = self.agent.poll_interval_secs,
            retrain_threshold = self.gate.retrain_threshold,
            observe_only = self.signer.url.is_none(),
            report = ?self.report.kind,
            "Configuration loaded"
        );
    }
}
