//! Configuration for the fluxa-x402 facilitator server.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use fluxa_x402_odp::facilitator::SettlementMode;
use fluxa_x402_types::address::ChecksummedAddress;
use fluxa_x402_types::amount::Amount;

/// CLI arguments for the facilitator server.
#[derive(Parser, Debug)]
#[command(name = "fluxa-x402-facilitator")]
#[command(about = "fluxa-x402 facilitator HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Host and port fall back to `HOST`/`PORT` environment variables, then to
/// hardcoded defaults. Scheme sections are optional; a missing section means
/// the scheme is not served.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    credit: Option<CreditConfig>,
    #[serde(default)]
    odp: Option<OdpSchemeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            credit: None,
            odp: None,
        }
    }
}

/// Credit scheme section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreditConfig {
    /// Accept `http://` signature agents on loopback hosts.
    ///
    /// Test and local-development escape hatch; production directories are
    /// HTTPS only.
    #[serde(default)]
    pub allow_loopback_agents: bool,
}

/// ODP deferred scheme section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdpSchemeConfig {
    /// Numeric EVM chain id (e.g. 84532 for Base Sepolia).
    pub chain_id: u64,
    /// JSON-RPC endpoint.
    pub rpc_url: url::Url,
    /// Hex-encoded processor private keys.
    ///
    /// Falls back to the `ODP_SIGNER_KEY` environment variable when empty.
    #[serde(default)]
    pub signer_keys: Vec<String>,
    /// The settlement contract sessions bind to.
    pub settlement_contract: ChecksummedAddress,
    /// The debit wallet holding payer funds.
    pub debit_wallet: ChecksummedAddress,
    /// The withdrawal delay the debit wallet must report.
    pub withdraw_delay_seconds: u64,
    /// `synthetic` or `onchain`.
    pub settlement_mode: SettlementMode,
    /// Processors allowed to settle; empty means any.
    #[serde(default)]
    pub authorized_processors: Vec<ChecksummedAddress>,
    #[serde(default)]
    pub max_receipts_per_settlement: Option<usize>,
    #[serde(default)]
    pub max_amount_per_receipt: Option<Amount>,
    /// Background settlement loop period; the loop is disabled when absent.
    #[serde(default)]
    pub auto_settle_interval_seconds: Option<u64>,
}

impl OdpSchemeConfig {
    /// Resolves the processor keys, consulting `ODP_SIGNER_KEY` when the
    /// config file carries none.
    pub fn resolved_signer_keys(&self) -> Result<Vec<String>, ConfigError> {
        if !self.signer_keys.is_empty() {
            return Ok(self.signer_keys.clone());
        }
        match std::env::var("ODP_SIGNER_KEY") {
            Ok(key) if !key.is_empty() => Ok(vec![key]),
            _ => Err(ConfigError::MissingSignerKeys),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8402;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Default port with fallback: $PORT env var, then 8402.
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Default host with fallback: $HOST env var, then 0.0.0.0.
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("odp section configured without signer keys (set signerKeys or ODP_SIGNER_KEY)")]
    MissingSignerKeys,
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn credit(&self) -> Option<&CreditConfig> {
        self.credit.as_ref()
    }

    pub fn odp(&self) -> Option<&OdpSchemeConfig> {
        self.odp.as_ref()
    }

    /// Loads configuration from CLI arguments and the JSON file.
    ///
    /// A missing config file yields the default configuration (credit and
    /// odp sections absent, defaults for host and port).
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        Self::load_from_path(cli_args.config)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
