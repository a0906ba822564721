use anyhow::{Context, Result, anyhow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{Keypair, read_keypair_file},
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::allocation::AllocationPolicy;
use crate::assembler::MessageFormat;
use crate::orchestrator::{Asset, BatchRequest, BatchSettings, CollectRequest, DistributeRequest};
use crate::submitter::SubmitterConfig;
use crate::swap::DEFAULT_SWAP_API_URL;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn to_config(self) -> CommitmentConfig {
        match self {
            Commitment::Processed => CommitmentConfig::processed(),
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default)]
    pub commitment: Commitment,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub priority_fee_micro_lamports: u64,
    #[serde(default)]
    pub compute_unit_limit: Option<u32>,
    #[serde(default)]
    pub interval_ms: u64,
    #[serde(default = "default_estimated_fee_lamports")]
    pub estimated_fee_lamports: u64,

    #[serde(default = "default_send_max_retries")]
    pub send_max_retries: usize,
    #[serde(default = "default_true")]
    pub skip_preflight: bool,
    #[serde(default)]
    pub simulate: bool,
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub use_versioned: bool,
    #[serde(default)]
    pub address_tables: Vec<String>,

    #[serde(default = "default_swap_api_url")]
    pub swap_api_url: String,
    #[serde(default = "default_balance_batch_size")]
    pub balance_batch_size: usize,
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_estimated_fee_lamports() -> u64 {
    5_000
}

fn default_send_max_retries() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_confirm_poll_ms() -> u64 {
    500
}

fn default_confirm_timeout_secs() -> u64 {
    60
}

fn default_swap_api_url() -> String {
    DEFAULT_SWAP_API_URL.to_string()
}

fn default_balance_batch_size() -> usize {
    25
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            commitment: Commitment::default(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            log_level: default_log_level(),
            priority_fee_micro_lamports: 0,
            compute_unit_limit: None,
            interval_ms: 0,
            estimated_fee_lamports: default_estimated_fee_lamports(),
            send_max_retries: default_send_max_retries(),
            skip_preflight: true,
            simulate: false,
            confirm_poll_ms: default_confirm_poll_ms(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            use_versioned: true,
            address_tables: Vec::new(),
            swap_api_url: default_swap_api_url(),
            balance_batch_size: default_balance_batch_size(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).context("Failed to open config file")?;
        let config: Config =
            serde_yaml::from_reader(file).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn message_format(&self) -> MessageFormat {
        if self.use_versioned {
            MessageFormat::V0
        } else {
            MessageFormat::Legacy
        }
    }

    pub fn address_table_keys(&self) -> Result<Vec<Pubkey>> {
        self.address_tables
            .iter()
            .map(|address| {
                Pubkey::from_str(address)
                    .with_context(|| format!("Invalid address table {} in config", address))
            })
            .collect()
    }

    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            max_retries: self.send_max_retries,
            skip_preflight: self.skip_preflight,
            simulate: self.simulate,
            poll_interval: Duration::from_millis(self.confirm_poll_ms),
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
        }
    }

    pub fn settings(&self) -> Result<BatchSettings> {
        Ok(BatchSettings {
            pacing: Duration::from_millis(self.interval_ms),
            priority_fee_micro_lamports: self.priority_fee_micro_lamports,
            compute_unit_limit: self.compute_unit_limit,
            estimated_fee_lamports: self.estimated_fee_lamports,
            format: self.message_format(),
            address_tables: self.address_table_keys()?,
            submitter: self.submitter_config(),
        })
    }
}

pub const SAMPLE_CONFIG: &str = r#"# Solana RPC endpoint
rpc_url: "https://api.mainnet-beta.solana.com"
commitment: confirmed
rpc_timeout_secs: 30
log_level: info

# Fees
priority_fee_micro_lamports: 0
# compute_unit_limit: 200000
estimated_fee_lamports: 5000

# Pacing between transfers in a batch
interval_ms: 0

# Submission
send_max_retries: 2
skip_preflight: true
simulate: false
confirm_poll_ms: 500
confirm_timeout_secs: 60

# Message format and address lookup tables
use_versioned: true
address_tables: []

# Swap aggregator
swap_api_url: "https://lite-api.jup.ag/swap/v1"

# Balance queries
balance_batch_size: 25
"#;

pub const SAMPLE_DISTRIBUTE_PLAN: &str = r#"# Send from one wallet to many
keypair_path: "/path/to/source.json"
# token:
#   mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
#   decimals: 6
recipients:
  - "RECIPIENT_WALLET_ADDRESS"
# recipients_file: "recipients.txt"
allocation:
  mode: random
  min: 0.01
  max: 0.05
"#;

pub const SAMPLE_COLLECT_PLAN: &str = r#"# Sweep many wallets into one
keypair_paths:
  - "/path/to/wallet-1.json"
  - "/path/to/wallet-2.json"
destination: "DESTINATION_WALLET_ADDRESS"
allocation:
  mode: reserve
  reserve: 0.001
"#;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPlan {
    pub mint: String,
    #[serde(default)]
    pub decimals: Option<u8>,
}

impl TokenPlan {
    fn asset(token: Option<TokenPlan>) -> Asset {
        match token {
            Some(token) => Asset::Token {
                mint: token.mint,
                decimals: token.decimals,
            },
            None => Asset::Native,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DistributeMode {
    Fixed { amount: Decimal },
    Random { min: Decimal, max: Decimal },
    Custom { amounts: Vec<Decimal> },
}

impl From<DistributeMode> for AllocationPolicy {
    fn from(mode: DistributeMode) -> Self {
        match mode {
            DistributeMode::Fixed { amount } => AllocationPolicy::Fixed(amount),
            DistributeMode::Random { min, max } => AllocationPolicy::RandomRange { min, max },
            DistributeMode::Custom { amounts } => AllocationPolicy::ExplicitList(amounts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CollectMode {
    All,
    Fixed { amount: Decimal },
    Reserve { reserve: Decimal },
}

impl From<CollectMode> for AllocationPolicy {
    fn from(mode: CollectMode) -> Self {
        match mode {
            CollectMode::All => AllocationPolicy::SweepAll,
            CollectMode::Fixed { amount } => AllocationPolicy::SweepFixed(amount),
            CollectMode::Reserve { reserve } => AllocationPolicy::SweepReserve(reserve),
        }
    }
}

/// One source wallet sending to many recipients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DistributePlan {
    pub keypair_path: String,
    #[serde(default)]
    pub token: Option<TokenPlan>,
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Extra recipients, one address per line.
    #[serde(default)]
    pub recipients_file: Option<PathBuf>,
    pub allocation: DistributeMode,
}

impl DistributePlan {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).context("Failed to open plan file")?;
        serde_yaml::from_reader(file).context("Failed to parse distribute plan")
    }

    pub fn into_request(self) -> Result<BatchRequest> {
        let source = load_keypair(&self.keypair_path)?;
        let mut recipients = self.recipients;
        if let Some(path) = &self.recipients_file {
            recipients.extend(load_address_list(path)?);
        }

        Ok(BatchRequest::Distribute(DistributeRequest {
            source,
            asset: TokenPlan::asset(self.token),
            recipients,
            policy: self.allocation.into(),
        }))
    }
}

/// Many source wallets swept into one destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectPlan {
    pub keypair_paths: Vec<String>,
    pub destination: String,
    #[serde(default)]
    pub token: Option<TokenPlan>,
    pub allocation: CollectMode,
}

impl CollectPlan {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).context("Failed to open plan file")?;
        serde_yaml::from_reader(file).context("Failed to parse collect plan")
    }

    pub fn into_request(self) -> Result<BatchRequest> {
        let sources = self
            .keypair_paths
            .iter()
            .map(load_keypair)
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchRequest::Collect(CollectRequest {
            sources,
            destination: self.destination,
            asset: TokenPlan::asset(self.token),
            policy: self.allocation.into(),
        }))
    }
}

pub fn load_keypair<P: AsRef<Path>>(path: P) -> Result<Keypair> {
    let path = path.as_ref();
    read_keypair_file(path)
        .map_err(|e| anyhow!("Failed to read keypair file {}: {}", path.display(), e))
}

/// Reads one address per line, skipping blanks and `#` comments.
pub fn load_address_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read address list {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
