#[cfg(test)]
pub(crate) mod mock;
mod rpc;

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};

use crate::error::LedgerError;

pub use rpc::RpcLedger;

/// Recent blockhash plus the last block height at which it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyToken {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Transport-level send options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendConfig {
    pub max_retries: usize,
    pub skip_preflight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not yet observed at the configured commitment.
    Pending,
    Confirmed,
    /// Landed on chain with an execution error.
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Everything the transfer core needs from the network. The RPC
/// implementation is passed in explicitly, never held globally.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Lamport balance of `address`.
    async fn balance(&self, address: &Pubkey) -> Result<u64, LedgerError>;

    /// Raw amount held by an SPL token account, `None` when the account does not exist.
    async fn token_balance(&self, token_account: &Pubkey) -> Result<Option<u64>, LedgerError>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError>;

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, LedgerError>;

    async fn latest_recency_token(&self) -> Result<RecencyToken, LedgerError>;

    async fn block_height(&self) -> Result<u64, LedgerError>;

    /// Latest confirmed slot, used to derive new lookup table addresses.
    async fn recent_slot(&self) -> Result<u64, LedgerError>;

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: SendConfig,
    ) -> Result<Signature, LedgerError>;

    async fn signature_status(&self, signature: &Signature)
    -> Result<SignatureStatus, LedgerError>;

    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<SimulationOutcome, LedgerError>;

    /// Member addresses of a lookup table, `None` when the table account is missing.
    async fn resolve_address_table(
        &self,
        address: &Pubkey,
    ) -> Result<Option<Vec<Pubkey>>, LedgerError>;

    /// Fee charged for a landed transaction, read from its status metadata.
    async fn transaction_fee(&self, signature: &Signature) -> Result<Option<u64>, LedgerError>;
}
