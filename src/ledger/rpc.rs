use async_trait::async_trait;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig},
};
use solana_sdk::{
    address_lookup_table::state::AddressLookupTable,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    program_pack::Pack,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::UiTransactionEncoding;
use spl_token::state::{Account as TokenAccount, Mint};
use std::time::Duration;
use tracing::debug;

use super::{Ledger, RecencyToken, SendConfig, SignatureStatus, SimulationOutcome};
use crate::error::LedgerError;

/// [`Ledger`] backed by a nonblocking JSON-RPC client.
pub struct RpcLedger {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcLedger {
    pub fn new(rpc_url: impl Into<String>, commitment: CommitmentConfig, timeout: Duration) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(rpc_url.into(), timeout, commitment);
        Self { client, commitment }
    }

    /// `getTransaction` rejects `processed`.
    fn history_commitment(&self) -> CommitmentConfig {
        if self.commitment.commitment == CommitmentLevel::Processed {
            CommitmentConfig::confirmed()
        } else {
            self.commitment
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        self.client
            .get_balance(address)
            .await
            .map_err(LedgerError::rpc)
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<Option<u64>, LedgerError> {
        let account = self
            .client
            .get_account_with_commitment(token_account, self.commitment)
            .await
            .map_err(LedgerError::rpc)?
            .value;

        match account {
            None => Ok(None),
            Some(account) => {
                let state = TokenAccount::unpack(&account.data).map_err(|e| {
                    LedgerError::AccountData {
                        address: token_account.to_string(),
                        message: e.to_string(),
                    }
                })?;
                Ok(Some(state.amount))
            }
        }
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        let account = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(LedgerError::rpc)?
            .value;
        Ok(account.is_some())
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, LedgerError> {
        let account = self
            .client
            .get_account(mint)
            .await
            .map_err(LedgerError::rpc)?;
        let state = Mint::unpack(&account.data).map_err(|e| LedgerError::AccountData {
            address: mint.to_string(),
            message: e.to_string(),
        })?;
        Ok(state.decimals)
    }

    async fn latest_recency_token(&self) -> Result<RecencyToken, LedgerError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(LedgerError::rpc)?;
        Ok(RecencyToken {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.client
            .get_block_height()
            .await
            .map_err(LedgerError::rpc)
    }

    async fn recent_slot(&self) -> Result<u64, LedgerError> {
        self.client
            .get_slot_with_commitment(CommitmentConfig::confirmed())
            .await
            .map_err(LedgerError::rpc)
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: SendConfig,
    ) -> Result<Signature, LedgerError> {
        self.client
            .send_transaction_with_config(transaction, RpcSendTransactionConfig {
                skip_preflight: config.skip_preflight,
                preflight_commitment: Some(self.commitment.commitment),
                encoding: None,
                max_retries: Some(config.max_retries),
                min_context_slot: None,
            })
            .await
            .map_err(LedgerError::rpc)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, LedgerError> {
        let status = self
            .client
            .get_signature_status_with_commitment(signature, self.commitment)
            .await
            .map_err(LedgerError::rpc)?;

        Ok(match status {
            None => SignatureStatus::Pending,
            Some(Ok(())) => SignatureStatus::Confirmed,
            Some(Err(e)) => SignatureStatus::Failed(e.to_string()),
        })
    }

    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<SimulationOutcome, LedgerError> {
        let response = self
            .client
            .simulate_transaction(transaction)
            .await
            .map_err(LedgerError::rpc)?;

        let result = response.value;
        Ok(SimulationOutcome {
            error: result.err.map(|e| e.to_string()),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    async fn resolve_address_table(
        &self,
        address: &Pubkey,
    ) -> Result<Option<Vec<Pubkey>>, LedgerError> {
        let account = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(LedgerError::rpc)?
            .value;

        let Some(account) = account else {
            debug!("Lookup table {} not found", address);
            return Ok(None);
        };

        let table =
            AddressLookupTable::deserialize(&account.data).map_err(|e| LedgerError::AccountData {
                address: address.to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(table.addresses.to_vec()))
    }

    async fn transaction_fee(&self, signature: &Signature) -> Result<Option<u64>, LedgerError> {
        let transaction = self
            .client
            .get_transaction_with_config(signature, RpcTransactionConfig {
                encoding: Some(UiTransactionEncoding::Base64),
                commitment: Some(self.history_commitment()),
                max_supported_transaction_version: Some(0),
            })
            .await
            .map_err(LedgerError::rpc)?;

        Ok(transaction.transaction.meta.map(|meta| meta.fee))
    }
}
