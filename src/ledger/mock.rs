use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{Ledger, RecencyToken, SendConfig, SignatureStatus, SimulationOutcome};
use crate::error::LedgerError;

#[derive(Debug)]
struct MockState {
    balances: HashMap<Pubkey, u64>,
    failing_balances: HashSet<Pubkey>,
    token_balances: HashMap<Pubkey, u64>,
    accounts: HashSet<Pubkey>,
    mint_decimals: HashMap<Pubkey, u8>,
    tables: HashMap<Pubkey, Vec<Pubkey>>,
    blockhash: Hash,
    block_height: u64,
    slot: u64,
    last_valid_block_height: u64,
    failing_sends: HashSet<usize>,
    rejected_sends: HashSet<usize>,
    never_confirm: bool,
    simulation_error: Option<String>,
    fee_lamports: u64,
    statuses: HashMap<Signature, SignatureStatus>,
    sent: Vec<VersionedTransaction>,
    send_configs: Vec<SendConfig>,
    send_calls: usize,
    simulate_calls: usize,
    balance_calls: usize,
    recency_calls: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            balances: HashMap::new(),
            failing_balances: HashSet::new(),
            token_balances: HashMap::new(),
            accounts: HashSet::new(),
            mint_decimals: HashMap::new(),
            tables: HashMap::new(),
            blockhash: Hash::new_unique(),
            block_height: 100,
            slot: 1_000,
            last_valid_block_height: 250,
            failing_sends: HashSet::new(),
            rejected_sends: HashSet::new(),
            never_confirm: false,
            simulation_error: None,
            fee_lamports: 5_000,
            statuses: HashMap::new(),
            sent: Vec::new(),
            send_configs: Vec::new(),
            send_calls: 0,
            simulate_calls: 0,
            balance_calls: 0,
            recency_calls: 0,
        }
    }
}

/// In-memory ledger with scripted balances and send outcomes.
#[derive(Debug, Default)]
pub(crate) struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state.lock().expect("mock state"));
        self
    }

    pub fn with_balance(self, address: Pubkey, lamports: u64) -> Self {
        self.with(|s| {
            s.balances.insert(address, lamports);
            s.accounts.insert(address);
        })
    }

    pub fn with_failing_balance(self, address: Pubkey) -> Self {
        self.with(|s| {
            s.failing_balances.insert(address);
        })
    }

    /// Funds the associated token account of `owner` for `mint`.
    pub fn with_token_balance(self, owner: Pubkey, mint: Pubkey, amount: u64) -> Self {
        let account = get_associated_token_address(&owner, &mint);
        self.with(|s| {
            s.token_balances.insert(account, amount);
            s.accounts.insert(account);
        })
    }

    pub fn with_mint(self, mint: Pubkey, decimals: u8) -> Self {
        self.with(|s| {
            s.mint_decimals.insert(mint, decimals);
            s.accounts.insert(mint);
        })
    }

    pub fn with_table(self, address: Pubkey, members: Vec<Pubkey>) -> Self {
        self.with(|s| {
            s.tables.insert(address, members);
        })
    }

    pub fn with_block_heights(self, current: u64, last_valid: u64) -> Self {
        self.with(|s| {
            s.block_height = current;
            s.last_valid_block_height = last_valid;
        })
    }

    pub fn with_fee(self, fee_lamports: u64) -> Self {
        self.with(|s| s.fee_lamports = fee_lamports)
    }

    /// The `call`-th send (0-based) fails at the transport.
    pub fn fail_send(self, call: usize) -> Self {
        self.with(|s| {
            s.failing_sends.insert(call);
        })
    }

    /// The `call`-th send (0-based) lands with an execution error.
    pub fn reject_send(self, call: usize) -> Self {
        self.with(|s| {
            s.rejected_sends.insert(call);
        })
    }

    pub fn never_confirm(self) -> Self {
        self.with(|s| s.never_confirm = true)
    }

    pub fn with_simulation_error(self, error: &str) -> Self {
        self.with(|s| s.simulation_error = Some(error.to_string()))
    }

    fn read<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        f(&self.state.lock().expect("mock state"))
    }

    pub fn sent(&self) -> Vec<VersionedTransaction> {
        self.read(|s| s.sent.clone())
    }

    pub fn send_configs(&self) -> Vec<SendConfig> {
        self.read(|s| s.send_configs.clone())
    }

    pub fn send_calls(&self) -> usize {
        self.read(|s| s.send_calls)
    }

    pub fn simulate_calls(&self) -> usize {
        self.read(|s| s.simulate_calls)
    }

    pub fn balance_calls(&self) -> usize {
        self.read(|s| s.balance_calls)
    }

    pub fn recency_calls(&self) -> usize {
        self.read(|s| s.recency_calls)
    }

    pub fn blockhash(&self) -> Hash {
        self.read(|s| s.blockhash)
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().expect("mock state");
        state.balance_calls += 1;
        if state.failing_balances.contains(address) {
            return Err(LedgerError::rpc("getBalance timed out"));
        }
        Ok(state.balances.get(address).copied().unwrap_or(0))
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<Option<u64>, LedgerError> {
        Ok(self.read(|s| s.token_balances.get(token_account).copied()))
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        Ok(self.read(|s| s.accounts.contains(address)))
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, LedgerError> {
        self.read(|s| s.mint_decimals.get(mint).copied())
            .ok_or_else(|| LedgerError::rpc(format!("AccountNotFound: {}", mint)))
    }

    async fn latest_recency_token(&self) -> Result<RecencyToken, LedgerError> {
        let mut state = self.state.lock().expect("mock state");
        state.recency_calls += 1;
        Ok(RecencyToken {
            blockhash: state.blockhash,
            last_valid_block_height: state.last_valid_block_height,
        })
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        Ok(self.read(|s| s.block_height))
    }

    async fn recent_slot(&self) -> Result<u64, LedgerError> {
        Ok(self.read(|s| s.slot))
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: SendConfig,
    ) -> Result<Signature, LedgerError> {
        let mut state = self.state.lock().expect("mock state");
        let call = state.send_calls;
        state.send_calls += 1;
        state.send_configs.push(config);

        if state.failing_sends.contains(&call) {
            return Err(LedgerError::rpc("connection reset by peer"));
        }

        let signature = transaction.signatures[0];
        let status = if state.rejected_sends.contains(&call) {
            SignatureStatus::Failed("Error processing Instruction 0: custom program error: 0x1".to_string())
        } else if state.never_confirm {
            SignatureStatus::Pending
        } else {
            SignatureStatus::Confirmed
        };
        state.statuses.insert(signature, status);
        state.sent.push(transaction.clone());
        Ok(signature)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, LedgerError> {
        Ok(self.read(|s| {
            s.statuses
                .get(signature)
                .cloned()
                .unwrap_or(SignatureStatus::Pending)
        }))
    }

    async fn simulate_transaction(
        &self,
        _transaction: &VersionedTransaction,
    ) -> Result<SimulationOutcome, LedgerError> {
        let mut state = self.state.lock().expect("mock state");
        state.simulate_calls += 1;
        Ok(SimulationOutcome {
            error: state.simulation_error.clone(),
            logs: vec!["Program 11111111111111111111111111111111 success".to_string()],
            units_consumed: Some(150),
        })
    }

    async fn resolve_address_table(
        &self,
        address: &Pubkey,
    ) -> Result<Option<Vec<Pubkey>>, LedgerError> {
        Ok(self.read(|s| s.tables.get(address).cloned()))
    }

    async fn transaction_fee(&self, signature: &Signature) -> Result<Option<u64>, LedgerError> {
        Ok(self.read(|s| match s.statuses.get(signature) {
            Some(SignatureStatus::Pending) | None => None,
            Some(_) => Some(s.fee_lamports),
        }))
    }
}
