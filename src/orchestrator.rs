use chrono::Utc;
use indicatif::ProgressBar;
use rust_decimal::Decimal;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::address::{parse_address, short, validate};
use crate::allocation::{
    AllocationPolicy, SweepAmount, allocate, from_base_units, resolve_sweep, to_base_units,
    validate_policy,
};
use crate::assembler::{
    AccountOperation, AssembledTransaction, AssemblyContext, InstructionAssembler, MessageFormat,
    TransferOperation, holding_account,
};
use crate::error::{BatchError, TransferError};
use crate::ledger::Ledger;
use crate::submitter::{SubmitReceipt, SubmitterConfig, TransactionSubmitter};
use crate::types::{BatchReport, BatchSummary, TransferResult, TransferStatus, TransferTarget};

/// Decimal places of the native asset (1 SOL = 10^9 lamports).
pub const NATIVE_DECIMALS: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Native,
    /// SPL token. Decimals are read from the mint when not given.
    Token { mint: String, decimals: Option<u8> },
}

#[derive(Debug)]
pub struct DistributeRequest {
    pub source: Keypair,
    pub asset: Asset,
    pub recipients: Vec<String>,
    pub policy: AllocationPolicy,
}

#[derive(Debug)]
pub struct CollectRequest {
    pub sources: Vec<Keypair>,
    pub destination: String,
    pub asset: Asset,
    pub policy: AllocationPolicy,
}

/// Closes each owner's empty token account for `mint` and returns its rent.
#[derive(Debug)]
pub struct ReclaimRequest {
    pub owners: Vec<Keypair>,
    pub mint: String,
    /// Defaults to the owner itself.
    pub rent_destination: Option<String>,
}

#[derive(Debug)]
pub enum BatchRequest {
    Distribute(DistributeRequest),
    Collect(CollectRequest),
    Reclaim(ReclaimRequest),
}

impl BatchRequest {
    /// One transfer, run through the same pipeline as a batch of one.
    pub fn single(source: Keypair, destination: String, amount: Decimal, asset: Asset) -> Self {
        BatchRequest::Distribute(DistributeRequest {
            source,
            asset,
            recipients: vec![destination],
            policy: AllocationPolicy::Fixed(amount),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Delay between consecutive items. Not applied after the last one.
    pub pacing: Duration,
    pub priority_fee_micro_lamports: u64,
    pub compute_unit_limit: Option<u32>,
    /// Flat per-transaction fee used for pre-flight checks and sweeps.
    pub estimated_fee_lamports: u64,
    pub format: MessageFormat,
    pub address_tables: Vec<Pubkey>,
    pub submitter: SubmitterConfig,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::ZERO,
            priority_fee_micro_lamports: 0,
            compute_unit_limit: None,
            estimated_fee_lamports: 5_000,
            format: MessageFormat::V0,
            address_tables: Vec::new(),
            submitter: SubmitterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedAsset {
    Native,
    Token { mint: Pubkey, decimals: u8 },
}

impl ResolvedAsset {
    fn decimals(&self) -> u8 {
        match self {
            ResolvedAsset::Native => NATIVE_DECIMALS,
            ResolvedAsset::Token { decimals, .. } => *decimals,
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            ResolvedAsset::Native => "SOL",
            ResolvedAsset::Token { .. } => "tokens",
        }
    }

    fn operation(&self, from: Pubkey, to: Pubkey, units: u64) -> TransferOperation {
        match *self {
            ResolvedAsset::Native => TransferOperation::Native {
                from,
                to,
                lamports: units,
            },
            ResolvedAsset::Token { mint, decimals } => TransferOperation::Token {
                mint,
                decimals,
                owner: from,
                destination_owner: to,
                amount: units,
            },
        }
    }
}

/// Collects every problem with a request instead of stopping at the first.
pub fn validate_request(request: &BatchRequest) -> Vec<String> {
    let mut messages = Vec::new();

    match request {
        BatchRequest::Distribute(request) => {
            if request.recipients.is_empty() {
                messages.push("recipient list is empty".to_string());
            }
            for (i, recipient) in request.recipients.iter().enumerate() {
                let validation = validate(recipient);
                if !validation.is_valid {
                    messages.push(format!(
                        "recipient {} ({}): {}",
                        i + 1,
                        recipient,
                        validation.error.unwrap_or_default()
                    ));
                }
            }
            if request.policy.is_sweep() {
                messages.push(format!(
                    "{} cannot be used to distribute",
                    request.policy.describe()
                ));
            } else {
                messages.extend(validate_policy(&request.policy, request.recipients.len()));
            }
            validate_asset(&request.asset, &mut messages);
        }
        BatchRequest::Collect(request) => {
            if request.sources.is_empty() {
                messages.push("source wallet list is empty".to_string());
            }
            let validation = validate(&request.destination);
            if !validation.is_valid {
                messages.push(format!(
                    "destination ({}): {}",
                    request.destination,
                    validation.error.unwrap_or_default()
                ));
            }
            if request.policy.is_sweep() {
                messages.extend(validate_policy(&request.policy, request.sources.len()));
            } else {
                messages.push(format!(
                    "{} cannot be used to collect",
                    request.policy.describe()
                ));
            }
            validate_asset(&request.asset, &mut messages);
        }
        BatchRequest::Reclaim(request) => {
            if request.owners.is_empty() {
                messages.push("owner wallet list is empty".to_string());
            }
            if let Err(e) = parse_address(&request.mint) {
                messages.push(format!("token mint: {}", e));
            }
            if let Some(destination) = &request.rent_destination {
                let validation = validate(destination);
                if !validation.is_valid {
                    messages.push(format!(
                        "rent destination ({}): {}",
                        destination,
                        validation.error.unwrap_or_default()
                    ));
                }
            }
        }
    }

    messages
}

fn validate_asset(asset: &Asset, messages: &mut Vec<String>) {
    if let Asset::Token { mint, .. } = asset {
        if let Err(e) = parse_address(mint) {
            messages.push(format!("token mint: {}", e));
        }
    }
}

/// Runs a batch one item at a time. A failed item is recorded and the batch
/// moves on.
pub struct BatchOrchestrator {
    ledger: Arc<dyn Ledger>,
    assembler: InstructionAssembler,
    submitter: TransactionSubmitter,
    settings: BatchSettings,
    progress: ProgressBar,
}

impl BatchOrchestrator {
    pub fn new(ledger: Arc<dyn Ledger>, settings: BatchSettings) -> Self {
        Self {
            assembler: InstructionAssembler::new(ledger.clone()),
            submitter: TransactionSubmitter::new(ledger.clone(), settings.submitter),
            ledger,
            settings,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, request: &BatchRequest) -> Result<BatchReport, BatchError> {
        let messages = validate_request(request);
        if !messages.is_empty() {
            return Err(BatchError::Validation { messages });
        }

        let started_at = Utc::now();
        let clock = Instant::now();

        let results = match request {
            BatchRequest::Distribute(request) => self.run_distribute(request).await?,
            BatchRequest::Collect(request) => self.run_collect(request).await?,
            BatchRequest::Reclaim(request) => self.run_reclaim(request).await?,
        };

        let summary = BatchSummary::from_results(&results, started_at, clock.elapsed());
        info!(
            "Batch finished: {}/{} succeeded, {} moved, {} lamports in fees, {}ms",
            summary.success_count,
            summary.total_items,
            summary.total_amount_moved,
            summary.total_fees_lamports,
            summary.elapsed.as_millis()
        );

        Ok(BatchReport { results, summary })
    }

    async fn run_distribute(
        &self,
        request: &DistributeRequest,
    ) -> Result<Vec<TransferResult>, BatchError> {
        let source = request.source.pubkey();
        let asset = self.resolve_asset(&request.asset).await?;
        let targets = allocate(&request.recipients, &request.policy, asset.decimals()).map_err(|e| {
            BatchError::Validation {
                messages: vec![e.to_string()],
            }
        })?;

        self.preflight(&source, asset, &targets).await?;

        info!(
            "Distributing to {} recipients from {} ({})",
            targets.len(),
            source,
            request.policy.describe()
        );
        self.progress.set_length(targets.len() as u64);

        let mut results = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            info!(
                "Transfer {}/{}: {} {} to {}",
                index + 1,
                targets.len(),
                target.amount,
                asset.unit(),
                short(&target.address)
            );
            let started = Instant::now();
            let outcome = self.distribute_one(&request.source, asset, target).await;
            results.push(self.record(
                index,
                source.to_string(),
                target.address.clone(),
                target.amount,
                outcome,
                started,
            ));
            self.pace(index, targets.len()).await;
        }

        Ok(results)
    }

    async fn distribute_one(
        &self,
        source: &Keypair,
        asset: ResolvedAsset,
        target: &TransferTarget,
    ) -> Result<SubmitReceipt, TransferError> {
        let to = parse_address(&target.address).map_err(TransferError::Unknown)?;
        let units = to_base_units(target.amount, asset.decimals())
            .filter(|units| *units > 0)
            .ok_or_else(|| {
                TransferError::InsufficientFunds(format!(
                    "{} rounds to zero base units",
                    target.amount
                ))
            })?;

        self.send(source, asset.operation(source.pubkey(), to, units))
            .await
    }

    async fn run_collect(
        &self,
        request: &CollectRequest,
    ) -> Result<Vec<TransferResult>, BatchError> {
        let destination = parse_address(&request.destination).map_err(|e| BatchError::Validation {
            messages: vec![e],
        })?;
        let asset = self.resolve_asset(&request.asset).await?;

        info!(
            "Collecting from {} wallets into {} ({})",
            request.sources.len(),
            destination,
            request.policy.describe()
        );
        self.progress.set_length(request.sources.len() as u64);

        let mut results = Vec::with_capacity(request.sources.len());
        for (index, source) in request.sources.iter().enumerate() {
            let from = source.pubkey();
            let started = Instant::now();

            let (amount, outcome) = match self.sweep_units(&from, asset, &request.policy).await {
                Ok(units) => {
                    let amount = from_base_units(units, asset.decimals());
                    info!(
                        "Transfer {}/{}: {} {} from {}",
                        index + 1,
                        request.sources.len(),
                        amount,
                        asset.unit(),
                        short(&from.to_string())
                    );
                    let outcome = self
                        .send(source, asset.operation(from, destination, units))
                        .await;
                    (amount, outcome)
                }
                // A fixed sweep keeps the amount it could not cover.
                Err(e) => match request.policy {
                    AllocationPolicy::SweepFixed(amount) => (amount, Err(e)),
                    _ => (Decimal::ZERO, Err(e)),
                },
            };

            results.push(self.record(
                index,
                from.to_string(),
                request.destination.clone(),
                amount,
                outcome,
                started,
            ));
            self.pace(index, request.sources.len()).await;
        }

        Ok(results)
    }

    async fn run_reclaim(
        &self,
        request: &ReclaimRequest,
    ) -> Result<Vec<TransferResult>, BatchError> {
        let mint = parse_address(&request.mint)
            .map_err(|e| BatchError::Validation { messages: vec![e] })?;
        let destination = request
            .rent_destination
            .as_deref()
            .map(parse_address)
            .transpose()
            .map_err(|e| BatchError::Validation { messages: vec![e] })?;

        info!("Reclaiming rent from {} token accounts", request.owners.len());
        self.progress.set_length(request.owners.len() as u64);

        let mut results = Vec::with_capacity(request.owners.len());
        for (index, owner) in request.owners.iter().enumerate() {
            let from = owner.pubkey();
            let account = holding_account(&from, &mint);
            let rent_destination = destination.unwrap_or(from);
            let started = Instant::now();

            let (amount, outcome) = match self.reclaimable_rent(&account).await {
                Ok(rent) => {
                    info!(
                        "Close {}/{}: {} ({} SOL rent)",
                        index + 1,
                        request.owners.len(),
                        short(&account.to_string()),
                        from_base_units(rent, NATIVE_DECIMALS)
                    );
                    let operation = AccountOperation::CloseTokenAccount {
                        owner: from,
                        mint,
                        rent_destination,
                    };
                    let outcome = match self
                        .assembler
                        .build_account_operation(&operation, &self.context(owner))
                        .await
                    {
                        Ok(transaction) => self.submit(owner, &transaction).await,
                        Err(e) => Err(e.into()),
                    };
                    (from_base_units(rent, NATIVE_DECIMALS), outcome)
                }
                Err(e) => (Decimal::ZERO, Err(e)),
            };

            results.push(self.record(
                index,
                account.to_string(),
                rent_destination.to_string(),
                amount,
                outcome,
                started,
            ));
            self.pace(index, request.owners.len()).await;
        }

        Ok(results)
    }

    /// Lamports held by `account` when it exists and holds no tokens.
    async fn reclaimable_rent(&self, account: &Pubkey) -> Result<u64, TransferError> {
        match self.ledger.token_balance(account).await? {
            None => Err(TransferError::NotClosable(format!(
                "token account {} does not exist",
                account
            ))),
            Some(units) if units > 0 => Err(TransferError::NotClosable(format!(
                "token account {} still holds {} base units",
                account, units
            ))),
            Some(_) => Ok(self.ledger.balance(account).await?),
        }
    }

    async fn sweep_units(
        &self,
        from: &Pubkey,
        asset: ResolvedAsset,
        policy: &AllocationPolicy,
    ) -> Result<u64, TransferError> {
        let (balance, fee) = match asset {
            ResolvedAsset::Native => (
                self.ledger.balance(from).await?,
                self.settings.estimated_fee_lamports,
            ),
            // The fee is paid in SOL, so the whole token balance is movable.
            ResolvedAsset::Token { mint, .. } => (
                self.ledger
                    .token_balance(&holding_account(from, &mint))
                    .await?
                    .unwrap_or(0),
                0,
            ),
        };

        match resolve_sweep(policy, balance, fee, asset.decimals())
            .map_err(|e| TransferError::Unknown(e.to_string()))?
        {
            SweepAmount::Transfer(units) => Ok(units),
            SweepAmount::Skip(reason) => {
                info!("Skipping {}: {}", short(&from.to_string()), reason);
                Err(TransferError::InsufficientFunds(reason))
            }
        }
    }

    fn context(&self, signer: &Keypair) -> AssemblyContext {
        AssemblyContext {
            payer: signer.pubkey(),
            priority_fee_micro_lamports: self.settings.priority_fee_micro_lamports,
            compute_unit_limit: self.settings.compute_unit_limit,
            format: self.settings.format,
            address_tables: self.settings.address_tables.clone(),
        }
    }

    async fn send(
        &self,
        signer: &Keypair,
        operation: TransferOperation,
    ) -> Result<SubmitReceipt, TransferError> {
        let transaction = self
            .assembler
            .build(&operation, &self.context(signer))
            .await?;
        self.submit(signer, &transaction).await
    }

    async fn submit(
        &self,
        signer: &Keypair,
        transaction: &AssembledTransaction,
    ) -> Result<SubmitReceipt, TransferError> {
        let signers = [signer];
        Ok(self.submitter.submit(transaction, &signers[..]).await?)
    }

    async fn resolve_asset(&self, asset: &Asset) -> Result<ResolvedAsset, BatchError> {
        match asset {
            Asset::Native => Ok(ResolvedAsset::Native),
            Asset::Token { mint, decimals } => {
                let mint = parse_address(mint)
                    .map_err(|e| BatchError::Validation { messages: vec![e] })?;
                let decimals = match decimals {
                    Some(decimals) => *decimals,
                    None => self
                        .ledger
                        .mint_decimals(&mint)
                        .await
                        .map_err(BatchError::BalanceQuery)?,
                };
                Ok(ResolvedAsset::Token { mint, decimals })
            }
        }
    }

    /// Fails the batch when the source cannot cover every amount plus fees.
    async fn preflight(
        &self,
        source: &Pubkey,
        asset: ResolvedAsset,
        targets: &[TransferTarget],
    ) -> Result<(), BatchError> {
        let fees = self
            .settings
            .estimated_fee_lamports
            .saturating_mul(targets.len() as u64);
        let total_units = targets
            .iter()
            .map(|target| to_base_units(target.amount, asset.decimals()).unwrap_or(u64::MAX))
            .fold(0_u64, u64::saturating_add);

        let lamports = self
            .ledger
            .balance(source)
            .await
            .map_err(BatchError::BalanceQuery)?;

        let required_lamports = match asset {
            ResolvedAsset::Native => total_units.saturating_add(fees),
            ResolvedAsset::Token { mint, decimals } => {
                let held = self
                    .ledger
                    .token_balance(&holding_account(source, &mint))
                    .await
                    .map_err(BatchError::BalanceQuery)?
                    .unwrap_or(0);
                info!(
                    "Token balance: {} (need {})",
                    from_base_units(held, decimals),
                    from_base_units(total_units, decimals)
                );
                if held < total_units {
                    return Err(BatchError::InsufficientFunds {
                        required: from_base_units(total_units, decimals),
                        available: from_base_units(held, decimals),
                        unit: asset.unit().to_string(),
                    });
                }
                fees
            }
        };

        info!(
            "Balance: {} SOL (need {} SOL including fees)",
            from_base_units(lamports, NATIVE_DECIMALS),
            from_base_units(required_lamports, NATIVE_DECIMALS)
        );
        if lamports < required_lamports {
            return Err(BatchError::InsufficientFunds {
                required: from_base_units(required_lamports, NATIVE_DECIMALS),
                available: from_base_units(lamports, NATIVE_DECIMALS),
                unit: "SOL".to_string(),
            });
        }

        Ok(())
    }

    fn record(
        &self,
        index: usize,
        from: String,
        to: String,
        amount: Decimal,
        outcome: Result<SubmitReceipt, TransferError>,
        started: Instant,
    ) -> TransferResult {
        let duration_ms = started.elapsed().as_millis() as u64;
        let status = match outcome {
            Ok(receipt) => {
                info!("Success: {} in {}ms", receipt.signature, duration_ms);
                TransferStatus::Success {
                    signature: receipt.signature,
                    fee_lamports: receipt.fee_lamports,
                }
            }
            Err(e) => {
                warn!("Failed [{}]: {}", e.kind(), e);
                TransferStatus::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        self.progress.inc(1);

        TransferResult {
            index,
            from,
            to,
            amount,
            duration_ms,
            status,
        }
    }

    async fn pace(&self, index: usize, total: usize) {
        if !self.settings.pacing.is_zero() && index + 1 < total {
            sleep(self.settings.pacing).await;
        }
    }
}
