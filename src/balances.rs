use futures::future::join_all;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::address::parse_address;
use crate::allocation::from_base_units;
use crate::assembler::holding_account;
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::orchestrator::NATIVE_DECIMALS;

/// Pause between batches to stay under public RPC rate limits.
pub const BATCH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletBalance {
    pub address: String,
    pub sol: Decimal,
    /// Held amount of the requested mint, 0 when the wallet has no token account.
    pub token: Option<Decimal>,
    pub fetch_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceFailure {
    pub address: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BalanceSheet {
    pub balances: Vec<WalletBalance>,
    pub failures: Vec<BalanceFailure>,
    pub elapsed: Duration,
}

impl BalanceSheet {
    pub fn total_sol(&self) -> Decimal {
        self.balances.iter().map(|b| b.sol).sum()
    }

    pub fn total_token(&self) -> Decimal {
        self.balances.iter().filter_map(|b| b.token).sum()
    }
}

/// Token whose balance is read next to SOL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenQuery {
    pub mint: Pubkey,
    pub decimals: u8,
}

async fn fetch_wallet_balance(
    ledger: Arc<dyn Ledger>,
    address: String,
    token: Option<TokenQuery>,
) -> Result<WalletBalance, String> {
    let start_time = Instant::now();
    let pubkey = parse_address(&address)?;
    let rpc_error = |e: LedgerError| format!("RPC error for {}: {}", address, e);

    let lamports = ledger.balance(&pubkey).await.map_err(rpc_error)?;
    let token = match token {
        Some(query) => {
            let held = ledger
                .token_balance(&holding_account(&pubkey, &query.mint))
                .await
                .map_err(rpc_error)?
                .unwrap_or(0);
            Some(from_base_units(held, query.decimals))
        }
        None => None,
    };

    Ok(WalletBalance {
        sol: from_base_units(lamports, NATIVE_DECIMALS),
        token,
        fetch_time_ms: start_time.elapsed().as_millis() as u64,
        address,
    })
}

/// Fetches balances in chunks of `batch_size`, in parallel within a chunk.
/// Output keeps the input order; failed lookups are reported separately.
pub async fn fetch_balances(
    ledger: Arc<dyn Ledger>,
    addresses: &[String],
    batch_size: usize,
    token: Option<TokenQuery>,
) -> BalanceSheet {
    let total_start = Instant::now();
    let batch_size = batch_size.max(1);
    let batch_count = addresses.len().div_ceil(batch_size);
    let mut sheet = BalanceSheet::default();

    info!("Loading {} wallet addresses", addresses.len());

    for (batch_idx, chunk) in addresses.chunks(batch_size).enumerate() {
        info!(
            "Processing batch {} ({} addresses)",
            batch_idx + 1,
            chunk.len()
        );
        let batch_start = Instant::now();

        let tasks: Vec<_> = chunk
            .iter()
            .map(|address| {
                let ledger = Arc::clone(&ledger);
                let address = address.clone();
                tokio::spawn(async move { fetch_wallet_balance(ledger, address, token).await })
            })
            .collect();

        for (address, result) in chunk.iter().zip(join_all(tasks).await) {
            match result {
                Ok(Ok(balance)) => sheet.balances.push(balance),
                Ok(Err(error)) => {
                    warn!("Failed to fetch balance: {}", error);
                    sheet.failures.push(BalanceFailure {
                        address: address.clone(),
                        error,
                    });
                }
                Err(e) => {
                    warn!("Task panicked: {}", e);
                    sheet.failures.push(BalanceFailure {
                        address: address.clone(),
                        error: format!("task panicked: {}", e),
                    });
                }
            }
        }

        info!(
            "Batch {} completed in {:.2}s",
            batch_idx + 1,
            batch_start.elapsed().as_secs_f64()
        );

        if batch_idx + 1 < batch_count {
            tokio::time::sleep(BATCH_DELAY).await;
        }
    }

    sheet.elapsed = total_start.elapsed();
    info!(
        "Fetched all balances in {:.2}s",
        sheet.elapsed.as_secs_f64()
    );
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use solana_sdk::signature::{Keypair, Signer};
    use std::str::FromStr;

    #[tokio::test]
    async fn fetches_every_wallet_in_input_order() {
        let wallets: Vec<Pubkey> = (0..5).map(|_| Keypair::new().pubkey()).collect();
        let mut ledger = MockLedger::new();
        for (i, wallet) in wallets.iter().enumerate() {
            ledger = ledger.with_balance(*wallet, (i as u64 + 1) * 500_000_000);
        }
        let addresses: Vec<String> = wallets.iter().map(|w| w.to_string()).collect();

        let sheet = fetch_balances(Arc::new(ledger), &addresses, 2, None).await;

        assert!(sheet.failures.is_empty());
        assert_eq!(
            sheet.balances.iter().map(|b| b.address.clone()).collect::<Vec<_>>(),
            addresses
        );
        assert_eq!(sheet.balances[0].sol, Decimal::from_str("0.5").unwrap());
        assert_eq!(sheet.total_sol(), Decimal::from_str("7.5").unwrap());
        assert!(sheet.balances.iter().all(|b| b.token.is_none()));
    }

    #[tokio::test]
    async fn bad_addresses_and_rpc_errors_are_reported_separately() {
        let good = Keypair::new().pubkey();
        let flaky = Keypair::new().pubkey();
        let ledger = MockLedger::new()
            .with_balance(good, 1_000_000_000)
            .with_failing_balance(flaky);
        let addresses = vec![good.to_string(), "bogus".to_string(), flaky.to_string()];

        let sheet = fetch_balances(Arc::new(ledger), &addresses, 25, None).await;

        assert_eq!(sheet.balances.len(), 1);
        assert_eq!(sheet.failures.len(), 2);
        assert_eq!(sheet.failures[0].address, "bogus");
        assert!(sheet.failures[1].error.starts_with("RPC error for"));
    }

    #[tokio::test]
    async fn token_balances_default_to_zero_without_account() {
        let mint = Pubkey::new_unique();
        let holder = Keypair::new().pubkey();
        let stranger = Keypair::new().pubkey();
        let ledger = MockLedger::new()
            .with_balance(holder, 1)
            .with_token_balance(holder, mint, 2_500_000);
        let addresses = vec![holder.to_string(), stranger.to_string()];

        let sheet = fetch_balances(
            Arc::new(ledger),
            &addresses,
            10,
            Some(TokenQuery { mint, decimals: 6 }),
        )
        .await;

        assert_eq!(sheet.balances[0].token, Some(Decimal::from_str("2.5").unwrap()));
        assert_eq!(sheet.balances[1].token, Some(Decimal::ZERO));
        assert_eq!(sheet.total_token(), Decimal::from_str("2.5").unwrap());
    }
}
