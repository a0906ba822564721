use std::fmt;

use crate::balances::BalanceSheet;
use crate::types::{BatchReport, TransferStatus};

pub struct ResultsTable<'a>(pub &'a BatchReport);

impl fmt::Display for ResultsTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;

        writeln!(f, "\n{:-^80}", " RESULTS SUMMARY ")?;
        writeln!(
            f,
            "{:<5} {:<18} {:<88} {:<14} {:<10} {:<20} {:<20}",
            "No.", "Status", "Signature", "Amount", "Time (ms)", "From", "To"
        )?;
        writeln!(f, "{:-^80}", "")?;

        for result in &report.results {
            let (status, signature) = match &result.status {
                TransferStatus::Success { signature, .. } => {
                    ("SUCCESS".to_string(), signature.to_string())
                }
                TransferStatus::Failed { kind, .. } => (format!("FAILED {}", kind), "-".to_string()),
            };

            writeln!(
                f,
                "{:<5} {:<18} {:<88} {:<14} {:<10} {:<20} {:<20}",
                result.index + 1,
                status,
                signature,
                result.amount,
                result.duration_ms,
                crate::address::short(&result.from),
                crate::address::short(&result.to)
            )?;
            if let Some(error) = result.error() {
                writeln!(f, "    Error details: {}", error)?;
            }
        }

        let summary = &report.summary;
        writeln!(f, "\n{:-^80}", " STATISTICS ")?;
        writeln!(f, "Started at: {}", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "Total transfers: {}", summary.total_items)?;
        writeln!(f, "Successful: {}", summary.success_count)?;
        writeln!(f, "Failed: {}", summary.failure_count)?;
        writeln!(f, "Total moved: {}", summary.total_amount_moved)?;
        writeln!(f, "Total fees: {} lamports", summary.total_fees_lamports)?;
        writeln!(f, "Average duration: {}ms", summary.average_duration_ms)?;
        write!(f, "Total execution time: {}ms", summary.elapsed.as_millis())
    }
}

pub struct BalanceTable<'a> {
    pub sheet: &'a BalanceSheet,
    /// Column header for the token balance, when one was requested.
    pub token_label: Option<&'a str>,
}

impl fmt::Display for BalanceTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sheet = self.sheet;

        writeln!(f, "\nWallet Balance Results:")?;
        match self.token_label {
            Some(label) => writeln!(
                f,
                "{:<44} | {:<15} | {:<20} | {:<8}",
                "Address", "Balance (SOL)", label, "Time (ms)"
            )?,
            None => writeln!(
                f,
                "{:<44} | {:<15} | {:<8}",
                "Address", "Balance (SOL)", "Time (ms)"
            )?,
        }
        writeln!(f, "{}", "-".repeat(75))?;

        for balance in &sheet.balances {
            match (self.token_label, balance.token) {
                (Some(_), Some(token)) => writeln!(
                    f,
                    "{:<44} | {:<15} | {:<20} | {:<8}",
                    balance.address, balance.sol, token, balance.fetch_time_ms
                )?,
                _ => writeln!(
                    f,
                    "{:<44} | {:<15} | {:<8}",
                    balance.address, balance.sol, balance.fetch_time_ms
                )?,
            }
        }

        for failure in &sheet.failures {
            writeln!(f, "{:<44} | FAILED: {}", failure.address, failure.error)?;
        }

        write!(
            f,
            "\nSummary: Fetched {} balances ({} failed), total {} SOL",
            sheet.balances.len(),
            sheet.failures.len(),
            sheet.total_sol()
        )?;
        if self.token_label.is_some() {
            write!(f, ", {} tokens", sheet.total_token())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances::{BalanceFailure, WalletBalance};
    use crate::error::ErrorKind;
    use crate::types::{BatchSummary, TransferResult};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use solana_sdk::signature::Signature;
    use std::time::Duration;

    fn report() -> BatchReport {
        let results = vec![
            TransferResult {
                index: 0,
                from: "Source1111111111111111111111111111111111111".to_string(),
                to: "Dest11111111111111111111111111111111111111".to_string(),
                amount: Decimal::new(15, 1),
                duration_ms: 400,
                status: TransferStatus::Success {
                    signature: Signature::default(),
                    fee_lamports: 5_000,
                },
            },
            TransferResult {
                index: 1,
                from: "Source1111111111111111111111111111111111111".to_string(),
                to: "Dest22222222222222222222222222222222222222".to_string(),
                amount: Decimal::ONE,
                duration_ms: 200,
                status: TransferStatus::Failed {
                    kind: ErrorKind::Expired,
                    message: "blockhash expired".to_string(),
                },
            },
        ];
        let summary = BatchSummary::from_results(&results, Utc::now(), Duration::from_millis(900));
        BatchReport { results, summary }
    }

    #[test]
    fn results_table_lists_items_and_statistics() {
        let text = ResultsTable(&report()).to_string();

        assert!(text.contains("RESULTS SUMMARY"));
        assert!(text.contains("SUCCESS"));
        assert!(text.contains("FAILED EXPIRED"));
        assert!(text.contains("    Error details: blockhash expired"));
        assert!(text.contains("Successful: 1"));
        assert!(text.contains("Failed: 1"));
        assert!(text.contains("Total moved: 1.5"));
        assert!(text.contains("Total fees: 5000 lamports"));
        assert!(text.contains("Average duration: 300ms"));
        assert!(text.ends_with("Total execution time: 900ms"));
    }

    #[test]
    fn balance_table_reports_failures_and_totals() {
        let sheet = BalanceSheet {
            balances: vec![WalletBalance {
                address: "Wallet11111111111111111111111111111111111".to_string(),
                sol: Decimal::new(25, 1),
                token: Some(Decimal::from(7)),
                fetch_time_ms: 12,
            }],
            failures: vec![BalanceFailure {
                address: "bogus".to_string(),
                error: "invalid address".to_string(),
            }],
            elapsed: Duration::from_millis(20),
        };

        let text = BalanceTable {
            sheet: &sheet,
            token_label: Some("USDC"),
        }
        .to_string();

        assert!(text.contains("USDC"));
        assert!(text.contains("FAILED: invalid address"));
        assert!(text.ends_with("Fetched 1 balances (1 failed), total 2.5 SOL, 7 tokens"));
    }
}
