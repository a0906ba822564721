use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use solana_sdk::signature::Signature;
use std::time::Duration;

use crate::error::ErrorKind;

/// One destination and the amount it should receive, in display units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub address: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Success {
        signature: Signature,
        fee_lamports: u64,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

/// Outcome of one batch item. Produced exactly once per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub index: usize,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub duration_ms: u64,
    pub status: TransferStatus,
}

impl TransferResult {
    pub fn success(&self) -> bool {
        matches!(self.status, TransferStatus::Success { .. })
    }

    pub fn signature(&self) -> Option<&Signature> {
        match &self.status {
            TransferStatus::Success { signature, .. } => Some(signature),
            TransferStatus::Failed { .. } => None,
        }
    }

    pub fn fee_lamports(&self) -> u64 {
        match self.status {
            TransferStatus::Success { fee_lamports, .. } => fee_lamports,
            TransferStatus::Failed { .. } => 0,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.status {
            TransferStatus::Success { .. } => None,
            TransferStatus::Failed { kind, .. } => Some(kind),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TransferStatus::Success { .. } => None,
            TransferStatus::Failed { message, .. } => Some(message),
        }
    }
}

/// Aggregate accounting for one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Sum of `amount` over successful items only.
    pub total_amount_moved: Decimal,
    /// Fees actually charged, read back from confirmed transactions.
    pub total_fees_lamports: u64,
    pub average_duration_ms: u64,
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn from_results(
        results: &[TransferResult],
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let (success_count, total_amount_moved, total_fees_lamports) = results
            .iter()
            .filter(|result| result.success())
            .fold((0, Decimal::ZERO, 0_u64), |(count, amount, fees), result| {
                (
                    count + 1,
                    amount + result.amount,
                    fees.saturating_add(result.fee_lamports()),
                )
            });

        let average_duration_ms = if results.is_empty() {
            0
        } else {
            results.iter().map(|result| result.duration_ms).sum::<u64>() / results.len() as u64
        };

        Self {
            total_items: results.len(),
            success_count,
            failure_count: results.len() - success_count,
            total_amount_moved,
            total_fees_lamports,
            average_duration_ms,
            elapsed,
            started_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<TransferResult>,
    pub summary: BatchSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, amount: i64, ok: bool) -> TransferResult {
        let status = if ok {
            TransferStatus::Success {
                signature: Signature::default(),
                fee_lamports: 5_000,
            }
        } else {
            TransferStatus::Failed {
                kind: ErrorKind::TransportFailure,
                message: "connection reset".to_string(),
            }
        };
        TransferResult {
            index,
            from: "from".to_string(),
            to: "to".to_string(),
            amount: Decimal::from(amount),
            duration_ms: 250,
            status,
        }
    }

    #[test]
    fn summary_counts_only_successful_amounts_and_fees() {
        let results = vec![
            result(0, 10, true),
            result(1, 99, false),
            result(2, 20, true),
            result(3, 77, false),
            result(4, 30, true),
        ];

        let summary =
            BatchSummary::from_results(&results, Utc::now(), Duration::from_millis(1_500));

        assert_eq!(summary.total_items, 5);
        assert_eq!(summary.success_count, 3);
        assert_eq!(summary.failure_count, 2);
        assert_eq!(summary.total_amount_moved, Decimal::from(60));
        assert_eq!(summary.total_fees_lamports, 15_000);
        assert_eq!(summary.average_duration_ms, 250);
    }

    #[test]
    fn empty_batch_has_zero_totals() {
        let summary = BatchSummary::from_results(&[], Utc::now(), Duration::ZERO);
        assert_eq!(summary.total_items, 0);
        assert_eq!(summary.total_amount_moved, Decimal::ZERO);
        assert_eq!(summary.total_fees_lamports, 0);
    }

    #[test]
    fn failed_result_exposes_kind_and_message() {
        let failed = result(1, 5, false);
        assert!(!failed.success());
        assert_eq!(failed.error_kind(), Some(ErrorKind::TransportFailure));
        assert_eq!(failed.error(), Some("connection reset"));
        assert!(failed.signature().is_none());
        assert_eq!(failed.fee_lamports(), 0);
    }
}
