use solana_sdk::{
    signature::Signature,
    signer::signers::Signers,
    transaction::VersionedTransaction,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::assembler::AssembledTransaction;
use crate::error::SubmissionError;
use crate::ledger::{Ledger, SendConfig, SignatureStatus};
use crate::swap::DecodedTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitterConfig {
    pub max_retries: usize,
    pub skip_preflight: bool,
    /// Advisory simulation before send. A failed simulation is logged, not fatal.
    pub simulate: bool,
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            skip_preflight: true,
            simulate: false,
            poll_interval: Duration::from_millis(500),
            confirm_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Built,
    Signed,
    Simulated,
    Sent,
    Confirmed,
    Failed,
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmissionState::Built => "built",
            SubmissionState::Signed => "signed",
            SubmissionState::Simulated => "simulated",
            SubmissionState::Sent => "sent",
            SubmissionState::Confirmed => "confirmed",
            SubmissionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub signature: Signature,
    /// Fee read back from the landed transaction, 0 when unavailable.
    pub fee_lamports: u64,
}

/// Tracks one transaction through its lifecycle.
struct Submission {
    state: SubmissionState,
    signature: Option<Signature>,
}

impl Submission {
    fn new() -> Self {
        Self {
            state: SubmissionState::Built,
            signature: None,
        }
    }

    fn advance(&mut self, next: SubmissionState) {
        debug!(
            "Transaction {} {} -> {}",
            self.signature.map(|s| s.to_string()).unwrap_or_default(),
            self.state,
            next
        );
        self.state = next;
    }

    fn fail<T>(&mut self, error: SubmissionError) -> Result<T, SubmissionError> {
        self.advance(SubmissionState::Failed);
        Err(error)
    }
}

/// Signs, optionally simulates, sends and confirms one transaction.
pub struct TransactionSubmitter {
    ledger: Arc<dyn Ledger>,
    config: SubmitterConfig,
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn Ledger>, config: SubmitterConfig) -> Self {
        Self { ledger, config }
    }

    /// Signs an assembled transaction and drives it to confirmation.
    ///
    /// The fee payer's signature lands first because signatures follow the
    /// message's static key order.
    pub async fn submit<T: Signers + ?Sized>(
        &self,
        transaction: &AssembledTransaction,
        signers: &T,
    ) -> Result<SubmitReceipt, SubmissionError> {
        let mut submission = Submission::new();

        let message = match transaction.compile() {
            Ok(message) => message,
            Err(e) => return submission.fail(SubmissionError::Signing(e.to_string())),
        };
        let signed = match VersionedTransaction::try_new(message, signers) {
            Ok(signed) => signed,
            Err(e) => return submission.fail(SubmissionError::Signing(e.to_string())),
        };

        self.drive(&mut submission, signed, transaction.recency.last_valid_block_height)
            .await
    }

    /// Signs a prebuilt transaction according to its wire format and drives it
    /// to confirmation.
    pub async fn submit_decoded<T: Signers + ?Sized>(
        &self,
        transaction: DecodedTransaction,
        last_valid_block_height: u64,
        signers: &T,
    ) -> Result<SubmitReceipt, SubmissionError> {
        let mut submission = Submission::new();

        let signed = match transaction {
            DecodedTransaction::Legacy(mut legacy) => {
                let blockhash = legacy.message.recent_blockhash;
                match legacy.try_sign(signers, blockhash) {
                    Ok(()) => VersionedTransaction::from(legacy),
                    Err(e) => return submission.fail(SubmissionError::Signing(e.to_string())),
                }
            }
            DecodedTransaction::Versioned(versioned) => {
                match VersionedTransaction::try_new(versioned.message, signers) {
                    Ok(signed) => signed,
                    Err(e) => return submission.fail(SubmissionError::Signing(e.to_string())),
                }
            }
        };

        self.drive(&mut submission, signed, last_valid_block_height)
            .await
    }

    async fn drive(
        &self,
        submission: &mut Submission,
        transaction: VersionedTransaction,
        last_valid_block_height: u64,
    ) -> Result<SubmitReceipt, SubmissionError> {
        let Some(signature) = transaction.signatures.first().copied() else {
            return submission.fail(SubmissionError::Signing(
                "transaction carries no signatures".to_string(),
            ));
        };
        submission.signature = Some(signature);
        submission.advance(SubmissionState::Signed);

        if self.config.simulate {
            match self.ledger.simulate_transaction(&transaction).await {
                Ok(outcome) => match outcome.error {
                    Some(error) => warn!(
                        "Simulation of {} failed, sending anyway: {} (logs: {:?})",
                        signature, error, outcome.logs
                    ),
                    None => debug!(
                        "Simulation of {} consumed {:?} compute units",
                        signature, outcome.units_consumed
                    ),
                },
                Err(e) => warn!("Simulation of {} could not run: {}", signature, e),
            }
            submission.advance(SubmissionState::Simulated);
        }

        let send_config = SendConfig {
            max_retries: self.config.max_retries,
            skip_preflight: self.config.skip_preflight,
        };
        if let Err(e) = self.ledger.send_transaction(&transaction, send_config).await {
            return submission.fail(SubmissionError::TransportFailure(e.to_string()));
        }
        submission.advance(SubmissionState::Sent);

        if let Err(e) = self
            .await_confirmation(signature, last_valid_block_height)
            .await
        {
            return submission.fail(e);
        }
        submission.advance(SubmissionState::Confirmed);

        let fee_lamports = match self.ledger.transaction_fee(&signature).await {
            Ok(Some(fee)) => fee,
            Ok(None) => {
                warn!("Fee for {} not available yet", signature);
                0
            }
            Err(e) => {
                warn!("Failed to read fee for {}: {}", signature, e);
                0
            }
        };

        info!("Transaction confirmed with signature: {}", signature);
        Ok(SubmitReceipt {
            signature,
            fee_lamports,
        })
    }

    /// Polls until the signature lands, fails on chain or its blockhash
    /// expires. Transient polling errors are retried until the deadline.
    async fn await_confirmation(
        &self,
        signature: Signature,
        last_valid_block_height: u64,
    ) -> Result<(), SubmissionError> {
        let deadline = Instant::now() + self.config.confirm_timeout;

        loop {
            match self.ledger.signature_status(&signature).await {
                Ok(SignatureStatus::Confirmed) => return Ok(()),
                Ok(SignatureStatus::Failed(reason)) => {
                    return Err(SubmissionError::TransactionRejected { signature, reason });
                }
                Ok(SignatureStatus::Pending) => {}
                Err(e) => debug!("Status poll for {} failed: {}", signature, e),
            }

            match self.ledger.block_height().await {
                Ok(height) if height > last_valid_block_height => {
                    return Err(SubmissionError::Expired { signature });
                }
                Ok(_) => {}
                Err(e) => debug!("Block height poll failed: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(SubmissionError::Expired { signature });
            }
            sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{AssemblyContext, InstructionAssembler, MessageFormat, TransferOperation};
    use crate::ledger::mock::MockLedger;
    use solana_sdk::{
        hash::Hash,
        pubkey::Pubkey,
        signature::{Keypair, Signer},
        system_instruction,
        transaction::Transaction,
    };

    fn fast_config() -> SubmitterConfig {
        SubmitterConfig {
            poll_interval: Duration::from_millis(1),
            confirm_timeout: Duration::from_millis(50),
            ..SubmitterConfig::default()
        }
    }

    async fn assembled(ledger: Arc<MockLedger>, payer: &Keypair) -> AssembledTransaction {
        InstructionAssembler::new(ledger)
            .build(
                &TransferOperation::Native {
                    from: payer.pubkey(),
                    to: Pubkey::new_unique(),
                    lamports: 1_000,
                },
                &AssemblyContext {
                    payer: payer.pubkey(),
                    format: MessageFormat::V0,
                    ..AssemblyContext::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn confirmed_transaction_reports_fee() {
        let ledger = Arc::new(MockLedger::new().with_fee(5_000));
        let payer = Keypair::new();
        let tx = assembled(ledger.clone(), &payer).await;
        let submitter = TransactionSubmitter::new(ledger.clone(), fast_config());

        let receipt = submitter.submit(&tx, &[&payer]).await.unwrap();

        assert_eq!(receipt.fee_lamports, 5_000);
        let sent = ledger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].signatures[0], receipt.signature);
        assert_eq!(
            ledger.send_configs()[0],
            SendConfig {
                max_retries: 2,
                skip_preflight: true
            }
        );
        assert_eq!(ledger.simulate_calls(), 0);
    }

    #[tokio::test]
    async fn on_chain_error_is_rejected_without_retry() {
        let ledger = Arc::new(MockLedger::new().reject_send(0));
        let payer = Keypair::new();
        let tx = assembled(ledger.clone(), &payer).await;
        let submitter = TransactionSubmitter::new(ledger.clone(), fast_config());

        let err = submitter.submit(&tx, &[&payer]).await.unwrap_err();

        assert!(matches!(err, SubmissionError::TransactionRejected { .. }));
        assert!(err.to_string().contains("custom program error"));
        assert_eq!(ledger.send_calls(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let ledger = Arc::new(MockLedger::new().fail_send(0));
        let payer = Keypair::new();
        let tx = assembled(ledger.clone(), &payer).await;
        let submitter = TransactionSubmitter::new(ledger.clone(), fast_config());

        let err = submitter.submit(&tx, &[&payer]).await.unwrap_err();
        assert!(matches!(err, SubmissionError::TransportFailure(_)));
    }

    #[tokio::test]
    async fn past_block_height_expires() {
        let ledger = Arc::new(
            MockLedger::new()
                .never_confirm()
                .with_block_heights(300, 250),
        );
        let payer = Keypair::new();
        let tx = assembled(ledger.clone(), &payer).await;
        let submitter = TransactionSubmitter::new(ledger.clone(), fast_config());

        let err = submitter.submit(&tx, &[&payer]).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Expired { .. }));
    }

    #[tokio::test]
    async fn timeout_expires_when_never_confirmed() {
        let ledger = Arc::new(MockLedger::new().never_confirm());
        let payer = Keypair::new();
        let tx = assembled(ledger.clone(), &payer).await;
        let submitter = TransactionSubmitter::new(ledger.clone(), fast_config());

        let err = submitter.submit(&tx, &[&payer]).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Expired { .. }));
    }

    #[tokio::test]
    async fn failed_simulation_is_advisory() {
        let ledger = Arc::new(MockLedger::new().with_simulation_error("InsufficientFundsForFee"));
        let payer = Keypair::new();
        let tx = assembled(ledger.clone(), &payer).await;
        let submitter = TransactionSubmitter::new(
            ledger.clone(),
            SubmitterConfig {
                simulate: true,
                ..fast_config()
            },
        );

        submitter.submit(&tx, &[&payer]).await.unwrap();
        assert_eq!(ledger.simulate_calls(), 1);
        assert_eq!(ledger.send_calls(), 1);
    }

    #[tokio::test]
    async fn missing_signer_fails_before_send() {
        let ledger = Arc::new(MockLedger::new());
        let payer = Keypair::new();
        let tx = assembled(ledger.clone(), &payer).await;
        let submitter = TransactionSubmitter::new(ledger.clone(), fast_config());

        let stranger = Keypair::new();
        let err = submitter.submit(&tx, &[&stranger]).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Signing(_)));
        assert_eq!(ledger.send_calls(), 0);
    }

    #[tokio::test]
    async fn decoded_legacy_transaction_is_signed_and_sent() {
        let ledger = Arc::new(MockLedger::new());
        let payer = Keypair::new();
        let instruction =
            system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 10);
        let mut unsigned = Transaction::new_with_payer(&[instruction], Some(&payer.pubkey()));
        unsigned.message.recent_blockhash = Hash::new_unique();

        let submitter = TransactionSubmitter::new(ledger.clone(), fast_config());
        let receipt = submitter
            .submit_decoded(DecodedTransaction::Legacy(unsigned), 250, &[&payer])
            .await
            .unwrap();

        let sent = ledger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].signatures[0], receipt.signature);
        assert_ne!(receipt.signature, Signature::default());
    }
}
