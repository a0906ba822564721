use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::assembler::{
    AccountOperation, AssemblyContext, InstructionAssembler, lookup_table_address,
};
use crate::error::LookupTableError;
use crate::ledger::Ledger;
use crate::orchestrator::BatchSettings;
use crate::submitter::{SubmitReceipt, TransactionSubmitter};

/// Hard cap of the lookup table program.
pub const LOOKUP_TABLE_MAX_ADDRESSES: usize = 256;

/// Addresses per extend transaction; more would overflow the packet size.
pub const MAX_ADDRESSES_PER_EXTEND: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedTable {
    pub table: Pubkey,
    pub receipt: SubmitReceipt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableExtension {
    pub added: Vec<Pubkey>,
    /// Requested addresses the table already held.
    pub already_present: usize,
    pub receipts: Vec<SubmitReceipt>,
}

/// Creates, extends and inspects address lookup tables owned by a keypair.
pub struct LookupTableManager {
    ledger: Arc<dyn Ledger>,
    assembler: InstructionAssembler,
    submitter: TransactionSubmitter,
    settings: BatchSettings,
}

impl LookupTableManager {
    pub fn new(ledger: Arc<dyn Ledger>, settings: BatchSettings) -> Self {
        Self {
            assembler: InstructionAssembler::new(ledger.clone()),
            submitter: TransactionSubmitter::new(ledger.clone(), settings.submitter),
            ledger,
            settings,
        }
    }

    fn context(&self, authority: &Keypair) -> AssemblyContext {
        // Tables being edited are never used to compress their own edits.
        AssemblyContext {
            payer: authority.pubkey(),
            priority_fee_micro_lamports: self.settings.priority_fee_micro_lamports,
            compute_unit_limit: self.settings.compute_unit_limit,
            format: self.settings.format,
            address_tables: Vec::new(),
        }
    }

    async fn send(
        &self,
        authority: &Keypair,
        operation: AccountOperation,
    ) -> Result<SubmitReceipt, LookupTableError> {
        let transaction = self
            .assembler
            .build_account_operation(&operation, &self.context(authority))
            .await?;
        let signers = [authority];
        Ok(self.submitter.submit(&transaction, &signers[..]).await?)
    }

    pub async fn create(&self, authority: &Keypair) -> Result<CreatedTable, LookupTableError> {
        let recent_slot = self.ledger.recent_slot().await?;
        let table = lookup_table_address(&authority.pubkey(), recent_slot);

        let receipt = self
            .send(
                authority,
                AccountOperation::CreateLookupTable {
                    authority: authority.pubkey(),
                    recent_slot,
                },
            )
            .await?;

        info!("Created lookup table {} ({})", table, receipt.signature);
        Ok(CreatedTable { table, receipt })
    }

    pub async fn addresses(&self, table: &Pubkey) -> Result<Vec<Pubkey>, LookupTableError> {
        self.ledger
            .resolve_address_table(table)
            .await?
            .ok_or(LookupTableError::Missing(*table))
    }

    /// Index of `address` inside `table`, `None` when it is not a member.
    pub async fn find(
        &self,
        table: &Pubkey,
        address: &Pubkey,
    ) -> Result<Option<usize>, LookupTableError> {
        let members = self.addresses(table).await?;
        Ok(members.iter().position(|member| member == address))
    }

    /// Adds the addresses `table` does not hold yet, in chunks of
    /// [`MAX_ADDRESSES_PER_EXTEND`]. Stops at the first failed chunk.
    pub async fn extend(
        &self,
        table: &Pubkey,
        authority: &Keypair,
        addresses: &[Pubkey],
    ) -> Result<TableExtension, LookupTableError> {
        let members = self.addresses(table).await?;
        let mut seen: HashSet<Pubkey> = members.iter().copied().collect();

        let mut added = Vec::new();
        let mut already_present = 0;
        for address in addresses {
            if members.contains(address) {
                already_present += 1;
            } else if seen.insert(*address) {
                added.push(*address);
            }
        }

        let requested = members.len() + added.len();
        if requested > LOOKUP_TABLE_MAX_ADDRESSES {
            return Err(LookupTableError::Full {
                table: *table,
                requested,
                limit: LOOKUP_TABLE_MAX_ADDRESSES,
            });
        }

        let mut receipts = Vec::new();
        for chunk in added.chunks(MAX_ADDRESSES_PER_EXTEND) {
            let receipt = self
                .send(
                    authority,
                    AccountOperation::ExtendLookupTable {
                        table: *table,
                        authority: authority.pubkey(),
                        addresses: chunk.to_vec(),
                    },
                )
                .await?;
            info!(
                "Added {} addresses to {} ({})",
                chunk.len(),
                table,
                receipt.signature
            );
            receipts.push(receipt);
        }

        Ok(TableExtension {
            added,
            already_present,
            receipts,
        })
    }
}
