use solana_sdk::{
    address_lookup_table::instruction::{
        create_lookup_table, derive_lookup_table_address, extend_lookup_table,
    },
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    message::{AddressLookupTableAccount, Message, VersionedMessage, v0},
    pubkey::Pubkey,
    system_instruction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::address::short;
use crate::error::AssemblyError;
use crate::ledger::{Ledger, RecencyToken};
use crate::swap::{RawSwapInstructions, SwapInstructions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageFormat {
    Legacy,
    #[default]
    V0,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOperation {
    Native {
        from: Pubkey,
        to: Pubkey,
        lamports: u64,
    },
    /// SPL transfer between the associated token accounts of two wallets.
    Token {
        mint: Pubkey,
        decimals: u8,
        owner: Pubkey,
        destination_owner: Pubkey,
        amount: u64,
    },
}

/// Account housekeeping that moves no value of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOperation {
    CreateLookupTable {
        authority: Pubkey,
        recent_slot: u64,
    },
    ExtendLookupTable {
        table: Pubkey,
        authority: Pubkey,
        addresses: Vec<Pubkey>,
    },
    /// Closes the owner's holding account for `mint`; its rent goes to
    /// `rent_destination`. The account must be empty.
    CloseTokenAccount {
        owner: Pubkey,
        mint: Pubkey,
        rent_destination: Pubkey,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyContext {
    pub payer: Pubkey,
    pub priority_fee_micro_lamports: u64,
    pub compute_unit_limit: Option<u32>,
    pub format: MessageFormat,
    pub address_tables: Vec<Pubkey>,
}

/// Which optional instruction categories of a swap payload to keep. The swap
/// instruction itself is always kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionFilter {
    pub include_compute_budget: bool,
    pub include_token_ledger: bool,
    pub include_setup: bool,
    pub include_cleanup: bool,
}

impl Default for InstructionFilter {
    fn default() -> Self {
        Self {
            include_compute_budget: true,
            include_token_ledger: true,
            include_setup: true,
            include_cleanup: true,
        }
    }
}

/// Lookup tables that resolved. Missing or unreadable tables are left out.
#[derive(Debug, Clone, Default)]
pub struct AddressTableResolution {
    accounts: Vec<AddressLookupTableAccount>,
}

impl AddressTableResolution {
    pub async fn resolve(ledger: &dyn Ledger, addresses: &[Pubkey]) -> Self {
        let mut accounts: Vec<AddressLookupTableAccount> = Vec::with_capacity(addresses.len());

        for address in addresses {
            if accounts.iter().any(|table| table.key == *address) {
                continue;
            }
            match ledger.resolve_address_table(address).await {
                Ok(Some(members)) => {
                    debug!("Resolved lookup table {} ({} addresses)", address, members.len());
                    accounts.push(AddressLookupTableAccount {
                        key: *address,
                        addresses: members,
                    });
                }
                Ok(None) => warn!("Lookup table {} does not exist, skipping", address),
                Err(e) => warn!("Failed to resolve lookup table {}: {}", address, e),
            }
        }

        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn into_accounts(self) -> Vec<AddressLookupTableAccount> {
        self.accounts
    }
}

/// Ordered instructions plus everything needed to compile a message.
#[derive(Debug, Clone)]
pub struct AssembledTransaction {
    pub payer: Pubkey,
    pub instructions: Vec<Instruction>,
    pub recency: RecencyToken,
    pub format: MessageFormat,
    pub lookup_tables: Vec<AddressLookupTableAccount>,
}

impl AssembledTransaction {
    pub fn compile(&self) -> Result<VersionedMessage, AssemblyError> {
        match self.format {
            MessageFormat::Legacy => Ok(VersionedMessage::Legacy(Message::new_with_blockhash(
                &self.instructions,
                Some(&self.payer),
                &self.recency.blockhash,
            ))),
            MessageFormat::V0 => v0::Message::try_compile(
                &self.payer,
                &self.instructions,
                &self.lookup_tables,
                self.recency.blockhash,
            )
            .map(VersionedMessage::V0)
            .map_err(|e| AssemblyError::Compile(e.to_string())),
        }
    }
}

/// Compute-budget prefix. Zero values produce no instruction.
pub fn compute_budget_instructions(
    priority_fee_micro_lamports: u64,
    compute_unit_limit: Option<u32>,
) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(2);
    if let Some(units) = compute_unit_limit.filter(|units| *units > 0) {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(units));
    }
    if priority_fee_micro_lamports > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            priority_fee_micro_lamports,
        ));
    }
    instructions
}

/// Address of the table `authority` creates at `recent_slot`.
pub fn lookup_table_address(authority: &Pubkey, recent_slot: u64) -> Pubkey {
    derive_lookup_table_address(authority, recent_slot).0
}

/// Associated token account holding `mint` for `owner`.
pub fn holding_account(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    get_associated_token_address(owner, mint)
}

pub struct InstructionAssembler {
    ledger: Arc<dyn Ledger>,
}

impl InstructionAssembler {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Orders compute-budget, holding-account creation (when the destination
    /// has none) and the transfer itself.
    pub async fn build(
        &self,
        operation: &TransferOperation,
        context: &AssemblyContext,
    ) -> Result<AssembledTransaction, AssemblyError> {
        let mut instructions = compute_budget_instructions(
            context.priority_fee_micro_lamports,
            context.compute_unit_limit,
        );

        match operation {
            TransferOperation::Native { from, to, lamports } => {
                instructions.push(system_instruction::transfer(from, to, *lamports));
            }
            TransferOperation::Token {
                mint,
                decimals,
                owner,
                destination_owner,
                amount,
            } => {
                let source = holding_account(owner, mint);
                let destination = holding_account(destination_owner, mint);

                if !self.ledger.account_exists(&destination).await? {
                    debug!(
                        "Creating token account {} for {}",
                        short(&destination.to_string()),
                        short(&destination_owner.to_string())
                    );
                    instructions.push(create_associated_token_account(
                        owner,
                        destination_owner,
                        mint,
                        &spl_token::id(),
                    ));
                }

                let transfer = spl_token::instruction::transfer_checked(
                    &spl_token::id(),
                    &source,
                    mint,
                    &destination,
                    owner,
                    &[],
                    *amount,
                    *decimals,
                )
                .map_err(|e| AssemblyError::Instruction(e.to_string()))?;
                instructions.push(transfer);
            }
        }

        self.finish(instructions, context, &context.address_tables)
            .await
    }

    /// Compute-budget prefix, then the single housekeeping instruction. The
    /// context's payer funds new table storage.
    pub async fn build_account_operation(
        &self,
        operation: &AccountOperation,
        context: &AssemblyContext,
    ) -> Result<AssembledTransaction, AssemblyError> {
        let mut instructions = compute_budget_instructions(
            context.priority_fee_micro_lamports,
            context.compute_unit_limit,
        );

        match operation {
            AccountOperation::CreateLookupTable {
                authority,
                recent_slot,
            } => {
                let (create, table) = create_lookup_table(*authority, context.payer, *recent_slot);
                debug!("Creating lookup table {}", table);
                instructions.push(create);
            }
            AccountOperation::ExtendLookupTable {
                table,
                authority,
                addresses,
            } => {
                if addresses.is_empty() {
                    return Err(AssemblyError::Instruction(format!(
                        "no addresses to add to lookup table {}",
                        table
                    )));
                }
                instructions.push(extend_lookup_table(
                    *table,
                    *authority,
                    Some(context.payer),
                    addresses.clone(),
                ));
            }
            AccountOperation::CloseTokenAccount {
                owner,
                mint,
                rent_destination,
            } => {
                let account = holding_account(owner, mint);
                let close = spl_token::instruction::close_account(
                    &spl_token::id(),
                    &account,
                    rent_destination,
                    owner,
                    &[],
                )
                .map_err(|e| AssemblyError::Instruction(e.to_string()))?;
                instructions.push(close);
            }
        }

        self.finish(instructions, context, &context.address_tables)
            .await
    }

    /// Orders a decoded swap payload: compute-budget, token ledger, setup,
    /// swap, cleanup. Excluded categories are dropped.
    pub async fn build_decomposed(
        &self,
        payload: &SwapInstructions,
        context: &AssemblyContext,
        filter: InstructionFilter,
    ) -> Result<AssembledTransaction, AssemblyError> {
        let mut instructions = Vec::new();

        if filter.include_compute_budget {
            instructions.extend(payload.compute_budget.iter().cloned());
        }
        if filter.include_token_ledger {
            instructions.extend(payload.token_ledger.iter().cloned());
        }
        if filter.include_setup {
            instructions.extend(payload.setup.iter().cloned());
        }
        instructions.push(payload.swap.clone());
        if filter.include_cleanup {
            instructions.extend(payload.cleanup.iter().cloned());
        }

        let mut tables = payload.address_tables.clone();
        tables.extend(context.address_tables.iter().copied());

        self.finish(instructions, context, &tables).await
    }

    /// Validates an untrusted payload, then assembles it.
    pub async fn build_from_payload(
        &self,
        payload: &RawSwapInstructions,
        context: &AssemblyContext,
        filter: InstructionFilter,
    ) -> Result<AssembledTransaction, AssemblyError> {
        let decoded = payload.decode()?;
        self.build_decomposed(&decoded, context, filter).await
    }

    async fn finish(
        &self,
        instructions: Vec<Instruction>,
        context: &AssemblyContext,
        tables: &[Pubkey],
    ) -> Result<AssembledTransaction, AssemblyError> {
        let lookup_tables = match context.format {
            MessageFormat::V0 if !tables.is_empty() => {
                let resolution = AddressTableResolution::resolve(self.ledger.as_ref(), tables).await;
                if resolution.is_empty() {
                    warn!("None of {} lookup tables resolved", tables.len());
                } else {
                    debug!("Using {} of {} lookup tables", resolution.len(), tables.len());
                }
                resolution.into_accounts()
            }
            MessageFormat::Legacy if !tables.is_empty() => {
                warn!("Legacy messages cannot use lookup tables, ignoring {}", tables.len());
                Vec::new()
            }
            _ => Vec::new(),
        };

        // Fetched last so the blockhash is as fresh as possible.
        let recency = self.ledger.latest_recency_token().await?;

        Ok(AssembledTransaction {
            payer: context.payer,
            instructions,
            recency,
            format: context.format,
            lookup_tables,
        })
    }
}
