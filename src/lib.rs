pub mod address;
pub mod allocation;
pub mod assembler;
pub mod balances;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lookup_table;
pub mod orchestrator;
pub mod report;
pub mod submitter;
pub mod swap;
pub mod types;

pub use allocation::AllocationPolicy;
pub use error::{BatchError, ErrorKind, TransferError};
pub use ledger::{Ledger, RpcLedger};
pub use orchestrator::{Asset, BatchOrchestrator, BatchRequest, BatchSettings};
pub use types::{BatchReport, BatchSummary, TransferResult, TransferStatus};
