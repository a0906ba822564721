use rust_decimal::Decimal;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::fmt;
use thiserror::Error;

/// Coarse classification attached to every failed transfer result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    InsufficientFunds,
    MalformedInstructionPayload,
    TransportFailure,
    TransactionRejected,
    Expired,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::MalformedInstructionPayload => "MALFORMED_PAYLOAD",
            ErrorKind::TransportFailure => "TRANSPORT",
            ErrorKind::TransactionRejected => "REJECTED",
            ErrorKind::Expired => "EXPIRED",
            ErrorKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the ledger RPC boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("rpc request failed: {message}")]
    Rpc { message: String },

    #[error("account {address} holds malformed data: {message}")]
    AccountData { address: String, message: String },
}

impl LedgerError {
    pub fn rpc(error: impl fmt::Display) -> Self {
        LedgerError::Rpc {
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("invalid allocation policy: {0}")]
    InvalidAllocationPolicy(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("malformed instruction payload: {0}")]
    MalformedInstructionPayload(String),

    #[error("failed to build instruction: {0}")]
    Instruction(String),

    #[error("failed to compile transaction message: {0}")]
    Compile(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Failures talking to the swap aggregator API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("swap api request failed: {0}")]
    Http(String),

    #[error("swap api returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("swap api response could not be decoded: {0}")]
    Decode(String),
}

/// Failure of one submission attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("failed to sign transaction: {0}")]
    Signing(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("transaction {signature} rejected: {reason}")]
    TransactionRejected { signature: Signature, reason: String },

    #[error("transaction {signature} expired before confirmation")]
    Expired { signature: Signature },
}

impl SubmissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmissionError::Signing(_) => ErrorKind::Unknown,
            SubmissionError::TransportFailure(_) => ErrorKind::TransportFailure,
            SubmissionError::TransactionRejected { .. } => ErrorKind::TransactionRejected,
            SubmissionError::Expired { .. } => ErrorKind::Expired,
        }
    }
}

impl From<LedgerError> for SubmissionError {
    fn from(error: LedgerError) -> Self {
        SubmissionError::TransportFailure(error.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupTableError {
    #[error("lookup table {0} does not exist")]
    Missing(Pubkey),

    #[error("lookup table {table} would hold {requested} addresses, the limit is {limit}")]
    Full {
        table: Pubkey,
        requested: usize,
        limit: usize,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

/// Per-item error. Never escapes the orchestrator; it is folded into a failed
/// `TransferResult`.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The account cannot be closed in its current state.
    #[error("cannot close account: {0}")]
    NotClosable(String),

    #[error("{0}")]
    Unknown(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            TransferError::Assembly(AssemblyError::MalformedInstructionPayload(_)) => {
                ErrorKind::MalformedInstructionPayload
            }
            TransferError::Assembly(AssemblyError::Ledger(_)) => ErrorKind::TransportFailure,
            TransferError::Assembly(AssemblyError::Instruction(_) | AssemblyError::Compile(_)) => {
                ErrorKind::Unknown
            }
            TransferError::Submission(error) => error.kind(),
            TransferError::Ledger(_) => ErrorKind::TransportFailure,
            TransferError::NotClosable(_) => ErrorKind::Validation,
            TransferError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

/// Errors that abort a whole batch before any transaction is sent.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("request validation failed: {}", messages.join("; "))]
    Validation { messages: Vec<String> },

    #[error("insufficient funds: need {required} {unit}, have {available} {unit}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
        unit: String,
    },

    #[error("pre-flight balance query failed: {0}")]
    BalanceQuery(#[source] LedgerError),
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchError::Validation { .. } => ErrorKind::Validation,
            BatchError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            BatchError::BalanceQuery(_) => ErrorKind::TransportFailure,
        }
    }
}
