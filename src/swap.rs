use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::VersionedMessage,
    pubkey::Pubkey,
    transaction::{Transaction, VersionedTransaction},
};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{AssemblyError, SwapError};

pub const DEFAULT_SWAP_API_URL: &str = "https://lite-api.jup.ag/swap/v1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapMode {
    #[default]
    ExactIn,
    ExactOut,
}

impl fmt::Display for SwapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapMode::ExactIn => f.write_str("ExactIn"),
            SwapMode::ExactOut => f.write_str("ExactOut"),
        }
    }
}

/// Quote request. `amount` is in base units of the input (or output for
/// `ExactOut`) mint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteParams {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub swap_mode: SwapMode,
    pub slippage_bps: Option<u16>,
    pub dexes: Vec<String>,
    pub exclude_dexes: Vec<String>,
    pub restrict_intermediate_tokens: Option<bool>,
    pub only_direct_routes: Option<bool>,
    pub as_legacy_transaction: Option<bool>,
    pub platform_fee_bps: Option<u16>,
    pub max_accounts: Option<u8>,
    pub dynamic_slippage: Option<bool>,
}

impl QuoteParams {
    /// Query pairs in a fixed order; unset options are omitted.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("inputMint", self.input_mint.clone()),
            ("outputMint", self.output_mint.clone()),
            ("amount", self.amount.to_string()),
            ("swapMode", self.swap_mode.to_string()),
        ];

        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                query.push((key, value));
            }
        };
        push("slippageBps", self.slippage_bps.map(|v| v.to_string()));
        push(
            "dexes",
            (!self.dexes.is_empty()).then(|| self.dexes.join(",")),
        );
        push(
            "excludeDexes",
            (!self.exclude_dexes.is_empty()).then(|| self.exclude_dexes.join(",")),
        );
        push(
            "restrictIntermediateTokens",
            self.restrict_intermediate_tokens.map(|v| v.to_string()),
        );
        push("onlyDirectRoutes", self.only_direct_routes.map(|v| v.to_string()));
        push(
            "asLegacyTransaction",
            self.as_legacy_transaction.map(|v| v.to_string()),
        );
        push("platformFeeBps", self.platform_fee_bps.map(|v| v.to_string()));
        push("maxAccounts", self.max_accounts.map(|v| v.to_string()));
        push("dynamicSlippage", self.dynamic_slippage.map(|v| v.to_string()));

        query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriorityLevel {
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityLevelWithMaxLamports {
    pub priority_level: PriorityLevel,
    pub max_lamports: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizationFeeLamports {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_level_with_max_lamports: Option<PriorityLevelWithMaxLamports>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jito_tip_lamports: Option<u64>,
}

/// Options forwarded to the aggregator when it builds swap instructions or a
/// serialized transaction. Unset options are left out of the request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransactionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap_and_unwrap_sol: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_shared_accounts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritization_fee_lamports: Option<PrioritizationFeeLamports>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_legacy_transaction: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_token_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_compute_unit_limit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_user_accounts_rpc_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_slippage: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_unit_price_micro_lamports: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockhash_slots_to_expiry: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequestBody<'a> {
    quote_response: &'a Value,
    user_public_key: String,
    #[serde(flatten)]
    config: &'a SwapTransactionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub quote: QuoteParams,
    pub user: Pubkey,
    pub config: SwapTransactionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccountMeta {
    pub pubkey: Option<String>,
    pub is_signer: Option<bool>,
    pub is_writable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInstruction {
    pub program_id: Option<String>,
    pub accounts: Option<Vec<RawAccountMeta>>,
    pub data: Option<String>,
}

/// `/swap-instructions` response as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSwapInstructions {
    pub token_ledger_instruction: Option<RawInstruction>,
    pub compute_budget_instructions: Option<Vec<RawInstruction>>,
    pub setup_instructions: Option<Vec<RawInstruction>>,
    pub swap_instruction: Option<RawInstruction>,
    pub cleanup_instruction: Option<RawInstruction>,
    pub address_lookup_table_addresses: Option<Vec<String>>,
    pub error: Option<String>,
}

/// Validated swap instructions, grouped by category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapInstructions {
    pub compute_budget: Vec<Instruction>,
    pub token_ledger: Option<Instruction>,
    pub setup: Vec<Instruction>,
    pub swap: Instruction,
    pub cleanup: Option<Instruction>,
    pub address_tables: Vec<Pubkey>,
}

fn malformed(message: String) -> AssemblyError {
    AssemblyError::MalformedInstructionPayload(message)
}

fn decode_pubkey(value: &str, label: &str) -> Result<Pubkey, AssemblyError> {
    Pubkey::from_str(value).map_err(|e| malformed(format!("{}: bad address {}: {}", label, value, e)))
}

impl RawInstruction {
    pub fn decode(&self, label: &str) -> Result<Instruction, AssemblyError> {
        let program_id = self
            .program_id
            .as_deref()
            .ok_or_else(|| malformed(format!("{}: missing programId", label)))?;
        let program_id = decode_pubkey(program_id, label)?;

        let accounts = self
            .accounts
            .as_ref()
            .ok_or_else(|| malformed(format!("{}: missing accounts", label)))?
            .iter()
            .enumerate()
            .map(|(i, meta)| meta.decode(label, i))
            .collect::<Result<Vec<_>, _>>()?;

        let data = self
            .data
            .as_deref()
            .ok_or_else(|| malformed(format!("{}: missing data", label)))?;
        let data = BASE64_STANDARD
            .decode(data)
            .map_err(|e| malformed(format!("{}: data is not base64: {}", label, e)))?;

        Ok(Instruction {
            program_id,
            accounts,
            data,
        })
    }
}

impl RawAccountMeta {
    fn decode(&self, label: &str, index: usize) -> Result<AccountMeta, AssemblyError> {
        let missing = |field: &str| malformed(format!("{}: account {} missing {}", label, index, field));

        let pubkey = decode_pubkey(self.pubkey.as_deref().ok_or_else(|| missing("pubkey"))?, label)?;
        let is_signer = self.is_signer.ok_or_else(|| missing("isSigner"))?;
        let is_writable = self.is_writable.ok_or_else(|| missing("isWritable"))?;

        Ok(if is_writable {
            AccountMeta::new(pubkey, is_signer)
        } else {
            AccountMeta::new_readonly(pubkey, is_signer)
        })
    }
}

impl RawSwapInstructions {
    pub fn decode(&self) -> Result<SwapInstructions, AssemblyError> {
        if let Some(error) = &self.error {
            return Err(malformed(format!("aggregator reported: {}", error)));
        }

        let decode_list = |list: &Option<Vec<RawInstruction>>, label: &str| {
            list.iter()
                .flatten()
                .enumerate()
                .map(|(i, raw)| raw.decode(&format!("{} {}", label, i)))
                .collect::<Result<Vec<_>, _>>()
        };

        let swap = self
            .swap_instruction
            .as_ref()
            .ok_or_else(|| malformed("missing swapInstruction".to_string()))?
            .decode("swap instruction")?;

        let address_tables = self
            .address_lookup_table_addresses
            .iter()
            .flatten()
            .map(|address| decode_pubkey(address, "address lookup table"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SwapInstructions {
            compute_budget: decode_list(&self.compute_budget_instructions, "compute budget")?,
            token_ledger: self
                .token_ledger_instruction
                .as_ref()
                .map(|raw| raw.decode("token ledger instruction"))
                .transpose()?,
            setup: decode_list(&self.setup_instructions, "setup")?,
            swap,
            cleanup: self
                .cleanup_instruction
                .as_ref()
                .map(|raw| raw.decode("cleanup instruction"))
                .transpose()?,
            address_tables,
        })
    }
}

/// `/swap` response as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSwapTransaction {
    pub swap_transaction: Option<String>,
    pub last_valid_block_height: Option<u64>,
    pub prioritization_fee_lamports: Option<u64>,
}

/// A prebuilt transaction, tagged by wire format when it is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedTransaction {
    Legacy(Transaction),
    Versioned(VersionedTransaction),
}

impl DecodedTransaction {
    pub fn is_legacy(&self) -> bool {
        matches!(self, DecodedTransaction::Legacy(_))
    }
}

/// Parses base64 transaction bytes once, tagging legacy and v0 messages.
pub fn decode_transaction(encoded: &str) -> Result<DecodedTransaction, AssemblyError> {
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| malformed(format!("transaction is not base64: {}", e)))?;
    let transaction: VersionedTransaction = bincode::deserialize(&bytes)
        .map_err(|e| malformed(format!("transaction bytes do not parse: {}", e)))?;

    Ok(match transaction.message {
        VersionedMessage::Legacy(message) => DecodedTransaction::Legacy(Transaction {
            signatures: transaction.signatures,
            message,
        }),
        VersionedMessage::V0(_) => DecodedTransaction::Versioned(transaction),
    })
}

/// Serialized swap ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedSwap {
    pub transaction: DecodedTransaction,
    pub last_valid_block_height: u64,
    pub prioritization_fee_lamports: Option<u64>,
}

impl RawSwapTransaction {
    pub fn decode(&self) -> Result<SerializedSwap, AssemblyError> {
        let encoded = self
            .swap_transaction
            .as_deref()
            .ok_or_else(|| malformed("missing swapTransaction".to_string()))?;
        let last_valid_block_height = self
            .last_valid_block_height
            .ok_or_else(|| malformed("missing lastValidBlockHeight".to_string()))?;

        Ok(SerializedSwap {
            transaction: decode_transaction(encoded)?,
            last_valid_block_height,
            prioritization_fee_lamports: self.prioritization_fee_lamports,
        })
    }
}

#[async_trait]
pub trait SwapProvider: Send + Sync {
    async fn quote(&self, params: &QuoteParams) -> Result<Value, SwapError>;

    async fn swap_instructions(
        &self,
        quote: &Value,
        user: &Pubkey,
        config: &SwapTransactionConfig,
    ) -> Result<RawSwapInstructions, SwapError>;

    async fn swap_transaction(
        &self,
        quote: &Value,
        user: &Pubkey,
        config: &SwapTransactionConfig,
    ) -> Result<RawSwapTransaction, SwapError>;
}

/// Fetches a quote and the matching instruction payload.
pub async fn quote_and_decompose(
    provider: &dyn SwapProvider,
    request: &SwapRequest,
) -> Result<RawSwapInstructions, SwapError> {
    let quote = provider.quote(&request.quote).await?;
    let out_amount = quote
        .get("outAmount")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    debug!(
        "Quote for {} -> {}: {}",
        request.quote.input_mint, request.quote.output_mint, out_amount
    );
    provider
        .swap_instructions(&quote, &request.user, &request.config)
        .await
}

/// Fetches a quote and a serialized transaction built by the aggregator.
pub async fn build_serialized(
    provider: &dyn SwapProvider,
    request: &SwapRequest,
) -> Result<RawSwapTransaction, SwapError> {
    let quote = provider.quote(&request.quote).await?;
    provider
        .swap_transaction(&quote, &request.user, &request.config)
        .await
}

/// HTTP client for the Jupiter swap API.
#[derive(Debug, Clone)]
pub struct JupiterClient {
    client: reqwest::Client,
    base_url: String,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SwapError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SwapError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        quote: &Value,
        user: &Pubkey,
        config: &SwapTransactionConfig,
    ) -> Result<T, SwapError> {
        let body = SwapRequestBody {
            quote_response: quote,
            user_public_key: user.to_string(),
            config,
        };
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| SwapError::Http(e.to_string()))?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SwapError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SwapError::Api {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| SwapError::Decode(e.to_string()))
}

#[async_trait]
impl SwapProvider for JupiterClient {
    async fn quote(&self, params: &QuoteParams) -> Result<Value, SwapError> {
        let response = self
            .client
            .get(format!("{}/quote", self.base_url))
            .query(&params.to_query())
            .send()
            .await
            .map_err(|e| SwapError::Http(e.to_string()))?;
        read_json(response).await
    }

    async fn swap_instructions(
        &self,
        quote: &Value,
        user: &Pubkey,
        config: &SwapTransactionConfig,
    ) -> Result<RawSwapInstructions, SwapError> {
        self.post("/swap-instructions", quote, user, config).await
    }

    async fn swap_transaction(
        &self,
        quote: &Value,
        user: &Pubkey,
        config: &SwapTransactionConfig,
    ) -> Result<RawSwapTransaction, SwapError> {
        self.post("/swap", quote, user, config).await
    }
}
