//! Boundary between link logic and the chain.

use async_trait::async_trait;
use sui_sdk_types::Address;
use thiserror::Error;

use crate::coin::CoinType;
use crate::keypair::TransactionSigner;
use crate::network::ContractReference;
use crate::transaction::{Argument, ObjectRef, UnsignedTransaction};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected ledger response: {0}")]
    InvalidResponse(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedCoin {
    pub object_ref: ObjectRef,
    pub coin_type: CoinType,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failure { errors: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub digest: String,
    pub status: ExecutionStatus,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinMetadata {
    pub symbol: String,
    pub decimals: u8,
    pub icon_url: Option<String>,
}

/// Transaction input as reported by history queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallInput {
    Address(Address),
    Object(Address),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCallSummary {
    pub package: Address,
    pub module: String,
    pub function: String,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    pub digest: String,
    pub sender: Address,
    pub timestamp_ms: Option<u64>,
    pub success: bool,
    pub inputs: Vec<CallInput>,
    pub calls: Vec<MoveCallSummary>,
}

impl TransactionSummary {
    /// Address value of a pure input referenced by `argument`.
    pub fn address_argument(&self, argument: Argument) -> Option<Address> {
        match argument {
            Argument::Input(index) => match self.inputs.get(index as usize) {
                Some(CallInput::Address(address)) => Some(*address),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionSummary>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Coin objects owned by `owner`.
    async fn owned_coins(&self, owner: Address) -> Result<Vec<OwnedCoin>, LedgerError>;

    /// Coins held in the zk_bag for `link`; `None` when no bag exists.
    async fn bag_items(
        &self,
        contract: &ContractReference,
        link: Address,
    ) -> Result<Option<Vec<OwnedCoin>>, LedgerError>;

    /// Signs, submits and waits for `tx`. Once submission starts it runs to
    /// completion even if the caller stops waiting.
    async fn execute(
        &self,
        tx: &UnsignedTransaction,
        signers: &[&dyn TransactionSigner],
    ) -> Result<ExecutionOutcome, LedgerError>;

    /// Transactions sent by `sender`, newest first.
    async fn transactions_from(
        &self,
        sender: Address,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<TransactionPage, LedgerError>;

    async fn coin_metadata(&self, coin_type: &CoinType)
    -> Result<Option<CoinMetadata>, LedgerError>;
}
