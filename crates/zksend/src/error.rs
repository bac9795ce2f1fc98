use thiserror::Error;

use crate::ledger::LedgerError;
use crate::link::LinkVariant;

pub type Result<T> = std::result::Result<T, ZkSendError>;

/// Errors raised while encoding links, building transactions or executing claims.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZkSendError {
    #[error("Malformed link token: {0}")]
    MalformedToken(String),

    #[error("Unknown link variant discriminator '{0}'")]
    UnknownVariant(char),

    #[error("Link is {actual:?} but the operation requires {expected:?}")]
    VariantMismatch {
        expected: LinkVariant,
        actual: LinkVariant,
    },

    #[error("Invalid link url: {0}")]
    InvalidUrl(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid coin type '{0}'")]
    InvalidCoinType(String),

    #[error("Invalid amount '{input}': {reason}")]
    InvalidAmount { input: String, reason: String },

    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    #[error("Unknown network '{0}'")]
    UnknownNetwork(String),

    #[error("Escrow links need a zk_bag contract reference")]
    MissingContract,

    #[error("Batch of {requested} links exceeds the limit of {max}")]
    BatchSizeExceeded { requested: usize, max: usize },

    #[error("Link assets have already been claimed")]
    AlreadyClaimed,

    #[error("Transaction {digest} failed: {}", .raw_errors.join("; "))]
    ClaimExecution {
        digest: String,
        raw_errors: Vec<String>,
    },

    #[error("Metadata lookup failed for {coin_type}: {reason}")]
    MetadataLookup { coin_type: String, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ZkSendError {
    /// True when the failure happened after talking to the ledger, so a retry
    /// may observe different state. Codec and validation errors return false.
    pub fn reached_network(&self) -> bool {
        matches!(
            self,
            ZkSendError::AlreadyClaimed
                | ZkSendError::ClaimExecution { .. }
                | ZkSendError::MetadataLookup { .. }
                | ZkSendError::Ledger(_)
        )
    }
}
