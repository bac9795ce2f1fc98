//! Claim links for Sui assets.
//!
//! A link wraps a single-purpose Ed25519 key. Funding moves assets to the
//! link's address (direct links) or into a zk_bag escrow keyed by it (escrow
//! links); whoever holds the link can later sweep them to any address, and
//! the sender can reclaim them until then.

pub mod bulk;
pub mod claim;
pub mod coin;
pub mod error;
pub mod funding;
pub mod history;
pub mod keypair;
pub mod ledger;
pub mod link;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod metadata;
pub mod network;
pub mod session;
pub mod snapshot;
pub mod transaction;

pub use sui_sdk_types::Address;

pub use claim::{
    ClaimMode, build_claim_transaction, build_reclaim_transaction, claim_link, reclaim_link,
    submit_transaction,
};
pub use coin::{ClaimSpec, CoinType, format_amount, parse_amount};
pub use error::{Result, ZkSendError};
pub use funding::{
    CLAIM_GAS_RESERVE, MAX_LINKS_PER_BATCH, build_batch_funding_transaction,
    build_funding_transaction,
};
pub use history::{CreatedLinkRecord, CreatedLinksPage, HistoryScanner, LinkStatus, list_created_links};
pub use keypair::{Keypair, TransactionSigner, derive_address};
pub use ledger::{Ledger, LedgerError};
pub use link::{ClaimLink, LinkRouting, LinkToken, LinkVariant, decode, encode};
pub use metadata::{CoinDisplay, CoinInfo, MetadataCache};
pub use network::{ContractReference, Network};
pub use session::{LinkSession, LinkState};
pub use snapshot::{LinkAssetsSnapshot, fetch_snapshot};
pub use transaction::UnsignedTransaction;
