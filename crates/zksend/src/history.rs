//! Reconstructs the escrow links a sender created from their transaction
//! history. Only the link address is recoverable; the link key is not.

use std::collections::HashSet;

use sui_sdk_types::Address;
use tracing::debug;

use crate::error::Result;
use crate::ledger::{Ledger, MoveCallSummary, TransactionSummary};
use crate::link::LinkVariant;
use crate::network::{ContractReference, ZK_BAG_MODULE};
use crate::snapshot::LinkAssetsSnapshot;

pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Unclaimed,
    Claimed,
    Reclaimed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedLinkRecord {
    pub digest: String,
    pub created_at_ms: Option<u64>,
    pub address: Address,
    pub assets: LinkAssetsSnapshot,
    pub status: LinkStatus,
}

impl CreatedLinkRecord {
    pub fn claimed(&self) -> bool {
        self.status != LinkStatus::Unclaimed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatedLinksPage {
    pub links: Vec<CreatedLinkRecord>,
    pub cursor: Option<String>,
    pub has_next_page: bool,
}

/// Pages through a sender's history, newest first. A link's reclaim is always
/// newer than its creation, so every reclaim between the newest transaction
/// and the current page must be known before the page is classified.
pub struct HistoryScanner<'a, L: Ledger + ?Sized> {
    ledger: &'a L,
    sender: Address,
    contract: ContractReference,
    page_size: usize,
    reclaimed: HashSet<Address>,
    /// Cursor up to which `reclaimed` is complete.
    scanned_to: Option<String>,
}

impl<'a, L: Ledger + ?Sized> HistoryScanner<'a, L> {
    pub fn new(ledger: &'a L, sender: Address, contract: ContractReference) -> Self {
        Self {
            ledger,
            sender,
            contract,
            page_size: DEFAULT_PAGE_SIZE,
            reclaimed: HashSet::new(),
            scanned_to: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn next_page(&mut self, cursor: Option<&str>) -> Result<CreatedLinksPage> {
        if let Some(cursor) = cursor {
            if self.scanned_to.as_deref() != Some(cursor) {
                self.catch_up(cursor).await?;
            }
        }

        let page = self
            .ledger
            .transactions_from(self.sender, cursor, self.page_size)
            .await?;
        self.record_reclaims(&page.transactions);
        self.scanned_to = page.next_cursor.clone();

        let successful: Vec<&TransactionSummary> =
            page.transactions.iter().filter(|t| t.success).collect();

        let mut links = Vec::new();
        for tx in &successful {
            for call in bag_calls(self.contract.package_id, tx, "new") {
                let Some(address) = call.arguments.get(1).and_then(|a| tx.address_argument(*a))
                else {
                    debug!("Skipping zk_bag::new without an address input in {}", tx.digest);
                    continue;
                };

                let coins = self
                    .ledger
                    .bag_items(&self.contract, address)
                    .await?
                    .unwrap_or_default();
                let assets = LinkAssetsSnapshot::from_coins(address, LinkVariant::Escrow, coins);
                let status = if assets.is_claimable() {
                    LinkStatus::Unclaimed
                } else if self.reclaimed.contains(&address) {
                    LinkStatus::Reclaimed
                } else {
                    LinkStatus::Claimed
                };

                links.push(CreatedLinkRecord {
                    digest: tx.digest.clone(),
                    created_at_ms: tx.timestamp_ms,
                    address,
                    assets,
                    status,
                });
            }
        }
        debug!(
            "History page for {}: {} transactions, {} links",
            self.sender,
            page.transactions.len(),
            links.len()
        );

        Ok(CreatedLinksPage {
            links,
            cursor: page.next_cursor,
            has_next_page: page.has_next_page,
        })
    }
}

impl<L: Ledger + ?Sized> HistoryScanner<'_, L> {
    /// Records reclaims from the newest transaction down to `cursor`
    /// inclusive.
    async fn catch_up(&mut self, cursor: &str) -> Result<()> {
        debug!("Scanning {} history down to {} for reclaims", self.sender, cursor);
        let page_size = self.page_size.max(DEFAULT_PAGE_SIZE);
        let mut from: Option<String> = None;
        loop {
            let page = self
                .ledger
                .transactions_from(self.sender, from.as_deref(), page_size)
                .await?;
            match page.transactions.iter().position(|t| t.digest == cursor) {
                Some(last) => {
                    self.record_reclaims(&page.transactions[..=last]);
                    break;
                }
                None => self.record_reclaims(&page.transactions),
            }
            match page.next_cursor {
                Some(next) if page.has_next_page => from = Some(next),
                _ => break,
            }
        }
        self.scanned_to = Some(cursor.to_string());
        Ok(())
    }

    fn record_reclaims(&mut self, transactions: &[TransactionSummary]) {
        for tx in transactions.iter().filter(|t| t.success) {
            for call in bag_calls(self.contract.package_id, tx, "reclaim") {
                if let Some(link) = call.arguments.get(1).and_then(|a| tx.address_argument(*a)) {
                    self.reclaimed.insert(link);
                }
            }
        }
    }
}

fn bag_calls<'t>(
    package: Address,
    tx: &'t TransactionSummary,
    function: &'t str,
) -> impl Iterator<Item = &'t MoveCallSummary> + 't {
    tx.calls.iter().filter(move |call| {
        call.package == package && call.module == ZK_BAG_MODULE && call.function == function
    })
}

/// One page of links created by `sender`, starting after `cursor`.
pub async fn list_created_links<L: Ledger + ?Sized>(
    ledger: &L,
    sender: Address,
    contract: &ContractReference,
    cursor: Option<&str>,
) -> Result<CreatedLinksPage> {
    HistoryScanner::new(ledger, sender, *contract)
        .next_page(cursor)
        .await
}
