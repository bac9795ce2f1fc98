use sui_sdk_types::Address;
use tracing::debug;

use crate::coin::CoinType;
use crate::error::{Result, ZkSendError};
use crate::funding::CLAIM_GAS_RESERVE;
use crate::ledger::{Ledger, OwnedCoin};
use crate::link::LinkVariant;
use crate::network::ContractReference;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBalance {
    pub coin_type: CoinType,
    pub amount: u64,
}

/// Point-in-time view of what a link holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAssetsSnapshot {
    pub address: Address,
    pub variant: LinkVariant,
    /// Every coin object behind the link, including the gas reserve of
    /// direct links.
    pub coins: Vec<OwnedCoin>,
    /// Claimable amounts per coin type, zero entries omitted.
    pub balances: Vec<AssetBalance>,
}

impl LinkAssetsSnapshot {
    pub fn from_coins(address: Address, variant: LinkVariant, coins: Vec<OwnedCoin>) -> Self {
        let mut balances: Vec<AssetBalance> = Vec::new();
        for coin in &coins {
            match balances.iter_mut().find(|b| b.coin_type == coin.coin_type) {
                Some(balance) => balance.amount = balance.amount.saturating_add(coin.balance),
                None => balances.push(AssetBalance {
                    coin_type: coin.coin_type.clone(),
                    amount: coin.balance,
                }),
            }
        }

        // Direct links pay their own claim gas out of the reserve
        if variant == LinkVariant::Direct {
            for balance in balances.iter_mut().filter(|b| b.coin_type.is_sui()) {
                balance.amount = balance.amount.saturating_sub(CLAIM_GAS_RESERVE);
            }
        }
        balances.retain(|b| b.amount > 0);

        Self {
            address,
            variant,
            coins,
            balances,
        }
    }

    pub fn is_claimable(&self) -> bool {
        !self.balances.is_empty()
    }

    pub fn balance_of(&self, coin_type: &CoinType) -> u64 {
        self.balances
            .iter()
            .find(|b| &b.coin_type == coin_type)
            .map(|b| b.amount)
            .unwrap_or(0)
    }
}

/// Reads the current assets behind a link address.
pub async fn fetch_snapshot<L: Ledger + ?Sized>(
    ledger: &L,
    address: Address,
    variant: LinkVariant,
    contract: Option<&ContractReference>,
) -> Result<LinkAssetsSnapshot> {
    let coins = match variant {
        LinkVariant::Direct => ledger.owned_coins(address).await?,
        LinkVariant::Escrow => {
            let contract = contract.ok_or(ZkSendError::MissingContract)?;
            ledger.bag_items(contract, address).await?.unwrap_or_default()
        }
    };
    debug!(
        "Snapshot of {} link {}: {} coin objects",
        variant.as_str(),
        address,
        coins.len()
    );
    Ok(LinkAssetsSnapshot::from_coins(address, variant, coins))
}
