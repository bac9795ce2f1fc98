//! Coin display metadata, cached per coin type.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::warn;

use crate::coin::{CoinType, SUI_DECIMALS, format_amount};
use crate::error::{Result, ZkSendError};
use crate::ledger::Ledger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinInfo {
    pub coin_type: CoinType,
    pub symbol: String,
    pub decimals: u8,
    pub icon_url: Option<String>,
}

/// What to show for a coin type. Lookups that fail degrade to the raw type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoinDisplay {
    Known(CoinInfo),
    Unknown(CoinType),
}

impl CoinDisplay {
    pub fn label(&self) -> &str {
        match self {
            CoinDisplay::Known(info) => &info.symbol,
            CoinDisplay::Unknown(coin_type) => coin_type.as_str(),
        }
    }

    /// Formats a base-unit amount; unknown coins show raw base units.
    pub fn format(&self, amount: u64) -> String {
        match self {
            CoinDisplay::Known(info) => {
                format!("{} {}", format_amount(amount, info.decimals), info.symbol)
            }
            CoinDisplay::Unknown(coin_type) => format!("{amount} {coin_type}"),
        }
    }
}

pub struct MetadataCache {
    entries: RwLock<HashMap<CoinType, CoinInfo>>,
}

impl MetadataCache {
    /// Cache seeded with SUI.
    pub fn new() -> Self {
        let sui = CoinType::sui();
        let mut entries = HashMap::new();
        entries.insert(
            sui.clone(),
            CoinInfo {
                coin_type: sui,
                symbol: "SUI".to_string(),
                decimals: SUI_DECIMALS,
                icon_url: None,
            },
        );
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn cached(&self, coin_type: &CoinType) -> Option<CoinInfo> {
        self.entries.read().get(coin_type).cloned()
    }

    pub async fn get<L: Ledger + ?Sized>(&self, ledger: &L, coin_type: &CoinType) -> Result<CoinInfo> {
        if let Some(info) = self.cached(coin_type) {
            return Ok(info);
        }

        let lookup_error = |reason: String| ZkSendError::MetadataLookup {
            coin_type: coin_type.to_string(),
            reason,
        };
        let metadata = ledger
            .coin_metadata(coin_type)
            .await
            .map_err(|e| lookup_error(e.to_string()))?
            .ok_or_else(|| lookup_error("no metadata published".to_string()))?;

        let info = CoinInfo {
            coin_type: coin_type.clone(),
            symbol: metadata.symbol,
            decimals: metadata.decimals,
            icon_url: metadata.icon_url,
        };
        self.entries.write().insert(coin_type.clone(), info.clone());
        Ok(info)
    }

    /// Never fails: lookup errors are logged and shown as the raw type.
    pub async fn describe<L: Ledger + ?Sized>(&self, ledger: &L, coin_type: &CoinType) -> CoinDisplay {
        match self.get(ledger, coin_type).await {
            Ok(info) => CoinDisplay::Known(info),
            Err(e) => {
                warn!("Falling back to raw coin type: {}", e);
                CoinDisplay::Unknown(coin_type.clone())
            }
        }
    }

    /// Describes each type independently; one failure does not affect others.
    pub async fn describe_all<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        coin_types: &[CoinType],
    ) -> HashMap<CoinType, CoinDisplay> {
        let mut out = HashMap::with_capacity(coin_types.len());
        for coin_type in coin_types {
            if !out.contains_key(coin_type) {
                let display = self.describe(ledger, coin_type).await;
                out.insert(coin_type.clone(), display);
            }
        }
        out
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CoinMetadata;
    use crate::memory::MemoryLedger;

    #[tokio::test]
    async fn test_sui_is_seeded() {
        let cache = MetadataCache::new();
        let info = cache.cached(&CoinType::sui()).unwrap();
        assert_eq!(info.symbol, "SUI");
        assert_eq!(info.decimals, 9);
    }

    #[tokio::test]
    async fn test_lookup_and_fallback() {
        let ledger = MemoryLedger::default();
        let usdc = CoinType::parse("0x3::usdc::USDC").unwrap();
        let unknown = CoinType::parse("0x4::mystery::COIN").unwrap();
        ledger.set_coin_metadata(
            &usdc,
            CoinMetadata {
                symbol: "USDC".into(),
                decimals: 6,
                icon_url: None,
            },
        );

        let cache = MetadataCache::new();
        let displays = cache
            .describe_all(&ledger, &[usdc.clone(), unknown.clone()])
            .await;
        assert_eq!(displays[&usdc].format(500_000), "0.5 USDC");
        assert_eq!(displays[&unknown], CoinDisplay::Unknown(unknown.clone()));
        assert_eq!(displays[&unknown].format(7), format!("7 {unknown}"));
        assert!(cache.cached(&usdc).is_some());

        assert!(matches!(
            cache.get(&ledger, &unknown).await,
            Err(ZkSendError::MetadataLookup { .. })
        ));
    }
}
