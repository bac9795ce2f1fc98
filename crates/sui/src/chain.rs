use std::env;

use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;
use sui_sdk_types as sui;
use tracing::{debug, warn};
use zksend::coin::normalize_address;
use zksend::keypair::{ED25519_FLAG, SUI_PRIVATE_KEY_PREFIX};
use zksend::ledger::OwnedCoin;
use zksend::transaction::ObjectRef;
use zksend::{CoinType, Keypair, LedgerError};

use crate::client::JsonRpcClient;
use crate::types::{CoinJson, ObjectResponse, Page, as_u64};

const COIN_PAGE_SIZE: usize = 50;

/// Load the wallet key from `SUI_SECRET_KEY`
pub fn load_wallet_from_env() -> Result<Keypair> {
    let raw = env::var("SUI_SECRET_KEY")
        .map_err(|_| anyhow::anyhow!("SUI_SECRET_KEY is not set"))?;
    parse_secret_key(&raw)
}

/// Wallet key from `SUI_SECRET_KEY` when it is set. A set but malformed key
/// is an error.
pub fn load_optional_wallet_from_env() -> Result<Option<Keypair>> {
    parse_optional_secret_key(env::var("SUI_SECRET_KEY").ok().as_deref())
}

pub fn parse_optional_secret_key(raw: Option<&str>) -> Result<Option<Keypair>> {
    raw.map(parse_secret_key).transpose()
}

/// Accepts `suiprivkey` bech32, base64 or hex, optionally prefixed with
/// `scheme:` and with or without the scheme flag byte.
pub fn parse_secret_key(raw: &str) -> Result<Keypair> {
    let key_part = raw.trim();
    let key_part = key_part.split_once(':').map(|(_, b)| b).unwrap_or(key_part);

    if key_part.starts_with(SUI_PRIVATE_KEY_PREFIX) {
        debug!("Decoding secret key as bech32 suiprivkey");
        return Ok(Keypair::from_sui_private_key(key_part)?);
    }

    let hex_part = key_part.strip_prefix("0x").unwrap_or(key_part);
    let looks_hex =
        matches!(hex_part.len(), 64 | 66) && hex_part.chars().all(|c| c.is_ascii_hexdigit());
    let mut bytes = if looks_hex {
        hex::decode(hex_part)?
    } else {
        match BASE64.decode(key_part) {
            Ok(v) => v,
            Err(_) => {
                debug!("Secret key not base64; trying hex");
                hex::decode(hex_part)?
            }
        }
    };

    if bytes.len() == 33 {
        if bytes[0] != ED25519_FLAG {
            return Err(anyhow::anyhow!("unsupported key scheme flag; only ed25519 supported"));
        }
        bytes.remove(0);
    }

    let secret: [u8; 32] = bytes
        .get(..32)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| anyhow::anyhow!("secret key must contain at least 32 bytes"))?;
    Ok(Keypair::from_secret_bytes(secret))
}

/// Get reference gas price from the network
pub async fn reference_gas_price(client: &JsonRpcClient) -> Result<u64, LedgerError> {
    let value: serde_json::Value = client.read("suix_getReferenceGasPrice", json!([])).await?;
    let price = as_u64(&value)
        .ok_or_else(|| LedgerError::InvalidResponse(format!("gas price: {}", value)))?;
    debug!("Using reference gas price: {}", price);
    Ok(price)
}

/// All coins owned by `owner`, or only those of `coin_type`.
pub async fn owned_coins(
    client: &JsonRpcClient,
    owner: sui::Address,
    coin_type: Option<&CoinType>,
) -> Result<Vec<OwnedCoin>, LedgerError> {
    let mut coins = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page: Page<CoinJson> = match coin_type {
            Some(coin_type) => {
                client
                    .read(
                        "suix_getCoins",
                        json!([owner.to_string(), coin_type.as_str(), cursor, COIN_PAGE_SIZE]),
                    )
                    .await?
            }
            None => {
                client
                    .read(
                        "suix_getAllCoins",
                        json!([owner.to_string(), cursor, COIN_PAGE_SIZE]),
                    )
                    .await?
            }
        };
        for coin in page.data {
            match parse_coin(&coin) {
                Some(parsed) => coins.push(parsed),
                None => warn!("Skipping unparseable coin {:?}", coin),
            }
        }
        if !page.has_next_page || page.next_cursor.is_none() {
            break;
        }
        cursor = page.next_cursor;
    }
    debug!("{} owns {} coin objects", owner, coins.len());
    Ok(coins)
}

/// Version at which a shared object was first shared.
pub async fn initial_shared_version(
    client: &JsonRpcClient,
    object_id: sui::Address,
) -> Result<u64, LedgerError> {
    let response: ObjectResponse = client
        .read("sui_getObject", json!([object_id.to_string(), {"showOwner": true}]))
        .await?;
    response
        .data
        .as_ref()
        .and_then(|data| data.owner.as_ref())
        .and_then(|owner| owner.pointer("/Shared/initial_shared_version"))
        .and_then(as_u64)
        .ok_or_else(|| LedgerError::InvalidResponse(format!("{} is not a shared object", object_id)))
}

pub fn parse_address(input: &str) -> Option<sui::Address> {
    normalize_address(input)?.parse().ok()
}

pub fn parse_coin(coin: &CoinJson) -> Option<OwnedCoin> {
    Some(OwnedCoin {
        object_ref: ObjectRef {
            object_id: parse_address(&coin.coin_object_id)?,
            version: coin.version.parse().ok()?,
            digest: coin.digest.clone(),
        },
        coin_type: CoinType::parse(&coin.coin_type).ok()?,
        balance: coin.balance.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "suiprivkey1qqg9ex8p8e8fdz2ex5r0muptts3e4zctv8eahdxcrl5vne73szs365yfhkp";

    #[test]
    fn test_parse_bech32_key() {
        let keypair = parse_secret_key(TEST_KEY).unwrap();
        let scheme_prefixed = parse_secret_key(&format!("ed25519:{}", TEST_KEY)).unwrap();
        assert_eq!(keypair.address(), scheme_prefixed.address());
    }

    #[test]
    fn test_parse_base64_and_hex_keys() {
        let keypair = parse_secret_key(TEST_KEY).unwrap();
        let secret = keypair.secret_bytes();

        let mut flagged = vec![ED25519_FLAG];
        flagged.extend_from_slice(&secret);
        let from_base64 = parse_secret_key(&BASE64.encode(&flagged)).unwrap();
        assert_eq!(from_base64.address(), keypair.address());

        let from_hex = parse_secret_key(&format!("0x{}", hex::encode(secret))).unwrap();
        assert_eq!(from_hex.address(), keypair.address());
        let bare_hex = parse_secret_key(&hex::encode(secret)).unwrap();
        assert_eq!(bare_hex.address(), keypair.address());
    }

    #[test]
    fn test_parse_short_key_fails() {
        assert!(parse_secret_key(&hex::encode([7u8; 16])).is_err());
        assert!(parse_secret_key("not a key").is_err());
    }

    #[test]
    fn test_optional_key() {
        assert!(parse_optional_secret_key(None).unwrap().is_none());

        let keypair = parse_optional_secret_key(Some(TEST_KEY)).unwrap().unwrap();
        assert_eq!(keypair.address(), parse_secret_key(TEST_KEY).unwrap().address());

        assert!(parse_optional_secret_key(Some("suiprivkey1garbage")).is_err());
    }

    #[test]
    fn test_parse_coin() {
        let coin = CoinJson {
            coin_type: "0x2::sui::SUI".to_string(),
            coin_object_id: "0xab".to_string(),
            version: "3".to_string(),
            digest: "11111111111111111111111111111111".to_string(),
            balance: "25".to_string(),
        };
        let parsed = parse_coin(&coin).unwrap();
        assert!(parsed.coin_type.is_sui());
        assert_eq!(parsed.balance, 25);
        assert_eq!(parsed.object_ref.version, 3);
    }
}
