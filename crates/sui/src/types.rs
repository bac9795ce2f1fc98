//! Wire shapes of the Sui JSON-RPC responses we read.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
    #[serde(rename = "hasNextPage", default)]
    pub has_next_page: bool,
}

#[derive(Debug, Deserialize)]
pub struct CoinJson {
    #[serde(rename = "coinType")]
    pub coin_type: String,
    #[serde(rename = "coinObjectId")]
    pub coin_object_id: String,
    pub version: String,
    pub digest: String,
    pub balance: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectResponse {
    #[serde(default)]
    pub data: Option<ObjectData>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectData {
    #[serde(rename = "objectId")]
    pub object_id: String,
    pub version: String,
    pub digest: String,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub owner: Option<Value>,
    #[serde(default)]
    pub content: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionBlockResponse {
    pub digest: String,
    #[serde(rename = "timestampMs", default)]
    pub timestamp_ms: Option<String>,
    #[serde(default)]
    pub transaction: Option<TransactionBlockJson>,
    #[serde(default)]
    pub effects: Option<EffectsJson>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionBlockJson {
    pub data: TransactionDataJson,
}

#[derive(Debug, Deserialize)]
pub struct TransactionDataJson {
    pub sender: String,
    /// Tagged by `kind`; only `ProgrammableTransaction` is interpreted.
    pub transaction: Value,
}

#[derive(Debug, Deserialize)]
pub struct EffectsJson {
    pub status: StatusJson,
}

#[derive(Debug, Deserialize)]
pub struct StatusJson {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CoinMetadataJson {
    pub decimals: u8,
    pub symbol: String,
    #[serde(rename = "iconUrl", default)]
    pub icon_url: Option<String>,
}

/// Numbers the node may encode either as JSON numbers or decimal strings.
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}
