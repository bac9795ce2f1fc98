use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};
use zksend::LedgerError;

const MAX_READ_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Minimal Sui JSON-RPC client. Cheap to clone.
#[derive(Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Single JSON-RPC call. A `null` result deserializes into `R` as-is, so
    /// optional lookups can use `Option<T>`.
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("JSON-RPC {} (id {})", method, id);

        let response = self
            .http
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("{}: {}", method, e)))?;
        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| LedgerError::Transport(format!("{}: {}", method, e)))?;
        if !status.is_success() && response_text.is_empty() {
            return Err(LedgerError::Transport(format!("{}: HTTP {}", method, status)));
        }

        let parsed: RpcResponse = serde_json::from_str(&response_text)
            .map_err(|e| LedgerError::InvalidResponse(format!("{}: {}", method, e)))?;
        if let Some(error) = parsed.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(parsed.result.unwrap_or(Value::Null))
            .map_err(|e| LedgerError::InvalidResponse(format!("{}: {}", method, e)))
    }

    /// Like [`call`](Self::call) but retries transport failures. Only for
    /// read methods.
    pub async fn read<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, LedgerError> {
        let mut attempt = 1;
        loop {
            match self.call(method, params.clone()).await {
                Err(LedgerError::Transport(e)) if attempt < MAX_READ_ATTEMPTS => {
                    warn!(
                        "{} failed (attempt {}/{}): {}, retrying",
                        method, attempt, MAX_READ_ATTEMPTS, e
                    );
                    sleep(RETRY_DELAY).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
