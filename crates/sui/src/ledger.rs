use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use sui_crypto::SuiSigner;
use sui_crypto::ed25519::Ed25519PrivateKey;
use sui_sdk_types as sui;
use tracing::{debug, info, warn};
use zksend::ledger::{
    CallInput, CoinMetadata, ExecutionOutcome, ExecutionStatus, MoveCallSummary, OwnedCoin,
    TransactionPage, TransactionSummary,
};
use zksend::transaction::{Argument, ObjectRef};
use zksend::{
    CoinType, ContractReference, Ledger, LedgerError, TransactionSigner, UnsignedTransaction,
};

use crate::builder;
use crate::chain::{self, parse_address};
use crate::client::JsonRpcClient;
use crate::types::{CoinMetadataJson, ObjectResponse, Page, TransactionBlockResponse};

const BAG_ITEM_IDS_POINTER: &str = "/fields/value/fields/item_ids/fields/contents";

/// [`Ledger`] backed by a Sui fullnode's JSON-RPC API.
#[derive(Clone)]
pub struct SuiLedger {
    client: JsonRpcClient,
}

impl SuiLedger {
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, LedgerError> {
        Ok(Self {
            client: JsonRpcClient::new(rpc_url)?,
        })
    }

    pub fn client(&self) -> &JsonRpcClient {
        &self.client
    }

    async fn objects(&self, ids: &[String]) -> Result<Vec<ObjectResponse>, LedgerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.client
            .read(
                "sui_multiGetObjects",
                json!([ids, {"showType": true, "showContent": true}]),
            )
            .await
    }
}

#[async_trait]
impl Ledger for SuiLedger {
    async fn owned_coins(&self, owner: sui::Address) -> Result<Vec<OwnedCoin>, LedgerError> {
        chain::owned_coins(&self.client, owner, None).await
    }

    async fn bag_items(
        &self,
        contract: &ContractReference,
        link: sui::Address,
    ) -> Result<Option<Vec<OwnedCoin>>, LedgerError> {
        let field: ObjectResponse = self
            .client
            .read(
                "suix_getDynamicFieldObject",
                json!([
                    contract.store_table_id.to_string(),
                    {"type": "address", "value": link.to_string()}
                ]),
            )
            .await?;
        let Some(data) = field.data else {
            debug!("No zk_bag for {}", link);
            return Ok(None);
        };

        let item_ids: Vec<String> = data
            .content
            .as_ref()
            .and_then(|content| content.pointer(BAG_ITEM_IDS_POINTER))
            .and_then(Value::as_array)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("zk_bag for {} has no item list", link)))?
            .iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect();
        debug!("zk_bag for {} holds {} items", link, item_ids.len());

        let mut coins = Vec::with_capacity(item_ids.len());
        for object in self.objects(&item_ids).await? {
            let Some(data) = object.data else {
                warn!("Bag item unavailable: {:?}", object.error);
                continue;
            };
            let coin = data
                .object_type
                .as_deref()
                .and_then(CoinType::from_coin_object_type)
                .zip(
                    data.content
                        .as_ref()
                        .and_then(|content| content.pointer("/fields/balance"))
                        .and_then(crate::types::as_u64),
                )
                .zip(parse_address(&data.object_id))
                .zip(data.version.parse::<u64>().ok());
            match coin {
                Some((((coin_type, balance), object_id), version)) => coins.push(OwnedCoin {
                    object_ref: ObjectRef {
                        object_id,
                        version,
                        digest: data.digest,
                    },
                    coin_type,
                    balance,
                }),
                None => warn!("Skipping non-coin bag item {}", data.object_id),
            }
        }
        Ok(Some(coins))
    }

    async fn execute(
        &self,
        tx: &UnsignedTransaction,
        signers: &[&dyn TransactionSigner],
    ) -> Result<ExecutionOutcome, LedgerError> {
        let built = builder::build_transaction(&self.client, tx).await?;

        let mut signatures = Vec::new();
        for required in tx.required_signers() {
            let signer = signers
                .iter()
                .find(|signer| signer.address() == required)
                .ok_or_else(|| LedgerError::Rejected(format!("missing signature for {}", required)))?;
            signatures.push(sign(*signer, &built.transaction)?.to_base64());
        }

        let params = json!([
            BASE64.encode(&built.bytes),
            signatures,
            {"showEffects": true},
            "WaitForLocalExecution"
        ]);
        let client = self.client.clone();
        info!("Submitting transaction {}", built.digest);
        // Spawned so submission finishes even when the caller is dropped.
        let response = tokio::spawn(async move {
            client
                .call::<TransactionBlockResponse>("sui_executeTransactionBlock", params)
                .await
        })
        .await
        .map_err(|e| LedgerError::Transport(format!("submission task failed: {}", e)))?;

        match response {
            Ok(response) => {
                let outcome = execution_outcome(response);
                info!("Transaction {} executed: {:?}", outcome.digest, outcome.status);
                Ok(outcome)
            }
            Err(LedgerError::Rpc { code, message }) => {
                warn!("Transaction {} rejected: {}", built.digest, message);
                Ok(ExecutionOutcome {
                    digest: built.digest,
                    status: ExecutionStatus::Failure {
                        errors: vec![format!("RPC error {}: {}", code, message)],
                    },
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn transactions_from(
        &self,
        sender: sui::Address,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<TransactionPage, LedgerError> {
        let page: Page<TransactionBlockResponse> = self
            .client
            .read(
                "suix_queryTransactionBlocks",
                json!([
                    {
                        "filter": {"FromAddress": sender.to_string()},
                        "options": {"showInput": true, "showEffects": true}
                    },
                    cursor,
                    limit,
                    true
                ]),
            )
            .await?;
        Ok(TransactionPage {
            transactions: page.data.into_iter().filter_map(summarize).collect(),
            next_cursor: page.next_cursor,
            has_next_page: page.has_next_page,
        })
    }

    async fn coin_metadata(
        &self,
        coin_type: &CoinType,
    ) -> Result<Option<CoinMetadata>, LedgerError> {
        let metadata: Option<CoinMetadataJson> = self
            .client
            .read("suix_getCoinMetadata", json!([coin_type.as_str()]))
            .await?;
        Ok(metadata.map(|m| CoinMetadata {
            symbol: m.symbol,
            decimals: m.decimals,
            icon_url: m.icon_url.filter(|url| !url.is_empty()),
        }))
    }
}

fn sign(
    signer: &dyn TransactionSigner,
    transaction: &sui::Transaction,
) -> Result<sui::UserSignature, LedgerError> {
    let sk = Ed25519PrivateKey::new(signer.ed25519_secret());
    if sk.public_key().derive_address() != signer.address() {
        return Err(LedgerError::Rejected(format!(
            "signing key does not match {}",
            signer.address()
        )));
    }
    sk.sign_transaction(transaction)
        .map_err(|e| LedgerError::Rejected(format!("failed to sign transaction: {}", e)))
}

fn execution_outcome(response: TransactionBlockResponse) -> ExecutionOutcome {
    let status = match response.effects {
        Some(effects) if effects.status.status == "success" => ExecutionStatus::Success,
        Some(effects) => ExecutionStatus::Failure {
            errors: vec![effects.status.error.unwrap_or_else(|| effects.status.status.clone())],
        },
        None => ExecutionStatus::Failure {
            errors: response
                .errors
                .filter(|errors| !errors.is_empty())
                .unwrap_or_else(|| vec!["transaction effects unavailable".to_string()]),
        },
    };
    ExecutionOutcome {
        digest: response.digest,
        status,
    }
}

/// Programmable transactions only; anything else is irrelevant to links.
fn summarize(response: TransactionBlockResponse) -> Option<TransactionSummary> {
    let data = response.transaction?.data;
    let kind = &data.transaction;
    if kind.get("kind").and_then(Value::as_str) != Some("ProgrammableTransaction") {
        return None;
    }
    let inputs = kind
        .get("inputs")
        .and_then(Value::as_array)
        .map(|inputs| inputs.iter().map(call_input).collect())
        .unwrap_or_default();
    let calls = kind
        .get("transactions")
        .and_then(Value::as_array)
        .map(|commands| {
            commands
                .iter()
                .filter_map(|command| command.get("MoveCall"))
                .filter_map(move_call)
                .collect()
        })
        .unwrap_or_default();
    Some(TransactionSummary {
        digest: response.digest,
        sender: parse_address(&data.sender)?,
        timestamp_ms: response.timestamp_ms.and_then(|ts| ts.parse().ok()),
        success: response
            .effects
            .map(|effects| effects.status.status == "success")
            .unwrap_or(false),
        inputs,
        calls,
    })
}

fn call_input(input: &Value) -> CallInput {
    let field = |name: &str| input.get(name).and_then(Value::as_str);
    match field("type") {
        Some("pure") if field("valueType") == Some("address") => field("value")
            .and_then(parse_address)
            .map(CallInput::Address)
            .unwrap_or(CallInput::Other),
        Some("object") => field("objectId")
            .and_then(parse_address)
            .map(CallInput::Object)
            .unwrap_or(CallInput::Other),
        _ => CallInput::Other,
    }
}

fn move_call(call: &Value) -> Option<MoveCallSummary> {
    let arguments = match call.get("arguments").and_then(Value::as_array) {
        Some(arguments) => arguments.iter().map(argument).collect::<Option<Vec<_>>>()?,
        None => Vec::new(),
    };
    Some(MoveCallSummary {
        package: parse_address(call.get("package")?.as_str()?)?,
        module: call.get("module")?.as_str()?.to_string(),
        function: call.get("function")?.as_str()?.to_string(),
        arguments,
    })
}

fn argument(value: &Value) -> Option<Argument> {
    let index = |v: &Value| v.as_u64().and_then(|i| u16::try_from(i).ok());
    if value.as_str() == Some("GasCoin") {
        return Some(Argument::GasCoin);
    }
    if let Some(i) = value.get("Input") {
        return index(i).map(Argument::Input);
    }
    if let Some(i) = value.get("Result") {
        return index(i).map(Argument::Result);
    }
    let pair = value.get("NestedResult")?.as_array()?;
    Some(Argument::NestedResult(index(pair.first()?)?, index(pair.get(1)?)?))
}
