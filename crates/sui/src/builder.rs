//! Lowers an [`UnsignedTransaction`] plan into BCS transaction bytes.

use std::collections::HashSet;

use sui_sdk_types as sui;
use sui_transaction_builder::{Function, Serialized, TransactionBuilder, unresolved};
use tracing::debug;
use zksend::transaction::{Argument, Command, InputArg, ObjectRef, UnsignedTransaction};
use zksend::{CoinType, LedgerError};

use crate::chain;
use crate::client::JsonRpcClient;

pub const DEFAULT_GAS_BUDGET: u64 = 50_000_000;
const MAX_GAS_OBJECTS: usize = 255;

pub struct BuiltTransaction {
    pub transaction: sui::Transaction,
    pub bytes: Vec<u8>,
    pub digest: String,
}

pub async fn build_transaction(
    client: &JsonRpcClient,
    plan: &UnsignedTransaction,
) -> Result<BuiltTransaction, LedgerError> {
    let mut tb = TransactionBuilder::new();
    tb.set_sender(plan.sender);
    if plan.is_sponsored() {
        tb.set_sponsor(plan.gas.owner);
    }
    tb.set_gas_budget(plan.gas.budget.unwrap_or(DEFAULT_GAS_BUDGET));
    tb.set_gas_price(chain::reference_gas_price(client).await?);

    let mut consumed: HashSet<sui::Address> = HashSet::new();
    let mut inputs = Vec::with_capacity(plan.inputs.len());
    for input in &plan.inputs {
        let argument = match input {
            InputArg::Address(address) => tb.input(Serialized(address)),
            InputArg::U64(value) => tb.input(Serialized(value)),
            InputArg::OwnedObject(object_ref) => {
                consumed.insert(object_ref.object_id);
                tb.input(owned_input(object_ref)?)
            }
            InputArg::Receiving(object_ref) => tb.input(unresolved::Input::receiving(
                object_ref.object_id,
                object_ref.version,
                parse_digest(&object_ref.digest)?,
            )),
            InputArg::SharedObject { object_id, mutable } => {
                let version = chain::initial_shared_version(client, *object_id).await?;
                tb.input(unresolved::Input::shared(*object_id, version, *mutable))
            }
        };
        inputs.push(argument);
    }

    let mut results: Vec<Option<sui::Argument>> = Vec::with_capacity(plan.commands.len());
    for command in &plan.commands {
        let result = match command {
            Command::SplitBalance { coin_type, amounts } => {
                let source = if coin_type.is_sui() && !plan.is_sponsored() {
                    tb.gas()
                } else {
                    let coins = chain::owned_coins(client, plan.sender, Some(coin_type)).await?;
                    let refs: Vec<ObjectRef> = coins
                        .into_iter()
                        .map(|coin| coin.object_ref)
                        .filter(|object_ref| !consumed.contains(&object_ref.object_id))
                        .collect();
                    let (first, rest) = refs.split_first().ok_or_else(|| {
                        LedgerError::Rejected(format!("{} owns no {} coins", plan.sender, coin_type))
                    })?;
                    consumed.extend(refs.iter().map(|object_ref| object_ref.object_id));
                    let primary = tb.input(owned_input(first)?);
                    if !rest.is_empty() {
                        let mut others = Vec::with_capacity(rest.len());
                        for object_ref in rest {
                            others.push(tb.input(owned_input(object_ref)?));
                        }
                        tb.merge_coins(primary, others);
                    }
                    primary
                };
                let amounts = amounts.iter().map(|amount| tb.input(Serialized(amount))).collect();
                Some(tb.split_coins(source, amounts))
            }
            Command::TransferObjects { objects, recipient } => {
                let objects = objects
                    .iter()
                    .map(|object| lower(*object, &inputs, &results))
                    .collect::<Result<Vec<_>, _>>()?;
                let recipient = lower(*recipient, &inputs, &results)?;
                tb.transfer_objects(objects, recipient);
                None
            }
            Command::MoveCall(call) => {
                let type_arguments = call
                    .type_arguments
                    .iter()
                    .map(|tag| {
                        tag.parse::<sui::TypeTag>()
                            .map_err(|e| LedgerError::Rejected(format!("invalid type {}: {}", tag, e)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let function = Function::new(
                    call.package,
                    parse_identifier(&call.module)?,
                    parse_identifier(&call.function)?,
                    type_arguments,
                );
                let arguments = call
                    .arguments
                    .iter()
                    .map(|argument| lower(*argument, &inputs, &results))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(tb.move_call(function, arguments))
            }
        };
        results.push(result);
    }

    let gas = if plan.gas.payment.is_empty() {
        select_gas(client, plan.gas.owner, &consumed).await?
    } else {
        plan.gas.payment.clone()
    };
    tb.add_gas_objects(gas.iter().map(owned_input).collect::<Result<Vec<_>, _>>()?);

    let transaction = tb
        .finish()
        .map_err(|e| LedgerError::Rejected(format!("failed to build transaction: {}", e)))?;
    let bytes = bcs::to_bytes(&transaction)
        .map_err(|e| LedgerError::Rejected(format!("failed to serialize transaction: {}", e)))?;
    let digest = transaction.digest().to_string();
    debug!("Built transaction {} ({} bytes)", digest, bytes.len());
    Ok(BuiltTransaction {
        transaction,
        bytes,
        digest,
    })
}

/// Largest SUI coins of `owner` not already used as inputs.
async fn select_gas(
    client: &JsonRpcClient,
    owner: sui::Address,
    consumed: &HashSet<sui::Address>,
) -> Result<Vec<ObjectRef>, LedgerError> {
    let mut coins = chain::owned_coins(client, owner, Some(&CoinType::sui())).await?;
    coins.retain(|coin| !consumed.contains(&coin.object_ref.object_id));
    coins.sort_by(|a, b| b.balance.cmp(&a.balance));
    let gas: Vec<ObjectRef> = coins
        .into_iter()
        .take(MAX_GAS_OBJECTS)
        .map(|coin| coin.object_ref)
        .collect();
    if gas.is_empty() {
        return Err(LedgerError::Rejected(format!("{} has no SUI coins to pay gas", owner)));
    }
    Ok(gas)
}

fn lower(
    argument: Argument,
    inputs: &[sui::Argument],
    results: &[Option<sui::Argument>],
) -> Result<sui::Argument, LedgerError> {
    let lowered = match argument {
        Argument::GasCoin => Some(sui::Argument::Gas),
        Argument::Input(index) => inputs.get(index as usize).copied(),
        Argument::Result(index) => results.get(index as usize).copied().flatten(),
        Argument::NestedResult(index, element) => results
            .get(index as usize)
            .copied()
            .flatten()
            .and_then(|result| result.nested(element)),
    };
    lowered.ok_or_else(|| LedgerError::Rejected(format!("unresolvable argument {:?}", argument)))
}

fn owned_input(object_ref: &ObjectRef) -> Result<unresolved::Input, LedgerError> {
    Ok(unresolved::Input::owned(
        object_ref.object_id,
        object_ref.version,
        parse_digest(&object_ref.digest)?,
    ))
}

fn parse_digest(digest: &str) -> Result<sui::Digest, LedgerError> {
    digest
        .parse()
        .map_err(|e| LedgerError::InvalidResponse(format!("invalid object digest {}: {}", digest, e)))
}

fn parse_identifier(name: &str) -> Result<sui::Identifier, LedgerError> {
    name.parse()
        .map_err(|e| LedgerError::Rejected(format!("invalid identifier {}: {}", name, e)))
}
