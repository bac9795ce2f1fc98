//! Funding transactions: move assets from a sender into one or many links.

use std::collections::HashMap;

use sui_sdk_types::Address;
use tracing::info;

use crate::coin::{Claim, ClaimSpec, CoinType};
use crate::error::{Result, ZkSendError};
use crate::link::{ClaimLink, LinkRouting, LinkVariant};
use crate::network::{ContractReference, ZK_BAG_MODULE};
use crate::transaction::{Argument, InputArg, TransactionPlan, UnsignedTransaction};

/// SUI (in MIST) sent along with every direct link so the link can pay for
/// its own claim transaction.
pub const CLAIM_GAS_RESERVE: u64 = 5_000_000;

pub const MAX_LINKS_PER_BATCH: usize = 300;

/// Funds a single link from `sender`'s balances.
pub fn build_funding_transaction(
    sender: Address,
    link: &ClaimLink,
    claims: &ClaimSpec,
    contract: Option<&ContractReference>,
) -> Result<UnsignedTransaction> {
    fund_links(sender, link.variant(), &[(link.address(), claims)], contract)
}

/// Generates one fresh link per claim spec and funds all of them in a single
/// transaction. Size and contract checks run before any key is generated.
pub fn build_batch_funding_transaction(
    sender: Address,
    per_link: &[ClaimSpec],
    variant: LinkVariant,
    routing: &LinkRouting,
    contract: Option<&ContractReference>,
) -> Result<(UnsignedTransaction, Vec<ClaimLink>)> {
    if per_link.len() > MAX_LINKS_PER_BATCH {
        return Err(ZkSendError::BatchSizeExceeded {
            requested: per_link.len(),
            max: MAX_LINKS_PER_BATCH,
        });
    }
    if per_link.is_empty() {
        return Err(ZkSendError::InvalidClaim("no links requested".to_string()));
    }
    if variant == LinkVariant::Escrow && contract.is_none() {
        return Err(ZkSendError::MissingContract);
    }

    let links = per_link
        .iter()
        .map(|_| ClaimLink::generate(variant, routing.clone()))
        .collect::<Result<Vec<_>>>()?;
    let targets: Vec<(Address, &ClaimSpec)> =
        links.iter().map(ClaimLink::address).zip(per_link).collect();

    let tx = fund_links(sender, variant, &targets, contract)?;
    info!(
        "Built {} funding transaction for {} links ({} commands)",
        variant.as_str(),
        links.len(),
        tx.commands.len()
    );
    Ok((tx, links))
}

fn fund_links(
    sender: Address,
    variant: LinkVariant,
    targets: &[(Address, &ClaimSpec)],
    contract: Option<&ContractReference>,
) -> Result<UnsignedTransaction> {
    let totals = targets
        .iter()
        .map(|(address, spec)| {
            if spec.is_empty() {
                return Err(ZkSendError::InvalidClaim(format!(
                    "link {address} has nothing to claim"
                )));
            }
            spec.totals()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut plan = TransactionPlan::new(sender);
    match variant {
        LinkVariant::Direct => {
            let coins = split_claims(&mut plan, &totals, CLAIM_GAS_RESERVE)?;
            for ((address, _), link_coins) in targets.iter().zip(coins) {
                let recipient = plan.input(InputArg::Address(*address));
                let objects = link_coins.into_iter().map(|(_, coin)| coin).collect();
                plan.transfer_objects(objects, recipient);
            }
        }
        LinkVariant::Escrow => {
            let contract = contract.ok_or(ZkSendError::MissingContract)?;
            let coins = split_claims(&mut plan, &totals, 0)?;
            let store = plan.input(InputArg::SharedObject {
                object_id: contract.store_id,
                mutable: true,
            });
            for ((address, _), link_coins) in targets.iter().zip(coins) {
                let receiver = plan.input(InputArg::Address(*address));
                plan.move_call(
                    contract.package_id,
                    ZK_BAG_MODULE,
                    "new",
                    vec![],
                    vec![store, receiver],
                );
                for (coin_type, coin) in link_coins {
                    plan.move_call(
                        contract.package_id,
                        ZK_BAG_MODULE,
                        "add",
                        vec![coin_type.coin_object_type()],
                        vec![store, receiver, coin],
                    );
                }
            }
        }
    }
    Ok(plan.finish())
}

/// Emits one `SplitBalance` per coin type across all links and returns each
/// link's coins. A non-zero `sui_reserve` is folded into every link's SUI.
fn split_claims(
    plan: &mut TransactionPlan,
    totals: &[Vec<Claim>],
    sui_reserve: u64,
) -> Result<Vec<Vec<(CoinType, Argument)>>> {
    let mut order: Vec<CoinType> = Vec::new();
    let mut amounts: HashMap<CoinType, Vec<u64>> = HashMap::new();
    let mut slots: Vec<Vec<(CoinType, u16)>> = Vec::with_capacity(totals.len());

    for link_totals in totals {
        let mut claims = link_totals.clone();
        if sui_reserve > 0 {
            match claims.iter_mut().find(|c| c.coin_type.is_sui()) {
                Some(sui) => {
                    sui.amount = sui.amount.checked_add(sui_reserve).ok_or_else(|| {
                        ZkSendError::InvalidClaim("SUI amount plus gas reserve overflows u64".into())
                    })?;
                }
                None => claims.push(Claim {
                    coin_type: CoinType::sui(),
                    amount: sui_reserve,
                }),
            }
        }

        let mut link_slots = Vec::with_capacity(claims.len());
        for claim in claims {
            let entry = amounts.entry(claim.coin_type.clone()).or_insert_with(|| {
                order.push(claim.coin_type.clone());
                Vec::new()
            });
            // At most MAX_LINKS_PER_BATCH entries per coin type
            link_slots.push((claim.coin_type, entry.len() as u16));
            entry.push(claim.amount);
        }
        slots.push(link_slots);
    }

    let mut results: HashMap<CoinType, Argument> = HashMap::new();
    for coin_type in order {
        let split = plan.split_balance(
            coin_type.clone(),
            amounts.remove(&coin_type).unwrap_or_default(),
        );
        results.insert(coin_type, split);
    }

    slots
        .into_iter()
        .map(|link_slots| {
            link_slots
                .into_iter()
                .map(|(coin_type, index)| {
                    let coin = results
                        .get(&coin_type)
                        .and_then(|split| split.nested(index))
                        .ok_or_else(|| {
                            ZkSendError::InvalidState(format!("no split emitted for {coin_type}"))
                        })?;
                    Ok((coin_type, coin))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::Keypair;
    use crate::transaction::Command;

    fn sender() -> Address {
        Address::new([0xaa; 32])
    }

    fn usdc() -> CoinType {
        CoinType::parse("0x5d4b::coin::COIN").unwrap()
    }

    fn link(variant: LinkVariant, seed: u8) -> ClaimLink {
        ClaimLink::new(Keypair::from_secret_bytes([seed; 32]), variant, LinkRouting::default())
    }

    #[test]
    fn test_direct_funding_adds_gas_reserve() {
        let link = link(LinkVariant::Direct, 1);
        let claims = ClaimSpec::single(usdc(), 500_000).unwrap();
        let tx = build_funding_transaction(sender(), &link, &claims, None).unwrap();

        assert_eq!(tx.sender, sender());
        assert_eq!(tx.split_total(&usdc()), 500_000);
        assert_eq!(tx.split_total(&CoinType::sui()), CLAIM_GAS_RESERVE as u128);
        assert_eq!(tx.transfer_recipients(), vec![link.address()]);
        assert_eq!(tx.move_calls().count(), 0);
    }

    #[test]
    fn test_direct_sui_claim_merges_reserve() {
        let link = link(LinkVariant::Direct, 2);
        let claims = ClaimSpec::new()
            .with(CoinType::sui(), 600)
            .unwrap()
            .with(CoinType::sui(), 400)
            .unwrap();
        let tx = build_funding_transaction(sender(), &link, &claims, None).unwrap();

        assert_eq!(
            tx.commands[0],
            Command::SplitBalance {
                coin_type: CoinType::sui(),
                amounts: vec![1_000 + CLAIM_GAS_RESERVE],
            }
        );
        assert_eq!(tx.commands.len(), 2);
    }

    #[test]
    fn test_escrow_funding_calls_zk_bag() {
        let contract = ContractReference::testnet();
        let link = link(LinkVariant::Escrow, 3);
        let claims = ClaimSpec::single(usdc(), 42).unwrap();
        let tx = build_funding_transaction(sender(), &link, &claims, Some(&contract)).unwrap();

        let calls: Vec<_> = tx.move_calls().collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function, "new");
        assert_eq!(calls[1].function, "add");
        assert_eq!(calls[1].type_arguments, vec![usdc().coin_object_type()]);
        assert_eq!(tx.input(calls[0].arguments[1]), Some(&InputArg::Address(link.address())));
        assert_eq!(tx.split_total(&CoinType::sui()), 0);
        assert_eq!(tx.split_total(&usdc()), 42);
        assert!(
            tx.inputs
                .iter()
                .any(|i| matches!(i, InputArg::SharedObject { object_id, mutable: true } if *object_id == contract.store_id))
        );
    }

    #[test]
    fn test_escrow_without_contract_fails() {
        let link = link(LinkVariant::Escrow, 4);
        let claims = ClaimSpec::single(usdc(), 1).unwrap();
        assert_eq!(
            build_funding_transaction(sender(), &link, &claims, None).unwrap_err(),
            ZkSendError::MissingContract
        );
    }

    #[test]
    fn test_empty_claim_spec_rejected() {
        let link = link(LinkVariant::Direct, 5);
        assert!(matches!(
            build_funding_transaction(sender(), &link, &ClaimSpec::new(), None),
            Err(ZkSendError::InvalidClaim(_))
        ));
    }

    #[test]
    fn test_batch_groups_splits_by_coin_type() {
        let specs = vec![
            ClaimSpec::single(usdc(), 100).unwrap(),
            ClaimSpec::single(usdc(), 100).unwrap(),
            ClaimSpec::single(usdc(), 50).unwrap(),
        ];
        let (tx, links) = build_batch_funding_transaction(
            sender(),
            &specs,
            LinkVariant::Direct,
            &LinkRouting::default(),
            None,
        )
        .unwrap();

        assert_eq!(links.len(), 3);
        let splits = tx
            .commands
            .iter()
            .filter(|c| matches!(c, Command::SplitBalance { .. }))
            .count();
        assert_eq!(splits, 2);
        assert_eq!(tx.split_total(&usdc()), 250);
        assert_eq!(tx.split_total(&CoinType::sui()), 3 * CLAIM_GAS_RESERVE as u128);
        assert_eq!(
            tx.transfer_recipients(),
            links.iter().map(ClaimLink::address).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_batch_size_limit() {
        let specs = vec![ClaimSpec::single(usdc(), 1).unwrap(); MAX_LINKS_PER_BATCH + 1];
        assert_eq!(
            build_batch_funding_transaction(
                sender(),
                &specs,
                LinkVariant::Direct,
                &LinkRouting::default(),
                None
            )
            .unwrap_err(),
            ZkSendError::BatchSizeExceeded {
                requested: 301,
                max: 300
            }
        );

        let specs = vec![ClaimSpec::single(usdc(), 1).unwrap(); MAX_LINKS_PER_BATCH];
        let (_, links) = build_batch_funding_transaction(
            sender(),
            &specs,
            LinkVariant::Direct,
            &LinkRouting::default(),
            None,
        )
        .unwrap();
        assert_eq!(links.len(), MAX_LINKS_PER_BATCH);
    }
}
