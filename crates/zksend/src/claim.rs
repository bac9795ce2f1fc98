//! Claim and reclaim transactions, and their submission.

use sui_sdk_types::Address;
use tracing::{info, warn};

use crate::error::{Result, ZkSendError};
use crate::funding::CLAIM_GAS_RESERVE;
use crate::keypair::TransactionSigner;
use crate::ledger::{ExecutionStatus, Ledger};
use crate::link::{ClaimLink, LinkVariant};
use crate::network::{ContractReference, ZK_BAG_MODULE};
use crate::snapshot::{LinkAssetsSnapshot, fetch_snapshot};
use crate::transaction::{Argument, InputArg, TransactionPlan, UnsignedTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimMode {
    /// Link holder sweeps the assets to a recipient.
    Claim,
    /// Original sender takes the assets back.
    Reclaim,
}

/// Sweeps everything behind `link` to `recipient`, based on a fresh snapshot.
///
/// Escrow claims are sponsored: `gas_sponsor` (the recipient when `None`)
/// pays gas while the link key signs as sender.
pub async fn build_claim_transaction<L: Ledger + ?Sized>(
    ledger: &L,
    link: &ClaimLink,
    recipient: Address,
    contract: Option<&ContractReference>,
    gas_sponsor: Option<Address>,
) -> Result<UnsignedTransaction> {
    let snapshot = fetch_snapshot(ledger, link.address(), link.variant(), contract).await?;
    plan_claim(link, &snapshot, recipient, ClaimMode::Claim, contract, gas_sponsor)
}

/// Returns everything behind `link` to `sender`. Direct links are still
/// signed by the link key; escrow reclaims are signed by `sender`, who must
/// have created the bag.
pub async fn build_reclaim_transaction<L: Ledger + ?Sized>(
    ledger: &L,
    link: &ClaimLink,
    sender: Address,
    contract: Option<&ContractReference>,
) -> Result<UnsignedTransaction> {
    let snapshot = fetch_snapshot(ledger, link.address(), link.variant(), contract).await?;
    plan_claim(link, &snapshot, sender, ClaimMode::Reclaim, contract, None)
}

pub fn plan_claim(
    link: &ClaimLink,
    snapshot: &LinkAssetsSnapshot,
    target: Address,
    mode: ClaimMode,
    contract: Option<&ContractReference>,
    gas_sponsor: Option<Address>,
) -> Result<UnsignedTransaction> {
    if snapshot.address != link.address() {
        return Err(ZkSendError::InvalidState(format!(
            "snapshot is for {} but link address is {}",
            snapshot.address,
            link.address()
        )));
    }
    if snapshot.variant != link.variant() {
        return Err(ZkSendError::VariantMismatch {
            expected: link.variant(),
            actual: snapshot.variant,
        });
    }
    if !snapshot.is_claimable() {
        return Err(ZkSendError::AlreadyClaimed);
    }

    match link.variant() {
        LinkVariant::Direct => Ok(direct_sweep(snapshot, target)),
        LinkVariant::Escrow => {
            let contract = contract.ok_or(ZkSendError::MissingContract)?;
            escrow_sweep(snapshot, target, mode, contract, gas_sponsor)
        }
    }
}

fn direct_sweep(snapshot: &LinkAssetsSnapshot, target: Address) -> UnsignedTransaction {
    let mut plan = TransactionPlan::new(snapshot.address);
    let (sui, others): (Vec<_>, Vec<_>) =
        snapshot.coins.iter().partition(|coin| coin.coin_type.is_sui());

    // The link's own SUI pays for gas; whatever is left goes with the gas coin
    let sui_total = sui.iter().fold(0u64, |acc, coin| acc.saturating_add(coin.balance));
    plan.set_gas_payment(sui.iter().map(|coin| coin.object_ref.clone()).collect());
    if sui_total > 0 {
        plan.set_gas_budget(CLAIM_GAS_RESERVE.min(sui_total));
    }

    let mut objects: Vec<Argument> = others
        .iter()
        .map(|coin| plan.input(InputArg::OwnedObject(coin.object_ref.clone())))
        .collect();
    if !sui.is_empty() {
        objects.push(Argument::GasCoin);
    }
    let recipient = plan.input(InputArg::Address(target));
    plan.transfer_objects(objects, recipient);
    plan.finish()
}

fn escrow_sweep(
    snapshot: &LinkAssetsSnapshot,
    target: Address,
    mode: ClaimMode,
    contract: &ContractReference,
    gas_sponsor: Option<Address>,
) -> Result<UnsignedTransaction> {
    let (sender, gas_owner) = match mode {
        ClaimMode::Claim => (snapshot.address, gas_sponsor.unwrap_or(target)),
        ClaimMode::Reclaim => (target, target),
    };
    let mut plan = TransactionPlan::new(sender);
    plan.set_gas_owner(gas_owner);

    let store = plan.input(InputArg::SharedObject {
        object_id: contract.store_id,
        mutable: true,
    });
    let opened = match mode {
        ClaimMode::Claim => {
            plan.move_call(contract.package_id, ZK_BAG_MODULE, "init_claim", vec![], vec![store])
        }
        ClaimMode::Reclaim => {
            let link = plan.input(InputArg::Address(snapshot.address));
            plan.move_call(contract.package_id, ZK_BAG_MODULE, "reclaim", vec![], vec![store, link])
        }
    };
    let (bag, proof) = match (opened.nested(0), opened.nested(1)) {
        (Some(bag), Some(proof)) => (bag, proof),
        _ => return Err(ZkSendError::InvalidState("bag call produced no result".into())),
    };

    let mut claimed = Vec::with_capacity(snapshot.coins.len());
    for coin in &snapshot.coins {
        let item = plan.input(InputArg::Receiving(coin.object_ref.clone()));
        claimed.push(plan.move_call(
            contract.package_id,
            ZK_BAG_MODULE,
            "claim",
            vec![coin.coin_type.coin_object_type()],
            vec![bag, proof, item],
        ));
    }
    plan.move_call(contract.package_id, ZK_BAG_MODULE, "finalize", vec![], vec![bag, proof]);

    let recipient = plan.input(InputArg::Address(target));
    plan.transfer_objects(claimed, recipient);
    Ok(plan.finish())
}

/// Executes `tx` and maps an on-chain failure to
/// [`ZkSendError::ClaimExecution`] carrying the digest and raw errors.
pub async fn submit_transaction<L: Ledger + ?Sized>(
    ledger: &L,
    tx: &UnsignedTransaction,
    signers: &[&dyn TransactionSigner],
) -> Result<String> {
    let outcome = ledger.execute(tx, signers).await?;
    match outcome.status {
        ExecutionStatus::Success => {
            info!("Transaction {} executed successfully", outcome.digest);
            Ok(outcome.digest)
        }
        ExecutionStatus::Failure { errors } => {
            warn!("Transaction {} failed: {:?}", outcome.digest, errors);
            Err(ZkSendError::ClaimExecution {
                digest: outcome.digest,
                raw_errors: errors,
            })
        }
    }
}

/// Builds, signs and submits a claim. Escrow claims need `sponsor` to pay
/// gas; direct claims ignore it.
pub async fn claim_link<L: Ledger + ?Sized>(
    ledger: &L,
    link: &ClaimLink,
    recipient: Address,
    contract: Option<&ContractReference>,
    sponsor: Option<&dyn TransactionSigner>,
) -> Result<String> {
    let sponsor = match link.variant() {
        LinkVariant::Direct => None,
        LinkVariant::Escrow => Some(sponsor.ok_or_else(|| {
            ZkSendError::InvalidClaim("escrow claims need a gas sponsor".to_string())
        })?),
    };
    let tx = build_claim_transaction(
        ledger,
        link,
        recipient,
        contract,
        sponsor.map(|s| s.address()),
    )
    .await?;

    let mut signers: Vec<&dyn TransactionSigner> = vec![link.keypair() as &dyn TransactionSigner];
    signers.extend(sponsor);
    submit_transaction(ledger, &tx, &signers).await
}

/// Builds, signs and submits a reclaim back to `wallet`.
pub async fn reclaim_link<L: Ledger + ?Sized>(
    ledger: &L,
    link: &ClaimLink,
    wallet: &dyn TransactionSigner,
    contract: Option<&ContractReference>,
) -> Result<String> {
    let tx = build_reclaim_transaction(ledger, link, wallet.address(), contract).await?;
    let signer: &dyn TransactionSigner = match link.variant() {
        LinkVariant::Direct => link.keypair(),
        LinkVariant::Escrow => wallet,
    };
    submit_transaction(ledger, &tx, &[signer]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::CoinType;
    use crate::keypair::Keypair;
    use crate::ledger::OwnedCoin;
    use crate::link::LinkRouting;
    use crate::transaction::{Command, ObjectRef};

    fn coin(id: u8, coin_type: CoinType, balance: u64) -> OwnedCoin {
        OwnedCoin {
            object_ref: ObjectRef {
                object_id: Address::new([id; 32]),
                version: 7,
                digest: "digest".to_string(),
            },
            coin_type,
            balance,
        }
    }

    fn usdc() -> CoinType {
        CoinType::parse("0x3::usdc::USDC").unwrap()
    }

    fn link(variant: LinkVariant) -> ClaimLink {
        ClaimLink::new(Keypair::from_secret_bytes([5u8; 32]), variant, LinkRouting::default())
    }

    #[test]
    fn test_direct_claim_sweeps_gas_coin() {
        let link = link(LinkVariant::Direct);
        let recipient = Address::new([0xbb; 32]);
        let snapshot = LinkAssetsSnapshot::from_coins(
            link.address(),
            LinkVariant::Direct,
            vec![coin(1, usdc(), 10), coin(2, CoinType::sui(), CLAIM_GAS_RESERVE)],
        );

        let tx = plan_claim(&link, &snapshot, recipient, ClaimMode::Claim, None, None).unwrap();
        assert_eq!(tx.sender, link.address());
        assert!(!tx.is_sponsored());
        assert_eq!(tx.gas.payment, vec![snapshot.coins[1].object_ref.clone()]);
        assert_eq!(tx.gas.budget, Some(CLAIM_GAS_RESERVE));
        assert_eq!(
            tx.commands,
            vec![Command::TransferObjects {
                objects: vec![Argument::Input(0), Argument::GasCoin],
                recipient: Argument::Input(1),
            }]
        );
        assert_eq!(tx.transfer_recipients(), vec![recipient]);
    }

    #[test]
    fn test_escrow_claim_is_sponsored() {
        let contract = ContractReference::testnet();
        let link = link(LinkVariant::Escrow);
        let recipient = Address::new([0xbb; 32]);
        let snapshot = LinkAssetsSnapshot::from_coins(
            link.address(),
            LinkVariant::Escrow,
            vec![coin(1, usdc(), 10), coin(2, CoinType::sui(), 20)],
        );

        let tx = plan_claim(&link, &snapshot, recipient, ClaimMode::Claim, Some(&contract), None)
            .unwrap();
        assert_eq!(tx.sender, link.address());
        assert_eq!(tx.gas.owner, recipient);
        let functions: Vec<_> = tx.move_calls().map(|c| c.function.as_str()).collect();
        assert_eq!(functions, vec!["init_claim", "claim", "claim", "finalize"]);
        assert_eq!(tx.transfer_recipients(), vec![recipient]);
    }

    #[test]
    fn test_escrow_reclaim_is_signed_by_sender() {
        let contract = ContractReference::testnet();
        let link = link(LinkVariant::Escrow);
        let sender = Address::new([0xcc; 32]);
        let snapshot = LinkAssetsSnapshot::from_coins(
            link.address(),
            LinkVariant::Escrow,
            vec![coin(1, usdc(), 10)],
        );

        let tx = plan_claim(&link, &snapshot, sender, ClaimMode::Reclaim, Some(&contract), None)
            .unwrap();
        assert_eq!(tx.required_signers(), vec![sender]);
        let reclaim = tx.move_calls().next().unwrap();
        assert_eq!(reclaim.function, "reclaim");
        assert_eq!(tx.input(reclaim.arguments[1]), Some(&InputArg::Address(link.address())));
    }

    #[test]
    fn test_empty_snapshot_is_already_claimed() {
        let link = link(LinkVariant::Direct);
        let snapshot = LinkAssetsSnapshot::from_coins(link.address(), LinkVariant::Direct, vec![]);
        assert_eq!(
            plan_claim(&link, &snapshot, Address::new([1; 32]), ClaimMode::Claim, None, None)
                .unwrap_err(),
            ZkSendError::AlreadyClaimed
        );
    }

    #[test]
    fn test_variant_mismatch_is_rejected() {
        let link = link(LinkVariant::Escrow);
        let snapshot = LinkAssetsSnapshot::from_coins(
            link.address(),
            LinkVariant::Direct,
            vec![coin(1, usdc(), 10)],
        );
        assert!(matches!(
            plan_claim(&link, &snapshot, Address::new([1; 32]), ClaimMode::Claim, None, None),
            Err(ZkSendError::VariantMismatch { .. })
        ));
    }
}
