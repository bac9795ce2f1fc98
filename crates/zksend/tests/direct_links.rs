use zksend::bulk::{expand_link_groups, links_to_csv, parse_link_groups};
use zksend::ledger::CoinMetadata;
use zksend::memory::MemoryLedger;
use zksend::{
    Address, CLAIM_GAS_RESERVE, ClaimLink, ClaimSpec, CoinType, Keypair, LinkRouting, LinkVariant,
    MetadataCache, ZkSendError, build_batch_funding_transaction, build_claim_transaction,
    build_funding_transaction, build_reclaim_transaction, claim_link, fetch_snapshot,
    parse_amount, reclaim_link, submit_transaction,
};

const ONE_SUI: u64 = 1_000_000_000;

fn usdc() -> CoinType {
    CoinType::parse("0x5d4b302506645c37ff133b98c4b50a5ae14841659738d6d733d59d0d217a93bf::coin::COIN")
        .unwrap()
}

fn funded_sender(ledger: &MemoryLedger) -> Keypair {
    let sender = Keypair::from_secret_bytes([0x11; 32]);
    ledger.mint(sender.address(), &CoinType::sui(), 10 * ONE_SUI);
    ledger.mint(sender.address(), &usdc(), 600_000);
    ledger.mint(sender.address(), &usdc(), 400_000);
    ledger.set_coin_metadata(
        &usdc(),
        CoinMetadata {
            symbol: "USDC".into(),
            decimals: 6,
            icon_url: None,
        },
    );
    sender
}

#[tokio::test]
async fn test_single_link_send_and_claim() {
    let ledger = MemoryLedger::default();
    let sender = funded_sender(&ledger);
    let cache = MetadataCache::new();

    let decimals = cache.get(&ledger, &usdc()).await.unwrap().decimals;
    let amount = parse_amount("0.5", decimals).unwrap();
    assert_eq!(amount, 500_000);

    let link = ClaimLink::generate(LinkVariant::Direct, LinkRouting::default()).unwrap();
    let claims = ClaimSpec::single(usdc(), amount).unwrap();
    let tx = build_funding_transaction(sender.address(), &link, &claims, None).unwrap();
    submit_transaction(&ledger, &tx, &[&sender]).await.unwrap();
    assert_eq!(ledger.balance(sender.address(), &usdc()), 500_000);

    // The claimer only has the URL
    let opened = ClaimLink::from_url(&link.url().unwrap()).unwrap();
    let snapshot = fetch_snapshot(&ledger, opened.address(), opened.variant(), None)
        .await
        .unwrap();
    assert_eq!(snapshot.balances.len(), 1);
    assert_eq!(snapshot.balance_of(&usdc()), 500_000);

    let recipient = Address::new([0x22; 32]);
    claim_link(&ledger, &opened, recipient, None, None).await.unwrap();
    assert_eq!(ledger.balance(recipient, &usdc()), 500_000);
    assert_eq!(
        ledger.balance(recipient, &CoinType::sui()),
        CLAIM_GAS_RESERVE - ledger.gas_fee()
    );

    let after = fetch_snapshot(&ledger, opened.address(), opened.variant(), None)
        .await
        .unwrap();
    assert!(!after.is_claimable());
}

#[tokio::test]
async fn test_claim_twice_reports_already_claimed() {
    let ledger = MemoryLedger::default();
    let sender = funded_sender(&ledger);
    let link = ClaimLink::generate(LinkVariant::Direct, LinkRouting::default()).unwrap();
    let claims = ClaimSpec::single(CoinType::sui(), ONE_SUI).unwrap();
    let tx = build_funding_transaction(sender.address(), &link, &claims, None).unwrap();
    submit_transaction(&ledger, &tx, &[&sender]).await.unwrap();

    let recipient = Address::new([0x22; 32]);
    claim_link(&ledger, &link, recipient, None, None).await.unwrap();

    for _ in 0..2 {
        let err = build_claim_transaction(&ledger, &link, recipient, None, None)
            .await
            .unwrap_err();
        assert_eq!(err, ZkSendError::AlreadyClaimed);
    }
}

#[tokio::test]
async fn test_bulk_links_from_group_syntax() {
    let ledger = MemoryLedger::default();
    let sender = funded_sender(&ledger);

    let groups = parse_link_groups("2x100 3x50").unwrap();
    let specs = expand_link_groups(&groups, &usdc(), 0).unwrap();
    let (tx, links) = build_batch_funding_transaction(
        sender.address(),
        &specs,
        LinkVariant::Direct,
        &LinkRouting::default(),
        None,
    )
    .unwrap();
    assert_eq!(links.len(), 5);
    assert_eq!(tx.split_total(&usdc()), 350);

    let urls = links
        .iter()
        .map(|link| link.url().unwrap())
        .collect::<Vec<_>>();
    let csv = links_to_csv(&urls);
    assert_eq!(csv.lines().count(), 5);

    let sui_before = ledger.balance(sender.address(), &CoinType::sui());
    submit_transaction(&ledger, &tx, &[&sender]).await.unwrap();
    assert_eq!(ledger.balance(sender.address(), &usdc()), 1_000_000 - 350);
    assert_eq!(
        ledger.balance(sender.address(), &CoinType::sui()),
        sui_before - 5 * CLAIM_GAS_RESERVE - ledger.gas_fee()
    );

    let mut held = Vec::new();
    for line in csv.lines() {
        let link = ClaimLink::from_url(line).unwrap();
        let snapshot = fetch_snapshot(&ledger, link.address(), link.variant(), None)
            .await
            .unwrap();
        held.push(snapshot.balance_of(&usdc()));
    }
    assert_eq!(held, vec![100, 100, 50, 50, 50]);
}

#[tokio::test]
async fn test_funding_with_insufficient_balance_fails_with_digest() {
    let ledger = MemoryLedger::default();
    let sender = funded_sender(&ledger);
    let link = ClaimLink::generate(LinkVariant::Direct, LinkRouting::default()).unwrap();
    let claims = ClaimSpec::single(usdc(), 2_000_000).unwrap();
    let tx = build_funding_transaction(sender.address(), &link, &claims, None).unwrap();

    match submit_transaction(&ledger, &tx, &[&sender]).await {
        Err(ZkSendError::ClaimExecution { digest, raw_errors }) => {
            assert!(!digest.is_empty());
            assert!(raw_errors[0].contains("InsufficientCoinBalance"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(ledger.balance(sender.address(), &usdc()), 1_000_000);
}

#[tokio::test]
async fn test_reclaim_returns_assets_to_sender() {
    let ledger = MemoryLedger::default();
    let sender = funded_sender(&ledger);
    let link = ClaimLink::generate(LinkVariant::Direct, LinkRouting::default()).unwrap();
    let claims = ClaimSpec::single(usdc(), 250_000).unwrap();
    let tx = build_funding_transaction(sender.address(), &link, &claims, None).unwrap();
    submit_transaction(&ledger, &tx, &[&sender]).await.unwrap();

    reclaim_link(&ledger, &link, &sender, None).await.unwrap();
    assert_eq!(ledger.balance(sender.address(), &usdc()), 1_000_000);
    assert_eq!(
        build_reclaim_transaction(&ledger, &link, sender.address(), None)
            .await
            .unwrap_err(),
        ZkSendError::AlreadyClaimed
    );
}

#[tokio::test]
async fn test_claim_and_reclaim_race_has_one_winner() {
    let ledger = MemoryLedger::default();
    let sender = funded_sender(&ledger);
    let link = ClaimLink::generate(LinkVariant::Direct, LinkRouting::default()).unwrap();
    let claims = ClaimSpec::single(usdc(), 300_000).unwrap();
    let tx = build_funding_transaction(sender.address(), &link, &claims, None).unwrap();
    submit_transaction(&ledger, &tx, &[&sender]).await.unwrap();

    let recipient = Address::new([0x33; 32]);
    let (claimed, reclaimed) = tokio::join!(
        claim_link(&ledger, &link, recipient, None, None),
        reclaim_link(&ledger, &link, &sender, None),
    );

    let outcomes = [claimed, reclaimed];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, ZkSendError::ClaimExecution { digest, .. } if !digest.is_empty()));

    let total = ledger.balance(recipient, &usdc()) + ledger.balance(sender.address(), &usdc());
    assert_eq!(total, 1_000_000);
    let after = fetch_snapshot(&ledger, link.address(), link.variant(), None)
        .await
        .unwrap();
    assert!(!after.is_claimable());
}

#[tokio::test]
async fn test_escrow_token_rejected_by_direct_path() {
    let link = ClaimLink::generate(LinkVariant::Escrow, LinkRouting::default()).unwrap();
    let decoded = ClaimLink::from_url(&link.url().unwrap()).unwrap();
    assert_eq!(decoded.variant(), LinkVariant::Escrow);
    assert!(matches!(
        decoded.require_variant(LinkVariant::Direct),
        Err(ZkSendError::VariantMismatch { .. })
    ));

    // Without a contract the escrow link cannot even be inspected
    let ledger = MemoryLedger::default();
    assert_eq!(
        fetch_snapshot(&ledger, decoded.address(), decoded.variant(), None)
            .await
            .unwrap_err(),
        ZkSendError::MissingContract
    );
}
