// One broken pool must not stop the next one.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{engine, next_bundle, notification, FakeChain, PoolFixture, RecordingRelay};
use jito_pool_sniper::chain::constants::SERUM_PROGRAM_ID;
use jito_pool_sniper::chain::mempool::unix_now;
use jito_pool_sniper::chain::MempoolWatcher;
use jito_pool_sniper::codec::RawAccount;
use solana_sdk::signature::Keypair;

#[tokio::test]
async fn test_bad_market_does_not_block_next_pool() {
    let broken = PoolFixture::new();
    let healthy = PoolFixture::new();
    let creator = Keypair::new();
    let now = unix_now();

    // truncated market data fails decoding
    let truncated = RawAccount::new(broken.market.id, SERUM_PROGRAM_ID, vec![0; 40]);
    let (relay, mut bundles) = RecordingRelay::new();
    let engine = engine(
        FakeChain::new(vec![truncated, healthy.market_account()], 0),
        relay,
        Arc::new(Keypair::new()),
    );
    let watcher = MempoolWatcher::new(Arc::clone(&engine));

    let broken_tx = broken.create_pool_tx(&creator, now - 5);
    let healthy_tx = healthy.create_pool_tx(&creator, now - 5);
    let dispatched = watcher.handle_notification(&notification(vec![broken_tx]), now);
    assert_eq!(dispatched, 1);
    let dispatched = watcher.handle_notification(&notification(vec![healthy_tx.clone()]), now);
    assert_eq!(dispatched, 1);

    let bundle = next_bundle(&mut bundles).await;
    assert_eq!(bundle.packets[0].data, healthy_tx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bundles.try_recv().is_err());
}

#[tokio::test]
async fn test_missing_market_in_same_notification() {
    let missing = PoolFixture::new();
    let healthy = PoolFixture::new();
    let creator = Keypair::new();
    let now = unix_now();

    let (relay, mut bundles) = RecordingRelay::new();
    let engine = engine(
        FakeChain::new(vec![healthy.market_account()], 0),
        relay,
        Arc::new(Keypair::new()),
    );
    let watcher = MempoolWatcher::new(Arc::clone(&engine));

    let healthy_tx = healthy.create_pool_tx(&creator, now);
    let dispatched = watcher.handle_notification(
        &notification(vec![missing.create_pool_tx(&creator, now), healthy_tx.clone()]),
        now,
    );
    assert_eq!(dispatched, 2);

    let bundle = next_bundle(&mut bundles).await;
    assert_eq!(bundle.packets[0].data, healthy_tx);
}
