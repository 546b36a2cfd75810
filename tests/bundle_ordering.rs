// External transactions lead the bundle unchanged; ours is last.

mod helpers;

use helpers::{program_ids, PoolFixture};
use jito_pool_sniper::chain::bundle::{BundleAssembler, PoolKeys, SwapSide, TransactionConfig};
use jito_pool_sniper::chain::constants::RAYDIUM_AMM_PROGRAM_ID;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Keypair, signer::Signer,
    transaction::VersionedTransaction,
};

fn keys() -> PoolKeys {
    PoolKeys {
        id: Pubkey::new_unique(),
        authority: Pubkey::new_unique(),
        open_orders: Pubkey::new_unique(),
        target_orders: Pubkey::new_unique(),
        base_vault: Pubkey::new_unique(),
        quote_vault: Pubkey::new_unique(),
        market_program: Pubkey::new_unique(),
        market_id: Pubkey::new_unique(),
        market_bids: Pubkey::new_unique(),
        market_asks: Pubkey::new_unique(),
        market_event_queue: Pubkey::new_unique(),
        market_base_vault: Pubkey::new_unique(),
        market_quote_vault: Pubkey::new_unique(),
        market_authority: Pubkey::new_unique(),
    }
}

#[test]
fn test_external_first_own_last() {
    let external = PoolFixture::new().create_pool_tx(&Keypair::new(), 0);
    let payer = Keypair::new();
    let blockhash = Hash::new_unique();
    let assembler = BundleAssembler::new(TransactionConfig::default());

    let bundle = assembler
        .build_bundle(
            &payer,
            SwapSide::Buy,
            Pubkey::new_unique(),
            1_000_000,
            &keys(),
            blockhash,
            &[external.clone()],
        )
        .unwrap();

    assert_eq!(bundle.packets.len(), 2);
    assert_eq!(bundle.packets[0].data, external);
    for packet in &bundle.packets {
        let meta = packet.meta.as_ref().unwrap();
        assert_eq!(meta.size as usize, packet.data.len());
        assert_eq!(meta.addr, "0.0.0.0");
        assert_eq!(meta.port, 0);
        assert_eq!(meta.sender_stake, 0);
    }

    let own: VersionedTransaction =
        bincode::deserialize(&bundle.packets.last().unwrap().data).unwrap();
    assert_eq!(own.message.static_account_keys()[0], payer.pubkey());
    assert_eq!(*own.message.recent_blockhash(), blockhash);
    assert!(own.verify_with_results().into_iter().all(|ok| ok));
}

#[test]
fn test_multiple_externals_keep_their_order() {
    let first = PoolFixture::new().create_pool_tx(&Keypair::new(), 0);
    let second = PoolFixture::new().create_pool_tx(&Keypair::new(), 0);
    let assembler = BundleAssembler::new(TransactionConfig::default());

    let bundle = assembler
        .build_bundle(
            &Keypair::new(),
            SwapSide::Buy,
            Pubkey::new_unique(),
            1,
            &keys(),
            Hash::new_unique(),
            &[first.clone(), second.clone()],
        )
        .unwrap();

    assert_eq!(bundle.packets.len(), 3);
    assert_eq!(bundle.packets[0].data, first);
    assert_eq!(bundle.packets[1].data, second);
}

#[test]
fn test_sell_bundle_without_externals() {
    let assembler = BundleAssembler::new(TransactionConfig::default());
    let bundle = assembler
        .build_bundle(
            &Keypair::new(),
            SwapSide::Sell,
            Pubkey::new_unique(),
            1,
            &keys(),
            Hash::new_unique(),
            &[],
        )
        .unwrap();
    assert_eq!(bundle.packets.len(), 1);
    let own: VersionedTransaction = bincode::deserialize(&bundle.packets[0].data).unwrap();
    assert_eq!(program_ids(&own).last(), Some(&RAYDIUM_AMM_PROGRAM_ID));
}
