// Well-known program ids, mints, seeds and relay tip accounts
//
// `solana_sdk::pubkey!` parses at compile time, so a typo fails the build
// instead of the first trigger.

use solana_sdk::{pubkey, pubkey::Pubkey};

/// Wrapped SOL token mint address (9 decimals)
pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

/// Raydium liquidity pool v4 program
pub const RAYDIUM_AMM_PROGRAM_ID: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");

/// Serum DEX v3 program, the order book Raydium v4 pools settle against
pub const SERUM_PROGRAM_ID: Pubkey = pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX");

/// OpenBook v1 program (Serum fork)
pub const OPENBOOK_PROGRAM_ID: Pubkey = pubkey!("opnb2LAfJYbRMAHHvqjCwQxanZn7ReEHp1k81EohpZb");

/// Seeds of the Raydium v4 program-derived accounts
pub const AMM_AUTHORITY_SEED: &[u8] = b"amm authority";
pub const OPEN_ORDERS_SEED: &[u8] = b"open_order_associated_seed";
pub const TARGET_ORDERS_SEED: &[u8] = b"target_associated_seed";

/// Block engine tip collection accounts; one is picked at random per bundle
pub const TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
];

/// Smallest tip the block engine accepts
pub const MIN_TIP_LAMPORTS: u64 = 1_000;

/// Upper bound on the derived-address nonce search
pub const MAX_DERIVATION_NONCE: u64 = 100;
