// Jito Pool Sniper Library
//
// Components for a mempool-driven Raydium pool sniper on Solana:
// - Bit-exact decoding of on-chain account layouts and U80F48 fixed-point math
// - Deterministic program address derivation
// - Authenticated block engine client (auth, mempool stream, bundles)
// - Bundle assembly and the per-opportunity execution engine

pub mod chain;
pub mod codec;
pub mod config;
pub mod fixed;
pub mod relay;
pub mod utils;
