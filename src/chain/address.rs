// Derived Address Computation
//
// Deterministic program-derived addresses for the accounts a swap touches:
// - Serum market vault signer (ascending u64 nonce search, max 100 attempts)
// - Raydium v4 authority / open orders / target orders (canonical bump)
// - associated token accounts
//
// Every result is cached per (scheme, seeds, program) in a map owned by the
// deriver, so a deriver lives as long as the run that created it and nothing
// is shared process-wide.

use dashmap::DashMap;
use solana_sdk::pubkey::{Pubkey, PubkeyError};
use spl_associated_token_account::get_associated_token_address;
use thiserror::Error;
use tracing::debug;

use super::constants::{
    AMM_AUTHORITY_SEED, MAX_DERIVATION_NONCE, OPEN_ORDERS_SEED, RAYDIUM_AMM_PROGRAM_ID,
    TARGET_ORDERS_SEED,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("no off-curve address found within {attempts} nonces")]
    NoValidNonce { attempts: u64 },
    #[error("invalid seeds: {0}")]
    InvalidSeeds(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NonceScheme {
    /// one trailing byte, counting up from 0
    ByteAscending,
    /// eight trailing little-endian bytes, counting up from 0
    U64Ascending,
    /// `find_program_address`: one trailing byte, counting down from 255
    Canonical,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DerivationKey {
    scheme: NonceScheme,
    program: Pubkey,
    seeds: Vec<Vec<u8>>,
}

impl DerivationKey {
    fn new(scheme: NonceScheme, seeds: &[&[u8]], program: &Pubkey) -> Self {
        Self {
            scheme,
            program: *program,
            seeds: seeds.iter().map(|s| s.to_vec()).collect(),
        }
    }
}

/// Derived address plus the nonce that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    pub address: Pubkey,
    pub nonce: u64,
}

#[derive(Debug, Default)]
pub struct AddressDeriver {
    cache: DashMap<DerivationKey, Derived>,
}

impl AddressDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a one-byte nonce counting up from 0 and return the first
    /// off-curve address.
    pub fn find_with_nonce(
        &self,
        seeds: &[&[u8]],
        program: &Pubkey,
    ) -> Result<Derived, DerivationError> {
        self.cached(NonceScheme::ByteAscending, seeds, program, || {
            search_nonce(seeds, program, MAX_DERIVATION_NONCE, |n| vec![n as u8])
        })
    }

    /// Serum vault signer: seeds `[market, nonce as u64 LE]`.
    pub fn vault_signer(
        &self,
        market: &Pubkey,
        dex_program: &Pubkey,
    ) -> Result<Derived, DerivationError> {
        let seeds: [&[u8]; 1] = [market.as_ref()];
        self.cached(NonceScheme::U64Ascending, &seeds, dex_program, || {
            search_nonce(&seeds, dex_program, MAX_DERIVATION_NONCE, |n| {
                n.to_le_bytes().to_vec()
            })
        })
    }

    /// Canonical-bump program address.
    pub fn program_address(&self, seeds: &[&[u8]], program: &Pubkey) -> Derived {
        let key = DerivationKey::new(NonceScheme::Canonical, seeds, program);
        if let Some(hit) = self.cache.get(&key) {
            return *hit;
        }
        let (address, bump) = Pubkey::find_program_address(seeds, program);
        let derived = Derived {
            address,
            nonce: u64::from(bump),
        };
        self.cache.insert(key, derived);
        derived
    }

    pub fn amm_authority(&self) -> Pubkey {
        self.program_address(&[AMM_AUTHORITY_SEED], &RAYDIUM_AMM_PROGRAM_ID)
            .address
    }

    pub fn amm_open_orders(&self, market: &Pubkey) -> Pubkey {
        self.amm_associated(market, OPEN_ORDERS_SEED)
    }

    pub fn amm_target_orders(&self, market: &Pubkey) -> Pubkey {
        self.amm_associated(market, TARGET_ORDERS_SEED)
    }

    fn amm_associated(&self, market: &Pubkey, seed: &[u8]) -> Pubkey {
        self.program_address(
            &[RAYDIUM_AMM_PROGRAM_ID.as_ref(), market.as_ref(), seed],
            &RAYDIUM_AMM_PROGRAM_ID,
        )
        .address
    }

    pub fn associated_token(&self, owner: &Pubkey, mint: &Pubkey) -> Pubkey {
        get_associated_token_address(owner, mint)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn cached(
        &self,
        scheme: NonceScheme,
        seeds: &[&[u8]],
        program: &Pubkey,
        derive: impl FnOnce() -> Result<Derived, DerivationError>,
    ) -> Result<Derived, DerivationError> {
        let key = DerivationKey::new(scheme, seeds, program);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(*hit);
        }
        let derived = derive()?;
        debug!(
            address = %derived.address,
            nonce = derived.nonce,
            program = %program,
            "Derived address"
        );
        self.cache.insert(key, derived);
        Ok(derived)
    }
}

fn search_nonce(
    seeds: &[&[u8]],
    program: &Pubkey,
    max_attempts: u64,
    encode_nonce: impl Fn(u64) -> Vec<u8>,
) -> Result<Derived, DerivationError> {
    for nonce in 0..max_attempts {
        let nonce_bytes = encode_nonce(nonce);
        let mut with_nonce: Vec<&[u8]> = seeds.to_vec();
        with_nonce.push(&nonce_bytes);

        match Pubkey::create_program_address(&with_nonce, program) {
            Ok(address) => return Ok(Derived { address, nonce }),
            Err(PubkeyError::InvalidSeeds) => continue,
            Err(e) => return Err(DerivationError::InvalidSeeds(e.to_string())),
        }
    }
    Err(DerivationError::NoValidNonce {
        attempts: max_attempts,
    })
}
