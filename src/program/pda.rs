//! Program-derived address computation.
//!
//! Derivation walks bump candidates from 255 downward and takes the first
//! candidate that lands off the ed25519 curve, which is exactly what
//! `Pubkey::find_program_address` does. It is reimplemented here so the
//! bump search stays visible and testable against the SDK.

use solana_sdk::pubkey::Pubkey;

use super::{CONFIG_SEED, FEE_VAULT_SEED, MARKET_SEED, POSITION_SEED, VAULT_SEED};

/// Derive the program address and bump for a seed set.
///
/// Deterministic: the same `(seeds, program_id)` always yields the same
/// `(address, bump)`.
pub fn derive(seeds: &[&[u8]], program_id: &Pubkey) -> (Pubkey, u8) {
    for bump in (0u8..=255).rev() {
        let bump_seed = [bump];
        let mut candidate = Vec::with_capacity(seeds.len() + 1);
        candidate.extend_from_slice(seeds);
        candidate.push(&bump_seed);
        if let Ok(address) = Pubkey::create_program_address(&candidate, program_id) {
            return (address, bump);
        }
    }
    // Exhausting all 256 bumps requires every sha256 candidate to land on
    // the curve. The SDK panics on the same condition.
    panic!("no viable bump for seeds");
}

pub fn config_pda(program_id: &Pubkey) -> (Pubkey, u8) {
    derive(&[CONFIG_SEED], program_id)
}

pub fn fee_vault_pda(program_id: &Pubkey) -> (Pubkey, u8) {
    derive(&[FEE_VAULT_SEED], program_id)
}

pub fn market_pda(program_id: &Pubkey, market_id: u64) -> (Pubkey, u8) {
    derive(&[MARKET_SEED, &market_id.to_le_bytes()], program_id)
}

pub fn vault_pda(program_id: &Pubkey, market_id: u64) -> (Pubkey, u8) {
    derive(&[VAULT_SEED, &market_id.to_le_bytes()], program_id)
}

pub fn position_pda(program_id: &Pubkey, user: &Pubkey, market_id: u64) -> (Pubkey, u8) {
    derive(
        &[POSITION_SEED, user.as_ref(), &market_id.to_le_bytes()],
        program_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::DEFAULT_PROGRAM_ID;

    #[test]
    fn test_matches_sdk_derivation() {
        let program_id = DEFAULT_PROGRAM_ID;
        for market_id in [0u64, 1, 7, 42, u64::MAX] {
            let seeds: &[&[u8]] = &[MARKET_SEED, &market_id.to_le_bytes()];
            let ours = derive(seeds, &program_id);
            let sdk = Pubkey::find_program_address(seeds, &program_id);
            assert_eq!(ours, sdk, "market_id {market_id}");
        }
        assert_eq!(
            config_pda(&program_id),
            Pubkey::find_program_address(&[CONFIG_SEED], &program_id)
        );
    }

    #[test]
    fn test_deterministic() {
        let program_id = DEFAULT_PROGRAM_ID;
        let a = market_pda(&program_id, 9);
        let b = market_pda(&program_id, 9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_ids_distinct_addresses() {
        let program_id = DEFAULT_PROGRAM_ID;
        let (a, _) = market_pda(&program_id, 1);
        let (b, _) = market_pda(&program_id, 2);
        assert_ne!(a, b);
        let (v, _) = vault_pda(&program_id, 1);
        assert_ne!(a, v, "market and vault seeds must not collide");
    }

    #[test]
    fn test_position_pda_depends_on_user() {
        let program_id = DEFAULT_PROGRAM_ID;
        let u1 = Pubkey::new_unique();
        let u2 = Pubkey::new_unique();
        assert_ne!(
            position_pda(&program_id, &u1, 3).0,
            position_pda(&program_id, &u2, 3).0
        );
    }
}
