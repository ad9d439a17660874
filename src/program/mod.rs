//! On-chain program surface: ids, seeds, discriminators, revisions.
//!
//! Everything the agent knows about the prediction-market program's wire
//! format lives under this module. `pda` derives the program's addresses,
//! `codec` encodes instructions and decodes accounts/events. Nothing here
//! performs I/O.

use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;

pub mod codec;
pub mod pda;

/// Deployed program id (devnet deployment of the market program).
pub const DEFAULT_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("CogMUfHjP4A9Lx6M94D6CCjEytxZuaB1uy1AaHQoq3KV");

// ─── PDA seeds ───────────────────────────────────────────────────────────────

pub const CONFIG_SEED: &[u8] = b"config";
pub const MARKET_SEED: &[u8] = b"market";
pub const VAULT_SEED: &[u8] = b"vault";
pub const POSITION_SEED: &[u8] = b"position";
pub const FEE_VAULT_SEED: &[u8] = b"fee_vault";

// ─── Anchor discriminators ───────────────────────────────────────────────────
//
// Pre-computed first 8 bytes of sha256 over the Anchor namespace string.
// Stored as constants so decode paths never hash at runtime.

/// sha256("global:initialize")[..8]
pub const IX_INITIALIZE: [u8; 8] = [175, 175, 109, 31, 13, 152, 155, 237];
/// sha256("global:create_market")[..8]
pub const IX_CREATE_MARKET: [u8; 8] = [103, 226, 97, 235, 200, 188, 251, 254];
/// sha256("global:buy_shares")[..8]
pub const IX_BUY_SHARES: [u8; 8] = [40, 239, 138, 154, 8, 37, 106, 108];
/// sha256("global:resolve_market")[..8]
pub const IX_RESOLVE_MARKET: [u8; 8] = [155, 23, 80, 173, 46, 74, 23, 239];
/// sha256("global:claim_winnings")[..8]
pub const IX_CLAIM_WINNINGS: [u8; 8] = [161, 215, 24, 59, 14, 236, 242, 221];
/// sha256("global:withdraw_fees")[..8]
pub const IX_WITHDRAW_FEES: [u8; 8] = [198, 212, 171, 109, 144, 215, 174, 89];
/// sha256("global:sweep_funds")[..8]
pub const IX_SWEEP_FUNDS: [u8; 8] = [150, 235, 156, 105, 133, 142, 200, 162];

/// sha256("account:Market")[..8]
pub const ACC_MARKET: [u8; 8] = [219, 190, 213, 55, 0, 227, 198, 154];
/// sha256("account:Config")[..8]
pub const ACC_CONFIG: [u8; 8] = [155, 12, 170, 224, 30, 250, 204, 130];
/// sha256("event:BuySharesEvent")[..8]
pub const EV_BUY_SHARES: [u8; 8] = [185, 52, 1, 127, 117, 180, 40, 122];

// ─── Field limits enforced by the program ────────────────────────────────────

pub const MAX_QUESTION_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_CATEGORY_LEN: usize = 50;

/// Custom error code the program returns when a swept vault holds nothing.
/// Treated as success by the sweep path.
pub const ERR_NO_REMAINING_FUNDS: u32 = 6016;

/// Name for an Anchor custom error code, for log lines. Codes below 6000
/// are framework errors and map to `None`.
pub fn error_name(code: u32) -> Option<&'static str> {
    let names = [
        "Unauthorized",
        "QuestionTooLong",
        "DescriptionTooLong",
        "CategoryTooLong",
        "InvalidResolutionTime",
        "InsufficientInitialLiquidity",
        "MarketResolved",
        "MarketExpired",
        "InvalidAmount",
        "MathOverflow",
        "InsufficientLiquidity",
        "SlippageExceeded",
        "MarketNotExpired",
        "MarketNotResolved",
        "NoWinningShares",
        "AlreadyClaimed",
        "NoRemainingFunds",
    ];
    code.checked_sub(6000)
        .and_then(|i| names.get(i as usize))
        .copied()
}

// ─── Program revisions ───────────────────────────────────────────────────────

/// Wire-format differences between deployed revisions of the program.
///
/// The deployment history changed three encodings without changing
/// discriminators, so the revision in play is explicit configuration.
/// Nothing attempts to sniff it from payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramRevision {
    /// `resolve_market` carries a leading u64 market_id before the outcome.
    pub resolve_takes_market_id: bool,
    /// Trade events carry liquidity as length-prefixed decimal strings
    /// instead of raw u64 lamports.
    pub string_liquidity_events: bool,
    /// The Config account tail includes a fee_vault bump byte.
    pub config_has_fee_vault_bump: bool,
}

/// Named revision selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionPreset {
    /// First deployment: string liquidity in events, no fee vault.
    Legacy,
    /// Live deployment.
    Current,
}

impl RevisionPreset {
    pub fn revision(self) -> ProgramRevision {
        match self {
            RevisionPreset::Legacy => ProgramRevision {
                resolve_takes_market_id: false,
                string_liquidity_events: true,
                config_has_fee_vault_bump: false,
            },
            RevisionPreset::Current => ProgramRevision {
                resolve_takes_market_id: true,
                string_liquidity_events: false,
                config_has_fee_vault_bump: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_name_table() {
        assert_eq!(error_name(6000), Some("Unauthorized"));
        assert_eq!(error_name(6016), Some("NoRemainingFunds"));
        assert_eq!(error_name(ERR_NO_REMAINING_FUNDS), Some("NoRemainingFunds"));
        assert_eq!(error_name(6017), None);
        assert_eq!(error_name(3012), None);
    }

    #[test]
    fn test_revision_presets_differ() {
        let legacy = RevisionPreset::Legacy.revision();
        let current = RevisionPreset::Current.revision();
        assert!(legacy.string_liquidity_events && !current.string_liquidity_events);
        assert!(current.resolve_takes_market_id && !legacy.resolve_takes_market_id);
        assert!(current.config_has_fee_vault_bump && !legacy.config_has_fee_vault_bump);
    }

    #[test]
    fn test_default_program_id_round_trips() {
        let text = DEFAULT_PROGRAM_ID.to_string();
        assert_eq!(text.parse::<Pubkey>().ok(), Some(DEFAULT_PROGRAM_ID));
    }
}
