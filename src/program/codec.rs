//! Binary codec for the market program's instructions, accounts and events.
//!
//! Layouts follow the Anchor convention: an 8-byte discriminator, then
//! fields in declared order, little-endian, strings as a u32 length prefix
//! plus raw UTF-8. Encoders build instruction data; decoders read account
//! blobs and event payloads with a moving cursor and fail loudly rather
//! than guessing at malformed input.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use super::{
    ProgramRevision, ACC_CONFIG, ACC_MARKET, EV_BUY_SHARES, IX_BUY_SHARES, IX_CLAIM_WINNINGS,
    IX_CREATE_MARKET, IX_INITIALIZE, IX_RESOLVE_MARKET, IX_SWEEP_FUNDS, IX_WITHDRAW_FEES,
    MAX_CATEGORY_LEN, MAX_DESCRIPTION_LEN, MAX_QUESTION_LEN,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{field} is {len} bytes, program limit is {max}")]
    StringTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Blob carries the right discriminator but ends early. Distinct from a
    /// wrong-type blob so callers can tell corruption from misaddressing.
    #[error("{kind} data truncated at byte {at}, needed {needed} more")]
    InsufficientData {
        kind: &'static str,
        at: usize,
        needed: usize,
    },
    #[error("not a {kind} record (discriminator mismatch)")]
    DiscriminatorMismatch { kind: &'static str },
    #[error("bad {field} text: {detail}")]
    Text { field: &'static str, detail: String },
}

// ─── Cursor reader ───────────────────────────────────────────────────────────

struct Reader<'a> {
    kind: &'static str,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(kind: &'static str, buf: &'a [u8]) -> Self {
        Self { kind, buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::InsufficientData {
            kind: self.kind,
            at: self.pos,
            needed: n,
        })?;
        if end > self.buf.len() {
            return Err(DecodeError::InsufficientData {
                kind: self.kind,
                at: self.pos,
                needed: end - self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn discriminator(&mut self, expected: [u8; 8]) -> Result<(), DecodeError> {
        let got = self.take(8)?;
        if got != expected {
            return Err(DecodeError::DiscriminatorMismatch { kind: self.kind });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.u64()? as i64)
    }

    fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    fn pubkey(&mut self) -> Result<Pubkey, DecodeError> {
        let b = self.take(32)?;
        let mut buf = [0u8; 32];
        buf.copy_from_slice(b);
        Ok(Pubkey::new_from_array(buf))
    }

    /// u32 length prefix + UTF-8 bytes.
    fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| DecodeError::Text {
            field,
            detail: e.to_string(),
        })
    }

    /// Length-prefixed decimal text holding a u64.
    fn text_u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        let text = self.string(field)?;
        text.trim().parse::<u64>().map_err(|_| DecodeError::Text {
            field,
            detail: format!("not a u64: {text:?}"),
        })
    }
}

// ─── Instruction encoders ────────────────────────────────────────────────────

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn check_len(field: &'static str, s: &str, max: usize) -> Result<(), EncodeError> {
    if s.len() > max {
        return Err(EncodeError::StringTooLong {
            field,
            len: s.len(),
            max,
        });
    }
    Ok(())
}

pub fn initialize() -> Vec<u8> {
    IX_INITIALIZE.to_vec()
}

pub fn create_market(
    market_id: u64,
    question: &str,
    description: &str,
    category: &str,
    resolution_time: i64,
    initial_liquidity: u64,
) -> Result<Vec<u8>, EncodeError> {
    check_len("question", question, MAX_QUESTION_LEN)?;
    check_len("description", description, MAX_DESCRIPTION_LEN)?;
    check_len("category", category, MAX_CATEGORY_LEN)?;

    let mut data = IX_CREATE_MARKET.to_vec();
    data.extend_from_slice(&market_id.to_le_bytes());
    put_string(&mut data, question);
    put_string(&mut data, description);
    put_string(&mut data, category);
    data.extend_from_slice(&resolution_time.to_le_bytes());
    data.extend_from_slice(&initial_liquidity.to_le_bytes());
    Ok(data)
}

pub fn buy_shares(is_yes: bool, amount_lamports: u64, min_shares_out: u64) -> Vec<u8> {
    let mut data = IX_BUY_SHARES.to_vec();
    data.push(is_yes as u8);
    data.extend_from_slice(&amount_lamports.to_le_bytes());
    data.extend_from_slice(&min_shares_out.to_le_bytes());
    data
}

/// Earlier program revisions take only the outcome byte; the market is
/// identified purely by the account metas.
pub fn resolve_market(revision: ProgramRevision, market_id: u64, outcome_yes: bool) -> Vec<u8> {
    let mut data = IX_RESOLVE_MARKET.to_vec();
    if revision.resolve_takes_market_id {
        data.extend_from_slice(&market_id.to_le_bytes());
    }
    data.push(outcome_yes as u8);
    data
}

pub fn claim_winnings(market_id: u64) -> Vec<u8> {
    let mut data = IX_CLAIM_WINNINGS.to_vec();
    data.extend_from_slice(&market_id.to_le_bytes());
    data
}

pub fn withdraw_fees(amount: u64) -> Vec<u8> {
    let mut data = IX_WITHDRAW_FEES.to_vec();
    data.extend_from_slice(&amount.to_le_bytes());
    data
}

pub fn sweep_funds() -> Vec<u8> {
    IX_SWEEP_FUNDS.to_vec()
}

// ─── Account decoders ────────────────────────────────────────────────────────

/// Decoded Market account. Trailing share totals and bump bytes are not
/// surfaced; nothing off-chain consumes them.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketAccount {
    pub market_id: u64,
    pub authority: Pubkey,
    pub question: String,
    pub description: String,
    pub category: String,
    pub resolution_time: i64,
    pub created_at: i64,
    pub initial_liquidity: u64,
    pub yes_liquidity: u64,
    pub no_liquidity: u64,
    pub total_volume: u64,
    pub resolved: bool,
    pub outcome: Option<bool>,
}

pub fn decode_market(data: &[u8]) -> Result<MarketAccount, DecodeError> {
    let mut r = Reader::new("Market", data);
    r.discriminator(ACC_MARKET)?;

    let market_id = r.u64()?;
    let authority = r.pubkey()?;
    let question = r.string("question")?;
    let description = r.string("description")?;
    let category = r.string("category")?;
    let resolution_time = r.i64()?;
    let created_at = r.i64()?;
    let initial_liquidity = r.u64()?;
    let yes_liquidity = r.u64()?;
    let no_liquidity = r.u64()?;
    r.skip(16)?; // k_constant (u128), AMM-internal
    let total_volume = r.u64()?;
    let resolved = r.u8()? != 0;
    let outcome = if r.u8()? != 0 {
        Some(r.u8()? != 0)
    } else {
        None
    };

    Ok(MarketAccount {
        market_id,
        authority,
        question,
        description,
        category,
        resolution_time,
        created_at,
        initial_liquidity,
        yes_liquidity,
        no_liquidity,
        total_volume,
        resolved,
        outcome,
    })
}

/// Decoded Config account: the program's global state, read fresh before
/// every operation that depends on `market_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigAccount {
    pub authority: Pubkey,
    pub market_count: u64,
    pub fee_percentage: u16,
    pub bump: u8,
    pub fee_vault_bump: Option<u8>,
}

pub fn decode_config(data: &[u8], revision: ProgramRevision) -> Result<ConfigAccount, DecodeError> {
    let mut r = Reader::new("Config", data);
    r.discriminator(ACC_CONFIG)?;

    let authority = r.pubkey()?;
    let market_count = r.u64()?;
    let fee_percentage = r.u16()?;
    let bump = r.u8()?;
    let fee_vault_bump = if revision.config_has_fee_vault_bump {
        Some(r.u8()?)
    } else {
        None
    };

    Ok(ConfigAccount {
        authority,
        market_count,
        fee_percentage,
        bump,
        fee_vault_bump,
    })
}

// ─── Event decoder ───────────────────────────────────────────────────────────

/// A buy-shares event emitted by the program. Liquidity is u64 lamports
/// regardless of which wire encoding the revision used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeEvent {
    pub market: Pubkey,
    pub market_id: u64,
    pub user: Pubkey,
    pub is_yes: bool,
    pub shares: u64,
    pub yes_liquidity: u64,
    pub no_liquidity: u64,
    pub timestamp: i64,
}

pub fn decode_trade_event(
    data: &[u8],
    revision: ProgramRevision,
) -> Result<TradeEvent, DecodeError> {
    let mut r = Reader::new("BuySharesEvent", data);
    r.discriminator(EV_BUY_SHARES)?;

    let market = r.pubkey()?;
    let market_id = r.u64()?;
    let user = r.pubkey()?;
    let is_yes = r.u8()? != 0;
    let shares = r.u64()?;
    let (yes_liquidity, no_liquidity) = if revision.string_liquidity_events {
        (r.text_u64("yes_liquidity")?, r.text_u64("no_liquidity")?)
    } else {
        (r.u64()?, r.u64()?)
    };
    let timestamp = r.i64()?;

    Ok(TradeEvent {
        market,
        market_id,
        user,
        is_yes,
        shares,
        yes_liquidity,
        no_liquidity,
        timestamp,
    })
}
