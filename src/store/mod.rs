//! Durable state for markets and ingested trades.
//!
//! Data model (Valkey backend):
//!   market:{market_id}   → JSON MarketRecord
//!   markets              → SET of market_ids
//!   trade:{tx_signature} → JSON TradeRecord   (SET NX, the dedup guard)
//!   trades               → SET of tx_signatures
//!
//! Markets are upserted by the orchestrator and never deleted; trades are
//! written once by ingestion and never mutated. `tx_signature` uniqueness
//! is the sole guard against double ingestion, so both backends implement
//! `record_trade` as insert-if-absent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod valkey;

pub use memory::MemoryStore;
pub use valkey::ValkeyStore;

/// A market the agent owns, from creation through sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecord {
    pub market_id: u64,
    /// Base58 address of the on-chain market account.
    pub market_address: String,
    pub question: String,
    pub description: String,
    pub category: String,
    pub resolution_time: i64,
    pub created_at: i64,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub outcome: Option<bool>,
    #[serde(default)]
    pub resolution_reasoning: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<i64>,
    #[serde(default)]
    pub swept: bool,
    #[serde(default)]
    pub corrupted: bool,
    #[serde(default)]
    pub corrupt_reason: Option<String>,
}

/// Lifecycle position derived from record fields; not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketState {
    Open,
    ResolutionDue,
    Resolved,
    SweepDue,
    Swept,
    Corrupted,
}

impl std::fmt::Display for MarketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketState::Open => write!(f, "open"),
            MarketState::ResolutionDue => write!(f, "resolution_due"),
            MarketState::Resolved => write!(f, "resolved"),
            MarketState::SweepDue => write!(f, "sweep_due"),
            MarketState::Swept => write!(f, "swept"),
            MarketState::Corrupted => write!(f, "corrupted"),
        }
    }
}

impl MarketRecord {
    /// Where the market sits in its lifecycle at `now`. Corruption is
    /// terminal and shadows everything else.
    pub fn state(&self, now: i64, sweep_grace_secs: u64) -> MarketState {
        if self.corrupted {
            return MarketState::Corrupted;
        }
        if !self.resolved {
            if self.resolution_time <= now {
                return MarketState::ResolutionDue;
            }
            return MarketState::Open;
        }
        if self.swept {
            return MarketState::Swept;
        }
        let sweep_at = self
            .resolved_at
            .unwrap_or(self.resolution_time)
            .saturating_add(sweep_grace_secs as i64);
        if sweep_at <= now {
            MarketState::SweepDue
        } else {
            MarketState::Resolved
        }
    }

    pub fn mark_corrupted(&mut self, reason: impl Into<String>) {
        self.corrupted = true;
        self.corrupt_reason = Some(reason.into());
    }
}

/// One buy-shares event lifted off chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Transaction signature, globally unique.
    pub tx_signature: String,
    pub market_address: String,
    pub market_id: u64,
    pub user_address: String,
    pub is_yes: bool,
    pub shares: u64,
    pub yes_liquidity: u64,
    pub no_liquidity: u64,
    pub timestamp: i64,
}

/// Market/trade persistence contract shared by the Valkey backend and the
/// in-memory backend.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Insert or replace a market record, keyed on `market_id`.
    async fn upsert_market(&self, record: &MarketRecord) -> anyhow::Result<()>;

    async fn get_market(&self, market_id: u64) -> anyhow::Result<Option<MarketRecord>>;

    /// Every market ever recorded, in market_id order.
    async fn all_markets(&self) -> anyhow::Result<Vec<MarketRecord>>;

    /// Store a trade if its signature is new. Returns false for a
    /// duplicate; the caller counts it and moves on.
    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<bool>;
}
