//! Trade-event ingestion.
//!
//! Two strategies feed one sink: `push` subscribes to program logs over
//! WebSocket, `pull` polls signatures and fetches transaction detail. Both
//! end up here, where the first decodable buy-shares event of a
//! transaction is upserted keyed on the signature. The store's
//! insert-if-absent makes redelivery, reconnect replay and overlapping
//! poll windows harmless.

use base64::engine::general_purpose;
use base64::Engine;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::program::codec::{self, DecodeError, TradeEvent};
use crate::program::ProgramRevision;
use crate::store::{MarketStore, TradeRecord};

pub mod pull;
pub mod push;

pub use pull::PullIngester;
pub use push::PushIngester;

/// Marker prefixing event payloads in transaction logs.
pub const EVENT_LOG_PREFIX: &str = "Program data: ";

/// Decode one log line, if it carries an event payload.
///
/// `None` means the line is not a base64 event payload at all; `Some(Err)`
/// means it is one but the bytes don't decode as a buy-shares event.
fn decode_event_line(
    line: &str,
    revision: ProgramRevision,
) -> Option<Result<TradeEvent, DecodeError>> {
    let payload = line.strip_prefix(EVENT_LOG_PREFIX)?;
    let cleaned = payload.trim().trim_matches('"');
    let bytes = general_purpose::STANDARD.decode(cleaned).ok()?;
    Some(codec::decode_trade_event(&bytes, revision))
}

/// First buy-shares event in a transaction's log lines. One record per
/// signature is the data model, so the first decodable event wins.
pub fn first_trade_event(logs: &[String], revision: ProgramRevision) -> Option<TradeEvent> {
    for line in logs {
        match decode_event_line(line, revision) {
            None => continue,
            Some(Ok(event)) => return Some(event),
            // Other event types share the program's log stream.
            Some(Err(DecodeError::DiscriminatorMismatch { .. })) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "undecodable event payload in logs");
                continue;
            }
        }
    }
    None
}

/// The idempotent sink both ingestion strategies converge on.
pub struct TradeSink {
    store: Arc<dyn MarketStore>,
    revision: ProgramRevision,
}

impl TradeSink {
    pub fn new(store: Arc<dyn MarketStore>, revision: ProgramRevision) -> Self {
        Self { store, revision }
    }

    /// Decode and persist the trade carried by a transaction's logs.
    /// Returns true when a new record was stored.
    pub async fn ingest_logs(&self, signature: &str, logs: &[String]) -> bool {
        let Some(event) = first_trade_event(logs, self.revision) else {
            return false;
        };

        let trade = TradeRecord {
            tx_signature: signature.to_string(),
            market_address: event.market.to_string(),
            market_id: event.market_id,
            user_address: event.user.to_string(),
            is_yes: event.is_yes,
            shares: event.shares,
            yes_liquidity: event.yes_liquidity,
            no_liquidity: event.no_liquidity,
            timestamp: event.timestamp,
        };

        match self.store.record_trade(&trade).await {
            Ok(true) => {
                info!(
                    signature = %signature,
                    market_id = trade.market_id,
                    is_yes = trade.is_yes,
                    shares = trade.shares,
                    "trade stored"
                );
                true
            }
            Ok(false) => {
                debug!(signature = %signature, "duplicate trade skipped");
                false
            }
            Err(e) => {
                warn!(error = %e, signature = %signature, "failed to store trade");
                false
            }
        }
    }
}
