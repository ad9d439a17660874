//! Valkey (Redis-compatible) backend.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use super::{MarketRecord, MarketStore, TradeRecord};

/// Valkey-backed store.
///
/// Keys are namespaced under a configurable prefix so multiple agents
/// (e.g. devnet vs mainnet) can share one Valkey without collisions.
#[derive(Clone)]
pub struct ValkeyStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl ValkeyStore {
    /// Connect to Valkey/Redis.
    pub async fn connect(url: &str, prefix: &str) -> anyhow::Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(url = url, prefix = prefix, "connected to Valkey");
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    /// Build a namespaced key: "{prefix}:{suffix}"
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    /// Test connectivity.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(response = %pong, "Valkey ping");
        Ok(())
    }
}

#[async_trait]
impl MarketStore for ValkeyStore {
    async fn upsert_market(&self, record: &MarketRecord) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let key = self.key(&format!("market:{}", record.market_id));
        let json = serde_json::to_string(record)?;
        conn.set::<_, _, ()>(&key, &json).await?;
        conn.sadd::<_, _, ()>(&self.key("markets"), record.market_id)
            .await?;
        debug!(market_id = record.market_id, "stored market");
        Ok(())
    }

    async fn get_market(&self, market_id: u64) -> anyhow::Result<Option<MarketRecord>> {
        let mut conn = self.conn.clone();
        let key = self.key(&format!("market:{market_id}"));
        let json: Option<String> = conn.get(&key).await?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    async fn all_markets(&self) -> anyhow::Result<Vec<MarketRecord>> {
        let mut conn = self.conn.clone();
        let mut ids: Vec<u64> = conn.smembers(&self.key("markets")).await?;
        ids.sort_unstable();

        let mut markets = Vec::with_capacity(ids.len());
        for id in ids {
            let json: Option<String> = conn.get(&self.key(&format!("market:{id}"))).await?;
            if let Some(j) = json {
                markets.push(serde_json::from_str(&j)?);
            }
        }
        Ok(markets)
    }

    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let key = self.key(&format!("trade:{}", trade.tx_signature));
        let json = serde_json::to_string(trade)?;

        // SET NX is the idempotency guard: second writer loses.
        let inserted: bool = conn.set_nx(&key, &json).await?;
        if inserted {
            conn.sadd::<_, _, ()>(&self.key("trades"), &trade.tx_signature)
                .await?;
            debug!(
                signature = %trade.tx_signature,
                market_id = trade.market_id,
                "trade recorded"
            );
        }
        Ok(inserted)
    }
}
