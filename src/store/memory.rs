//! In-memory backend, for tests and store-less dry runs (`store.url = "memory"`).

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{MarketRecord, MarketStore, TradeRecord};

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    markets: BTreeMap<u64, MarketRecord>,
    trades: HashMap<String, TradeRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn upsert_market(&self, record: &MarketRecord) -> anyhow::Result<()> {
        self.inner
            .write()
            .await
            .markets
            .insert(record.market_id, record.clone());
        Ok(())
    }

    async fn get_market(&self, market_id: u64) -> anyhow::Result<Option<MarketRecord>> {
        Ok(self.inner.read().await.markets.get(&market_id).cloned())
    }

    async fn all_markets(&self) -> anyhow::Result<Vec<MarketRecord>> {
        Ok(self.inner.read().await.markets.values().cloned().collect())
    }

    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.trades.contains_key(&trade.tx_signature) {
            return Ok(false);
        }
        inner
            .trades
            .insert(trade.tx_signature.clone(), trade.clone());
        Ok(true)
    }
}
