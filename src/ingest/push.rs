//! Push ingestion over the RPC node's WebSocket log subscription.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use solana_client::nonblocking::pubsub_client::{PubsubClient, PubsubClientError};
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::TradeSink;

const RECONNECT_BASE: Duration = Duration::from_secs(2);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Subscribes to logs mentioning the program and feeds every successful
/// transaction's log lines to the sink. Reconnects forever with capped
/// exponential backoff.
pub struct PushIngester {
    ws_url: String,
    program_id: Pubkey,
    commitment: CommitmentConfig,
    sink: Arc<TradeSink>,
}

impl PushIngester {
    pub fn new(
        ws_url: String,
        program_id: Pubkey,
        commitment: CommitmentConfig,
        sink: Arc<TradeSink>,
    ) -> Self {
        Self {
            ws_url,
            program_id,
            commitment,
            sink,
        }
    }

    pub async fn run(self) {
        let mut delay = RECONNECT_BASE;
        loop {
            match self.connect_and_stream().await {
                Ok(()) => {
                    info!("log subscription closed, reconnecting");
                    delay = RECONNECT_BASE;
                }
                Err(e) => {
                    warn!(error = %e, "log subscription failed, reconnecting");
                }
            }
            sleep(delay).await;
            delay = (delay * 2).min(MAX_RECONNECT_DELAY);
        }
    }

    async fn connect_and_stream(&self) -> Result<(), PubsubClientError> {
        let client = PubsubClient::new(&self.ws_url).await?;
        let (mut stream, _unsubscribe) = client
            .logs_subscribe(
                RpcTransactionLogsFilter::Mentions(vec![self.program_id.to_string()]),
                RpcTransactionLogsConfig {
                    commitment: Some(self.commitment),
                },
            )
            .await?;
        info!(ws_url = %self.ws_url, "subscribed to program logs");

        while let Some(response) = stream.next().await {
            let value = response.value;
            if value.err.is_some() {
                debug!(signature = %value.signature, "skipping failed transaction");
                continue;
            }
            self.sink.ingest_logs(&value.signature, &value.logs).await;
        }

        // Stream exhausted means the server closed the connection.
        Ok(())
    }
}
