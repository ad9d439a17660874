//! Pull ingestion by polling `getSignaturesForAddress`.
//!
//! Each cycle lists signatures newer than the cursor, fetches their logs
//! (Helius batch endpoint when configured, per-signature RPC otherwise)
//! and feeds them to the sink oldest-first. The cursor advances to the
//! newest listed signature as soon as the listing is parsed, so a failure
//! later in the cycle can only drop a window, never replay one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_client::rpc_response::RpcConfirmedTransactionStatusWithSignature;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::UiTransactionEncoding;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::HeliusConfig;

use super::TradeSink;

const HELIUS_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause between per-signature RPC fetches to stay under free-tier limits.
const RPC_FETCH_PAUSE: Duration = Duration::from_millis(250);

pub struct PullIngester {
    rpc: Arc<RpcClient>,
    http: reqwest::Client,
    program_id: Pubkey,
    commitment: CommitmentConfig,
    sink: Arc<TradeSink>,
    helius: HeliusConfig,
    batch: usize,
    poll_interval: Duration,
    cursor: Option<Signature>,
}

impl PullIngester {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: Arc<RpcClient>,
        program_id: Pubkey,
        commitment: CommitmentConfig,
        sink: Arc<TradeSink>,
        helius: HeliusConfig,
        batch: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            rpc,
            http: reqwest::Client::new(),
            program_id,
            commitment,
            sink,
            helius,
            batch,
            poll_interval,
            cursor: None,
        }
    }

    pub async fn run(mut self) {
        self.prime_cursor().await;
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "signature poll failed");
            }
        }
    }

    /// Anchor the cursor at the program's newest signature so startup does
    /// not replay the full history.
    async fn prime_cursor(&mut self) {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(1),
            commitment: Some(self.commitment),
        };
        match self
            .rpc
            .get_signatures_for_address_with_config(&self.program_id, config)
            .await
        {
            Ok(entries) => {
                if let Some(sig) = entries.first().and_then(|e| e.signature.parse().ok()) {
                    info!(cursor = %sig, "primed pull cursor");
                    self.cursor = Some(sig);
                }
            }
            Err(e) => warn!(error = %e, "failed to prime pull cursor, starting unanchored"),
        }
    }

    async fn poll_once(&mut self) -> anyhow::Result<usize> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: self.cursor,
            limit: Some(self.batch),
            commitment: Some(self.commitment),
        };
        let entries = self
            .rpc
            .get_signatures_for_address_with_config(&self.program_id, config)
            .await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let Some((newest, candidates)) = plan_batch(&entries) else {
            anyhow::bail!("unparsable newest signature in listing");
        };
        self.cursor = Some(newest);
        if candidates.is_empty() {
            return Ok(0);
        }

        let logs_by_signature = if self.helius.enabled() {
            match self.fetch_via_helius(&candidates).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(error = %e, "helius fetch failed, falling back to rpc");
                    self.fetch_via_rpc(&candidates).await
                }
            }
        } else {
            self.fetch_via_rpc(&candidates).await
        };

        let mut stored = 0;
        for signature in &candidates {
            if let Some(logs) = logs_by_signature.get(signature) {
                if self.sink.ingest_logs(signature, logs).await {
                    stored += 1;
                }
            }
        }
        if stored > 0 {
            info!(stored, batch = candidates.len(), "pull cycle stored trades");
        }
        Ok(stored)
    }

    /// Batch log fetch through Helius' enhanced transactions endpoint.
    async fn fetch_via_helius(
        &self,
        signatures: &[String],
    ) -> anyhow::Result<HashMap<String, Vec<String>>> {
        let url = format!("{}?api-key={}", self.helius.endpoint, self.helius.api_key);
        let body = serde_json::json!({ "transactions": signatures, "parseAll": false });
        let response = self
            .http
            .post(&url)
            .json(&body)
            .timeout(HELIUS_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("helius returned {}", response.status());
        }
        let transactions: Vec<HeliusTransaction> = response.json().await?;
        Ok(helius_logs(transactions))
    }

    /// Per-signature fallback through plain RPC. Individually tolerant so
    /// one dropped transaction does not sink the batch.
    async fn fetch_via_rpc(&self, signatures: &[String]) -> HashMap<String, Vec<String>> {
        let mut logs_by_signature = HashMap::new();
        for raw in signatures {
            let Ok(signature) = raw.parse::<Signature>() else {
                warn!(signature = %raw, "unparsable signature in listing");
                continue;
            };
            let config = RpcTransactionConfig {
                encoding: Some(UiTransactionEncoding::Json),
                commitment: Some(self.commitment),
                max_supported_transaction_version: Some(0),
            };
            match self.rpc.get_transaction_with_config(&signature, config).await {
                Ok(tx) => {
                    if let Some(meta) = tx.transaction.meta {
                        if meta.err.is_none() {
                            if let OptionSerializer::Some(logs) = meta.log_messages {
                                logs_by_signature.insert(raw.clone(), logs);
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, signature = %raw, "failed to fetch transaction"),
            }
            sleep(RPC_FETCH_PAUSE).await;
        }
        logs_by_signature
    }
}

/// Split a newest-first listing into the next cursor value and the
/// oldest-first successful signatures worth fetching.
fn plan_batch(
    entries: &[RpcConfirmedTransactionStatusWithSignature],
) -> Option<(Signature, Vec<String>)> {
    let newest = entries.first()?.signature.parse::<Signature>().ok()?;
    let candidates = entries
        .iter()
        .rev()
        .filter(|e| e.err.is_none())
        .map(|e| e.signature.clone())
        .collect();
    Some((newest, candidates))
}

#[derive(Debug, Deserialize)]
struct HeliusTransaction {
    #[serde(default)]
    signature: String,
    #[serde(default, rename = "transactionError")]
    transaction_error: Option<serde_json::Value>,
    #[serde(default)]
    meta: Option<HeliusMeta>,
    #[serde(default)]
    logs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct HeliusMeta {
    #[serde(default, rename = "logMessages")]
    log_messages: Option<Vec<String>>,
}

fn helius_logs(transactions: Vec<HeliusTransaction>) -> HashMap<String, Vec<String>> {
    let mut logs_by_signature = HashMap::new();
    for tx in transactions {
        if tx.signature.is_empty() || tx.transaction_error.is_some() {
            continue;
        }
        let logs = tx
            .meta
            .and_then(|m| m.log_messages)
            .or(tx.logs)
            .unwrap_or_default();
        if !logs.is_empty() {
            logs_by_signature.insert(tx.signature, logs);
        }
    }
    logs_by_signature
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::transaction::TransactionError;

    fn entry(
        signature: &str,
        err: Option<TransactionError>,
    ) -> RpcConfirmedTransactionStatusWithSignature {
        RpcConfirmedTransactionStatusWithSignature {
            signature: signature.to_string(),
            slot: 0,
            err,
            memo: None,
            block_time: None,
            confirmation_status: None,
        }
    }

    #[test]
    fn test_plan_batch_oldest_first_without_failed() {
        let newest = Signature::new_unique();
        let failed = Signature::new_unique();
        let oldest = Signature::new_unique();
        let entries = vec![
            entry(&newest.to_string(), None),
            entry(&failed.to_string(), Some(TransactionError::AccountNotFound)),
            entry(&oldest.to_string(), None),
        ];

        let (cursor, candidates) = plan_batch(&entries).expect("plans");
        assert_eq!(cursor, newest);
        assert_eq!(candidates, vec![oldest.to_string(), newest.to_string()]);
    }

    #[test]
    fn test_plan_batch_advances_past_failed_newest() {
        let newest = Signature::new_unique();
        let entries = vec![entry(
            &newest.to_string(),
            Some(TransactionError::AccountNotFound),
        )];

        let (cursor, candidates) = plan_batch(&entries).expect("plans");
        assert_eq!(cursor, newest, "covered window moves even without work");
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_plan_batch_empty_listing() {
        assert!(plan_batch(&[]).is_none());
    }

    #[test]
    fn test_helius_logs_shapes() {
        let raw = serde_json::json!([
            {
                "signature": "a",
                "meta": { "logMessages": ["Program data: xyz"] }
            },
            {
                "signature": "b",
                "logs": ["Program log: top-level"]
            },
            {
                "signature": "c",
                "transactionError": { "InstructionError": [0, "Custom"] },
                "meta": { "logMessages": ["ignored"] }
            },
            {
                "meta": { "logMessages": ["no signature"] }
            }
        ]);
        let transactions: Vec<HeliusTransaction> = serde_json::from_value(raw).unwrap();
        let logs = helius_logs(transactions);

        assert_eq!(logs.len(), 2);
        assert_eq!(logs["a"], vec!["Program data: xyz".to_string()]);
        assert_eq!(logs["b"], vec!["Program log: top-level".to_string()]);
    }
}
