//! Single-instruction transaction submission with confirmation.
//!
//! Flow: fetch a recent blockhash (carrying its last valid block height),
//! compile a v0 message with the authority as fee payer, sign, send with
//! preflight, then poll signature status until it reaches the target
//! commitment, errors, or the block height passes the blockhash's validity
//! window. Expiry is surfaced as its own variant because the transaction
//! may still have landed; nothing here resubmits.

use std::sync::Arc;
use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, warn};

use super::{classify_transaction_error, ChainError};

const CONFIRM_POLL: Duration = Duration::from_secs(1);

pub struct Submitter {
    rpc: Arc<RpcClient>,
    signer: Arc<Keypair>,
    commitment: CommitmentConfig,
}

impl Submitter {
    pub fn new(rpc: Arc<RpcClient>, signer: Arc<Keypair>) -> Self {
        Self {
            rpc,
            signer,
            commitment: CommitmentConfig::confirmed(),
        }
    }

    pub fn authority(&self) -> solana_sdk::pubkey::Pubkey {
        self.signer.pubkey()
    }

    /// Build, sign, send and confirm a one-instruction transaction.
    pub async fn submit(&self, instruction: Instruction) -> Result<Signature, ChainError> {
        let (blockhash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?;

        let message =
            v0::Message::try_compile(&self.signer.pubkey(), &[instruction], &[], blockhash)
                .map_err(|e| ChainError::Build(e.to_string()))?;
        let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &[&*self.signer])
            .map_err(|e| ChainError::Build(e.to_string()))?;

        let send_config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(self.commitment.commitment),
            ..Default::default()
        };
        let signature = match self.rpc.send_transaction_with_config(&tx, send_config).await {
            Ok(sig) => sig,
            Err(e) => {
                // Preflight simulation surfaces program rejections here.
                if let Some(tx_err) = e.get_transaction_error() {
                    return Err(classify_transaction_error(&tx_err));
                }
                return Err(ChainError::Rpc(e));
            }
        };
        debug!(signature = %signature, "transaction sent");

        self.confirm(signature, last_valid_block_height).await?;
        Ok(signature)
    }

    async fn confirm(
        &self,
        signature: Signature,
        last_valid_block_height: u64,
    ) -> Result<(), ChainError> {
        loop {
            let statuses = self.rpc.get_signature_statuses(&[signature]).await?;
            if let Some(Some(status)) = statuses.value.first() {
                if let Some(err) = &status.err {
                    return Err(classify_transaction_error(err));
                }
                if status.satisfies_commitment(self.commitment) {
                    debug!(signature = %signature, slot = status.slot, "transaction confirmed");
                    return Ok(());
                }
            }

            let height = self.rpc.get_block_height().await?;
            if height > last_valid_block_height {
                warn!(
                    signature = %signature,
                    height,
                    last_valid_block_height,
                    "blockhash expired before confirmation"
                );
                return Err(ChainError::Expired { signature });
            }
            tokio::time::sleep(CONFIRM_POLL).await;
        }
    }
}
