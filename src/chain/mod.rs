//! Network-facing side of the agent: transaction submission and the chain
//! operations the orchestrator drives.

use solana_client::client_error::ClientError;
use solana_sdk::instruction::InstructionError;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

use crate::program::codec::{DecodeError, EncodeError};

pub mod gateway;
pub mod submitter;

pub use gateway::{ChainOps, CreateMarketArgs, SolanaGateway};
pub use submitter::Submitter;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport-level failure. Safe to retry next cycle with a fresh
    /// blockhash.
    #[error("rpc: {0}")]
    Rpc(#[from] ClientError),
    #[error("transaction build failed: {0}")]
    Build(String),
    /// The program rejected the instruction with a custom error code.
    #[error("program rejected transaction: {}", rejection_label(*code))]
    Rejected { code: u32 },
    /// The transaction failed for a non-program reason (fee, blockhash,
    /// account state).
    #[error("transaction failed: {0}")]
    Failed(String),
    /// Submission was accepted but the blockhash expired before a
    /// confirmation was observed. The transaction may still have landed;
    /// callers re-read chain state before acting again.
    #[error("confirmation window expired for {signature}")]
    Expired { signature: Signature },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ChainError {
    /// The program's custom error code, when this is an on-chain rejection.
    pub fn rejection_code(&self) -> Option<u32> {
        match self {
            ChainError::Rejected { code } => Some(*code),
            _ => None,
        }
    }
}

fn rejection_label(code: u32) -> String {
    match crate::program::error_name(code) {
        Some(name) => format!("{name} ({code})"),
        None => format!("code {code}"),
    }
}

/// Fold a transaction-level error into the taxonomy: custom program codes
/// become `Rejected`, everything else `Failed`.
pub(crate) fn classify_transaction_error(err: &TransactionError) -> ChainError {
    if let TransactionError::InstructionError(_, InstructionError::Custom(code)) = err {
        return ChainError::Rejected { code: *code };
    }
    ChainError::Failed(err.to_string())
}
