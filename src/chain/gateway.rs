//! Chain operations behind a mockable trait.
//!
//! `ChainOps` is the orchestrator's only route to the network; lifecycle
//! tests script it. `SolanaGateway` is the real implementation: it derives
//! the accounts each instruction wants, encodes the payload, and hands the
//! instruction to the submitter.

use async_trait::async_trait;
use std::sync::Arc;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::system_program;
use tracing::debug;

use super::{ChainError, Submitter};
use crate::program::codec::{self, ConfigAccount, DecodeError, MarketAccount};
use crate::program::{pda, ProgramRevision, ACC_MARKET};

#[derive(Debug, Clone)]
pub struct CreateMarketArgs {
    pub market_id: u64,
    pub question: String,
    pub description: String,
    pub category: String,
    pub resolution_time: i64,
    pub initial_liquidity: u64,
}

/// One Market-tagged account found by a program scan.
#[derive(Debug)]
pub struct ScannedMarket {
    pub address: Pubkey,
    /// Read straight off the blob, so it survives a failed decode.
    pub market_id: Option<u64>,
    pub account: Result<MarketAccount, DecodeError>,
}

/// Everything the lifecycle orchestrator does against the chain.
#[async_trait]
pub trait ChainOps: Send + Sync {
    /// Canonical market account address for an id.
    fn market_address(&self, market_id: u64) -> Pubkey;

    /// Current Config account, or None when the program is uninitialized.
    async fn config_snapshot(&self) -> Result<Option<ConfigAccount>, ChainError>;

    /// Market account at `address`, or None when absent.
    async fn market_account(&self, address: &Pubkey) -> Result<Option<MarketAccount>, ChainError>;

    /// All program accounts carrying the Market discriminator. Blobs the
    /// decoder rejects are returned with their error so the caller can
    /// record them as corrupted.
    async fn scan_markets(&self) -> Result<Vec<ScannedMarket>, ChainError>;

    async fn initialize(&self) -> Result<Signature, ChainError>;
    async fn create_market(&self, args: &CreateMarketArgs) -> Result<Signature, ChainError>;
    async fn resolve_market(
        &self,
        market_id: u64,
        market: &Pubkey,
        outcome_yes: bool,
    ) -> Result<Signature, ChainError>;
    async fn sweep_funds(&self, market_id: u64, market: &Pubkey) -> Result<Signature, ChainError>;
    async fn withdraw_fees(&self, amount: u64) -> Result<Signature, ChainError>;
}

pub struct SolanaGateway {
    rpc: Arc<RpcClient>,
    submitter: Submitter,
    program_id: Pubkey,
    authority: Pubkey,
    revision: ProgramRevision,
    commitment: CommitmentConfig,
}

impl SolanaGateway {
    pub fn new(
        rpc: Arc<RpcClient>,
        signer: Arc<Keypair>,
        program_id: Pubkey,
        revision: ProgramRevision,
    ) -> Self {
        let submitter = Submitter::new(Arc::clone(&rpc), signer);
        let authority = submitter.authority();
        Self {
            rpc,
            submitter,
            program_id,
            authority,
            revision,
            commitment: CommitmentConfig::confirmed(),
        }
    }

    fn instruction(&self, data: Vec<u8>, accounts: Vec<AccountMeta>) -> Instruction {
        Instruction::new_with_bytes(self.program_id, &data, accounts)
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ChainError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    /// Instruction draining `amount` lamports from the fee vault to the
    /// authority.
    fn withdraw_instruction(&self, amount: u64) -> Instruction {
        let (config, _) = pda::config_pda(&self.program_id);
        let (fee_vault, _) = pda::fee_vault_pda(&self.program_id);
        let accounts = vec![
            AccountMeta::new_readonly(config, false),
            AccountMeta::new(fee_vault, false),
            AccountMeta::new(self.authority, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ];
        self.instruction(codec::withdraw_fees(amount), accounts)
    }
}

#[async_trait]
impl ChainOps for SolanaGateway {
    fn market_address(&self, market_id: u64) -> Pubkey {
        pda::market_pda(&self.program_id, market_id).0
    }

    async fn config_snapshot(&self) -> Result<Option<ConfigAccount>, ChainError> {
        let (config, _) = pda::config_pda(&self.program_id);
        match self.account_data(&config).await? {
            Some(data) => Ok(Some(codec::decode_config(&data, self.revision)?)),
            None => Ok(None),
        }
    }

    async fn market_account(&self, address: &Pubkey) -> Result<Option<MarketAccount>, ChainError> {
        match self.account_data(address).await? {
            Some(data) => Ok(Some(codec::decode_market(&data)?)),
            None => Ok(None),
        }
    }

    async fn scan_markets(&self) -> Result<Vec<ScannedMarket>, ChainError> {
        let accounts = self.rpc.get_program_accounts(&self.program_id).await?;
        let mut markets = Vec::new();
        for (address, account) in accounts {
            // Config and position accounts share the program; only blobs
            // tagged as Market concern us.
            if account.data.len() < 8 || account.data[..8] != ACC_MARKET {
                continue;
            }
            let market_id = account
                .data
                .get(8..16)
                .and_then(|raw| raw.try_into().ok())
                .map(u64::from_le_bytes);
            markets.push(ScannedMarket {
                address,
                market_id,
                account: codec::decode_market(&account.data),
            });
        }
        debug!(count = markets.len(), "scanned program market accounts");
        Ok(markets)
    }

    async fn initialize(&self) -> Result<Signature, ChainError> {
        let (config, _) = pda::config_pda(&self.program_id);
        let mut accounts = vec![AccountMeta::new(config, false)];
        if self.revision.config_has_fee_vault_bump {
            let (fee_vault, _) = pda::fee_vault_pda(&self.program_id);
            accounts.push(AccountMeta::new(fee_vault, false));
        }
        accounts.push(AccountMeta::new(self.authority, true));
        accounts.push(AccountMeta::new_readonly(system_program::id(), false));

        self.submitter
            .submit(self.instruction(codec::initialize(), accounts))
            .await
    }

    async fn create_market(&self, args: &CreateMarketArgs) -> Result<Signature, ChainError> {
        let (config, _) = pda::config_pda(&self.program_id);
        let (market, _) = pda::market_pda(&self.program_id, args.market_id);
        let (vault, _) = pda::vault_pda(&self.program_id, args.market_id);

        let data = codec::create_market(
            args.market_id,
            &args.question,
            &args.description,
            &args.category,
            args.resolution_time,
            args.initial_liquidity,
        )?;
        let accounts = vec![
            AccountMeta::new(config, false),
            AccountMeta::new(market, false),
            AccountMeta::new(vault, false),
            AccountMeta::new(self.authority, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ];

        self.submitter.submit(self.instruction(data, accounts)).await
    }

    async fn resolve_market(
        &self,
        market_id: u64,
        market: &Pubkey,
        outcome_yes: bool,
    ) -> Result<Signature, ChainError> {
        let (config, _) = pda::config_pda(&self.program_id);
        let data = codec::resolve_market(self.revision, market_id, outcome_yes);
        let accounts = vec![
            AccountMeta::new_readonly(config, false),
            AccountMeta::new(*market, false),
            AccountMeta::new(self.authority, true),
        ];

        self.submitter.submit(self.instruction(data, accounts)).await
    }

    async fn sweep_funds(&self, market_id: u64, market: &Pubkey) -> Result<Signature, ChainError> {
        let (config, _) = pda::config_pda(&self.program_id);
        let (vault, _) = pda::vault_pda(&self.program_id, market_id);
        let accounts = vec![
            AccountMeta::new_readonly(config, false),
            AccountMeta::new_readonly(*market, false),
            AccountMeta::new(vault, false),
            AccountMeta::new(self.authority, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ];

        self.submitter
            .submit(self.instruction(codec::sweep_funds(), accounts))
            .await
    }

    async fn withdraw_fees(&self, amount: u64) -> Result<Signature, ChainError> {
        self.submitter
            .submit(self.withdraw_instruction(amount))
            .await
    }
}
