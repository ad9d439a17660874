//! Market lifecycle orchestration.
//!
//! One orchestrator drives the whole arc: make sure the program is
//! initialized, reconcile the store against chain state, then tick
//! creation, resolution and sweeping on their intervals. Chain access goes
//! through [`ChainOps`] and model access through [`Oracle`], so every tick
//! is testable against scripted fakes.
//!
//! The ordering rule throughout: chain first, store second. A record is
//! only advanced after the transaction confirmed, and any ambiguous
//! submission (expired confirmation window) is resolved by re-reading the
//! chain on the next tick rather than by resubmitting blind.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::gateway::{ChainOps, CreateMarketArgs};
use crate::chain::ChainError;
use crate::config::AgentConfig;
use crate::oracle::{MarketIdea, Oracle};
use crate::program::codec::{DecodeError, MarketAccount};
use crate::program::{self, MAX_CATEGORY_LEN, MAX_DESCRIPTION_LEN, MAX_QUESTION_LEN};
use crate::store::{MarketRecord, MarketState, MarketStore};

pub mod dedupe;

/// Disagreement between a stored record and the chain that no transaction
/// can be safely built over. Rendered into the record's corrupt reason;
/// a corrupted record is terminal and drops out of every selection pass.
#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("stored address {stored} is not the derived market account")]
    AddressMismatch { stored: String },
    #[error("stored address {stored} does not parse")]
    BadStoredAddress { stored: String },
    #[error("market account missing on chain")]
    AccountMissing,
    #[error("undecodable account: {0}")]
    Undecodable(#[from] DecodeError),
    #[error("on-chain id {onchain} is already tracked at {holder}")]
    IdCollision { onchain: u64, holder: String },
}

pub struct Orchestrator {
    chain: Arc<dyn ChainOps>,
    store: Arc<dyn MarketStore>,
    oracle: Arc<dyn Oracle>,
    agent: AgentConfig,
}

impl Orchestrator {
    pub fn new(
        chain: Arc<dyn ChainOps>,
        store: Arc<dyn MarketStore>,
        oracle: Arc<dyn Oracle>,
        agent: AgentConfig,
    ) -> Self {
        Self {
            chain,
            store,
            oracle,
            agent,
        }
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    /// Bring local state in line with the chain before any loop starts.
    /// Every phase is best-effort: a failure is logged and the loops start
    /// anyway, re-reading chain state on their own schedule. Only
    /// configuration errors terminate the process, and those surface
    /// before the orchestrator exists.
    pub async fn startup(&self) {
        if let Err(e) = self.ensure_initialized().await {
            warn!(error = %e, "initialization check failed, continuing");
        }
        if let Err(e) = self.reconcile_with_chain().await {
            warn!(error = %e, "chain reconciliation failed, continuing");
        }
        self.bootstrap().await;
    }

    async fn ensure_initialized(&self) -> Result<(), ChainError> {
        if self.chain.config_snapshot().await?.is_some() {
            debug!("program config present");
            return Ok(());
        }
        info!("program config missing, initializing");
        let signature = self.chain.initialize().await?;
        info!(signature = %signature, "program initialized");
        Ok(())
    }

    /// Import chain markets the store has never seen and record blobs the
    /// decoder rejects. Crashes between submit and store, or operator
    /// surgery on the store, surface here instead of silently diverging.
    async fn reconcile_with_chain(&self) -> anyhow::Result<()> {
        let scanned = self.chain.scan_markets().await?;
        let mut imported = 0usize;
        let mut corrupted = 0usize;

        for item in scanned {
            match item.account {
                Ok(onchain) => {
                    let Some(existing) = self.store.get_market(onchain.market_id).await? else {
                        let record = import_record(&item.address, &onchain);
                        info!(
                            market_id = record.market_id,
                            address = %item.address,
                            "imported market from chain"
                        );
                        self.store.upsert_market(&record).await?;
                        imported += 1;
                        continue;
                    };
                    let mut updated = existing;
                    let mut dirty = false;
                    let observed = item.address.to_string();
                    if updated.market_address != observed {
                        warn!(
                            market_id = updated.market_id,
                            stored = %updated.market_address,
                            observed = %observed,
                            "stored address disagrees with chain, correcting"
                        );
                        updated.market_address = observed;
                        dirty = true;
                    }
                    if onchain.resolved && !updated.resolved {
                        updated.resolved = true;
                        updated.outcome = onchain.outcome;
                        updated.resolution_reasoning =
                            Some("Already resolved on chain".to_string());
                        updated.resolved_at = Some(Self::now());
                        info!(
                            market_id = updated.market_id,
                            "synced resolved state from chain"
                        );
                        dirty = true;
                    }
                    if dirty {
                        self.store.upsert_market(&updated).await?;
                    }
                }
                Err(e) => {
                    corrupted += 1;
                    let Some(market_id) = item.market_id else {
                        warn!(
                            address = %item.address,
                            error = %e,
                            "undecodable market blob without a readable id"
                        );
                        continue;
                    };
                    let mut record = match self.store.get_market(market_id).await? {
                        Some(existing) => existing,
                        None => placeholder_record(market_id, &item.address, Self::now()),
                    };
                    if !record.corrupted {
                        let err = ConsistencyError::from(e);
                        record.mark_corrupted(err.to_string());
                        self.store.upsert_market(&record).await?;
                        warn!(
                            market_id,
                            address = %item.address,
                            error = %err,
                            "marked market corrupted"
                        );
                    }
                }
            }
        }

        if imported > 0 || corrupted > 0 {
            info!(imported, corrupted, "chain reconciliation complete");
        }
        Ok(())
    }

    /// Seed an empty book with the configured number of starter markets.
    async fn bootstrap(&self) {
        if self.agent.bootstrap_markets == 0 {
            return;
        }
        match self.store.all_markets().await {
            Ok(existing) if existing.is_empty() => {}
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "skipping bootstrap, store unreadable");
                return;
            }
        }
        info!(
            count = self.agent.bootstrap_markets,
            "bootstrapping initial markets"
        );
        for _ in 0..self.agent.bootstrap_markets {
            if let Err(e) = self.create_market_once().await {
                warn!(error = %e, "bootstrap creation failed");
            }
        }
    }

    /// One creation cycle: ask the oracle for a novel question and put it
    /// on chain. Returns true when a market was created.
    pub async fn create_market_once(&self) -> anyhow::Result<bool> {
        let markets = self.store.all_markets().await?;
        let now = Self::now();
        let avoid = dedupe::avoid_questions(&markets, now);
        let comparison = dedupe::comparison_set(&markets, now);

        for attempt in 0..self.agent.creation_attempts {
            let idea = match self.oracle.propose_market(&avoid, attempt).await {
                Ok(idea) => sanitize_idea(idea),
                Err(e) => {
                    warn!(error = %e, attempt, "oracle proposal failed");
                    continue;
                }
            };
            if idea.question.is_empty() {
                warn!(attempt, "oracle proposed an empty question");
                continue;
            }
            if let Some(hit) = dedupe::find_duplicate(&idea.question, &comparison) {
                info!(
                    question = %idea.question,
                    duplicate_of = %hit,
                    attempt,
                    "duplicate question, retrying"
                );
                continue;
            }
            self.submit_market(idea, now).await?;
            return Ok(true);
        }

        warn!(
            attempts = self.agent.creation_attempts,
            "no novel question produced this cycle"
        );
        Ok(false)
    }

    async fn submit_market(&self, idea: MarketIdea, now: i64) -> anyhow::Result<()> {
        let config = self
            .chain
            .config_snapshot()
            .await?
            .ok_or_else(|| anyhow::anyhow!("program config account missing"))?;
        // The program assigns ids sequentially from its own counter.
        let market_id = config.market_count;
        let resolution_time = now + self.agent.market_duration_secs as i64;

        let args = CreateMarketArgs {
            market_id,
            question: idea.question.clone(),
            description: idea.description.clone(),
            category: idea.category.clone(),
            resolution_time,
            initial_liquidity: self.agent.initial_liquidity_lamports,
        };
        let signature = self.chain.create_market(&args).await?;

        let record = MarketRecord {
            market_id,
            market_address: self.chain.market_address(market_id).to_string(),
            question: idea.question,
            description: idea.description,
            category: idea.category,
            resolution_time,
            created_at: now,
            resolved: false,
            outcome: None,
            resolution_reasoning: None,
            resolved_at: None,
            swept: false,
            corrupted: false,
            corrupt_reason: None,
        };
        self.store.upsert_market(&record).await?;
        info!(
            market_id,
            question = %record.question,
            signature = %signature,
            "market created"
        );
        Ok(())
    }

    /// Resolve every market whose clock has run out. Returns how many
    /// reached a resolved state this cycle.
    pub async fn resolution_tick(&self) -> anyhow::Result<usize> {
        let markets = self.store.all_markets().await?;
        let now = Self::now();
        let mut resolved = 0usize;
        for record in markets {
            let state = record.state(now, self.agent.sweep_grace_secs);
            if state != MarketState::ResolutionDue {
                debug!(market_id = record.market_id, state = %state, "not due for resolution");
                continue;
            }
            let market_id = record.market_id;
            match self.resolve_one(record, now).await {
                Ok(true) => resolved += 1,
                Ok(false) => {}
                Err(e) => warn!(market_id, error = %e, "resolution attempt failed"),
            }
        }
        if resolved > 0 {
            info!(resolved, "resolution cycle complete");
        }
        Ok(resolved)
    }

    async fn resolve_one(&self, mut record: MarketRecord, now: i64) -> anyhow::Result<bool> {
        let market_id = record.market_id;

        // The stored address must be the PDA this id derives to. Anything
        // else means record and chain disagree about identity, and no
        // transaction built from the record can be trusted.
        let expected = self.chain.market_address(market_id);
        let stored = Pubkey::from_str(&record.market_address);
        if stored.map(|address| address != expected).unwrap_or(true) {
            let err = ConsistencyError::AddressMismatch {
                stored: record.market_address.clone(),
            };
            record.mark_corrupted(err.to_string());
            self.store.upsert_market(&record).await?;
            warn!(market_id, error = %err, "market address mismatch, marked corrupted");
            return Ok(false);
        }

        let Some(onchain) = self.checked_account(&mut record, &expected).await? else {
            return Ok(false);
        };
        let market_id = record.market_id;

        if onchain.resolved {
            record.resolved = true;
            record.outcome = onchain.outcome;
            record.resolution_reasoning = Some("Already resolved on chain".to_string());
            record.resolved_at = Some(now);
            self.store.upsert_market(&record).await?;
            info!(market_id, outcome = ?record.outcome, "synced resolution from chain");
            return Ok(true);
        }

        let verdict = match self
            .oracle
            .resolve(&record.question, &record.description)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(market_id, error = %e, "oracle verdict failed, retrying next cycle");
                return Ok(false);
            }
        };
        if let Some(confidence) = verdict.confidence {
            if confidence < self.agent.min_confidence {
                info!(
                    market_id,
                    confidence,
                    floor = self.agent.min_confidence,
                    "verdict below confidence floor, leaving pending"
                );
                return Ok(false);
            }
        }

        match self
            .chain
            .resolve_market(market_id, &expected, verdict.outcome)
            .await
        {
            Ok(signature) => {
                record.resolved = true;
                record.outcome = Some(verdict.outcome);
                record.resolution_reasoning = Some(verdict.reasoning);
                record.resolved_at = Some(now);
                self.store.upsert_market(&record).await?;
                info!(
                    market_id,
                    outcome = verdict.outcome,
                    signature = %signature,
                    "market resolved"
                );
                Ok(true)
            }
            Err(e) => {
                // Covers Expired too: the next cycle re-reads the account
                // and syncs if the transaction landed after all.
                warn!(market_id, error = %e, "resolve submission failed");
                Ok(false)
            }
        }
    }

    /// Fetch the account backing a record and fold its embedded id into
    /// the record. Returns None when the record cannot be acted on this
    /// cycle, either because it was routed to corrupted or because the
    /// read failed and will be retried.
    async fn checked_account(
        &self,
        record: &mut MarketRecord,
        address: &Pubkey,
    ) -> anyhow::Result<Option<MarketAccount>> {
        let market_id = record.market_id;
        let onchain = match self.chain.market_account(address).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                record.mark_corrupted(ConsistencyError::AccountMissing.to_string());
                self.store.upsert_market(record).await?;
                warn!(market_id, "market account missing, marked corrupted");
                return Ok(None);
            }
            Err(ChainError::Decode(e)) => {
                let err = ConsistencyError::from(e);
                record.mark_corrupted(err.to_string());
                self.store.upsert_market(record).await?;
                warn!(market_id, error = %err, "market account undecodable, marked corrupted");
                return Ok(None);
            }
            Err(e) => {
                warn!(market_id, error = %e, "market fetch failed, retrying next cycle");
                return Ok(None);
            }
        };
        if !self.adopt_chain_id(record, &onchain).await? {
            return Ok(None);
        }
        Ok(Some(onchain))
    }

    /// The id embedded in the account is authoritative; address reuse
    /// across program deployments can leave the store holding a stale one.
    /// The row under the stale id is retired so selection never picks it
    /// up again. Returns false when adoption would collide with another
    /// tracked record and this one was corrupted instead.
    async fn adopt_chain_id(
        &self,
        record: &mut MarketRecord,
        onchain: &MarketAccount,
    ) -> anyhow::Result<bool> {
        if onchain.market_id == record.market_id {
            return Ok(true);
        }
        let stale_id = record.market_id;
        if let Some(holder) = self.store.get_market(onchain.market_id).await? {
            if holder.market_address != record.market_address {
                let err = ConsistencyError::IdCollision {
                    onchain: onchain.market_id,
                    holder: holder.market_address,
                };
                record.mark_corrupted(err.to_string());
                self.store.upsert_market(record).await?;
                warn!(market_id = stale_id, error = %err, "cannot adopt on-chain id, marked corrupted");
                return Ok(false);
            }
        }
        let mut retired = record.clone();
        retired.mark_corrupted(format!("superseded by on-chain id {}", onchain.market_id));
        self.store.upsert_market(&retired).await?;
        record.market_id = onchain.market_id;
        self.store.upsert_market(record).await?;
        warn!(
            stale_id,
            market_id = record.market_id,
            address = %record.market_address,
            "adopted on-chain market id"
        );
        Ok(true)
    }

    /// Sweep residual vault balances for markets past the grace window.
    /// The program rejecting with NoRemainingFunds counts as done.
    pub async fn sweep_tick(&self) -> anyhow::Result<usize> {
        let markets = self.store.all_markets().await?;
        let now = Self::now();
        let mut swept = 0usize;
        for mut record in markets {
            let state = record.state(now, self.agent.sweep_grace_secs);
            if state != MarketState::SweepDue {
                debug!(market_id = record.market_id, state = %state, "not due for sweep");
                continue;
            }
            let market_id = record.market_id;
            let Ok(address) = Pubkey::from_str(&record.market_address) else {
                let err = ConsistencyError::BadStoredAddress {
                    stored: record.market_address.clone(),
                };
                record.mark_corrupted(err.to_string());
                self.store.upsert_market(&record).await?;
                warn!(market_id, error = %err, "unparsable market address, marked corrupted");
                continue;
            };
            if self.checked_account(&mut record, &address).await?.is_none() {
                continue;
            }
            let market_id = record.market_id;
            match self.chain.sweep_funds(market_id, &address).await {
                Ok(signature) => {
                    record.swept = true;
                    self.store.upsert_market(&record).await?;
                    swept += 1;
                    info!(market_id, signature = %signature, "market swept");
                }
                Err(e) if e.rejection_code() == Some(program::ERR_NO_REMAINING_FUNDS) => {
                    record.swept = true;
                    self.store.upsert_market(&record).await?;
                    swept += 1;
                    debug!(market_id, "vault already empty, marked swept");
                }
                Err(e) => warn!(market_id, error = %e, "sweep failed, retrying next cycle"),
            }
        }
        Ok(swept)
    }

    /// Creation loop, one market per interval.
    pub async fn run_creation_loop(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.agent.creation_interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = self.create_market_once().await {
                warn!(error = %e, "creation cycle failed");
            }
        }
    }

    /// Resolution and sweeping share the short interval.
    pub async fn run_resolution_loop(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.agent.resolution_interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = self.resolution_tick().await {
                warn!(error = %e, "resolution cycle failed");
            }
            if let Err(e) = self.sweep_tick().await {
                warn!(error = %e, "sweep cycle failed");
            }
        }
    }
}

/// Cap oracle output at the program's byte limits without splitting a
/// UTF-8 sequence.
fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn sanitize_idea(idea: MarketIdea) -> MarketIdea {
    MarketIdea {
        question: truncate_bytes(idea.question.trim(), MAX_QUESTION_LEN),
        description: truncate_bytes(idea.description.trim(), MAX_DESCRIPTION_LEN),
        category: truncate_bytes(idea.category.trim(), MAX_CATEGORY_LEN),
    }
}

fn import_record(address: &Pubkey, onchain: &MarketAccount) -> MarketRecord {
    MarketRecord {
        market_id: onchain.market_id,
        market_address: address.to_string(),
        question: onchain.question.clone(),
        description: onchain.description.clone(),
        category: onchain.category.clone(),
        resolution_time: onchain.resolution_time,
        created_at: onchain.created_at,
        resolved: onchain.resolved,
        outcome: onchain.outcome,
        resolution_reasoning: onchain
            .resolved
            .then(|| "Imported from blockchain".to_string()),
        resolved_at: onchain.resolved.then_some(onchain.resolution_time),
        swept: false,
        corrupted: false,
        corrupt_reason: None,
    }
}

/// Record for a blob we cannot decode and have never tracked.
fn placeholder_record(market_id: u64, address: &Pubkey, now: i64) -> MarketRecord {
    MarketRecord {
        market_id,
        market_address: address.to_string(),
        question: format!("(unrecovered market {market_id})"),
        description: String::new(),
        category: "unknown".to_string(),
        resolution_time: 0,
        created_at: now,
        resolved: false,
        outcome: None,
        resolution_reasoning: None,
        resolved_at: None,
        swept: false,
        corrupted: false,
        corrupt_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::gateway::ScannedMarket;
    use crate::oracle::{OracleError, Verdict};
    use crate::program::codec::{ConfigAccount, DecodeError};
    use crate::store::MemoryStore;
    use solana_sdk::signature::Signature;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn test_address(market_id: u64) -> Pubkey {
        let mut bytes = [7u8; 32];
        bytes[..8].copy_from_slice(&market_id.to_le_bytes());
        Pubkey::new_from_array(bytes)
    }

    #[derive(Default)]
    struct ChainState {
        config_present: bool,
        market_count: u64,
        accounts: Vec<(Pubkey, MarketAccount)>,
        scan: Vec<ScannedMarket>,
        created: Vec<CreateMarketArgs>,
        resolve_calls: Vec<(u64, bool)>,
        sweep_calls: Vec<u64>,
        sweep_rejection: Option<u32>,
        /// Every read fails with a transport error while set.
        rpc_down: bool,
    }

    fn rpc_unreachable() -> ChainError {
        use solana_client::client_error::ClientErrorKind;
        ChainError::Rpc(ClientErrorKind::Custom("rpc unreachable".to_string()).into())
    }

    #[derive(Default)]
    struct MockChain {
        state: Mutex<ChainState>,
    }

    #[async_trait::async_trait]
    impl ChainOps for MockChain {
        fn market_address(&self, market_id: u64) -> Pubkey {
            test_address(market_id)
        }

        async fn config_snapshot(&self) -> Result<Option<ConfigAccount>, ChainError> {
            let state = self.state.lock().unwrap();
            if state.rpc_down {
                return Err(rpc_unreachable());
            }
            if !state.config_present {
                return Ok(None);
            }
            Ok(Some(ConfigAccount {
                authority: Pubkey::new_unique(),
                market_count: state.market_count,
                fee_percentage: 100,
                bump: 254,
                fee_vault_bump: None,
            }))
        }

        async fn market_account(
            &self,
            address: &Pubkey,
        ) -> Result<Option<MarketAccount>, ChainError> {
            let state = self.state.lock().unwrap();
            if state.rpc_down {
                return Err(rpc_unreachable());
            }
            Ok(state
                .accounts
                .iter()
                .find(|(at, _)| at == address)
                .map(|(_, account)| account.clone()))
        }

        async fn scan_markets(&self) -> Result<Vec<ScannedMarket>, ChainError> {
            let mut state = self.state.lock().unwrap();
            if state.rpc_down {
                return Err(rpc_unreachable());
            }
            Ok(state.scan.drain(..).collect())
        }

        async fn initialize(&self) -> Result<Signature, ChainError> {
            self.state.lock().unwrap().config_present = true;
            Ok(Signature::new_unique())
        }

        async fn create_market(&self, args: &CreateMarketArgs) -> Result<Signature, ChainError> {
            let mut state = self.state.lock().unwrap();
            state.market_count += 1;
            state.created.push(args.clone());
            Ok(Signature::new_unique())
        }

        async fn resolve_market(
            &self,
            market_id: u64,
            _market: &Pubkey,
            outcome_yes: bool,
        ) -> Result<Signature, ChainError> {
            self.state
                .lock()
                .unwrap()
                .resolve_calls
                .push((market_id, outcome_yes));
            Ok(Signature::new_unique())
        }

        async fn sweep_funds(
            &self,
            market_id: u64,
            _market: &Pubkey,
        ) -> Result<Signature, ChainError> {
            let mut state = self.state.lock().unwrap();
            if let Some(code) = state.sweep_rejection {
                return Err(ChainError::Rejected { code });
            }
            state.sweep_calls.push(market_id);
            Ok(Signature::new_unique())
        }

        async fn withdraw_fees(&self, _amount: u64) -> Result<Signature, ChainError> {
            Ok(Signature::new_unique())
        }
    }

    #[derive(Default)]
    struct StubOracle {
        ideas: Mutex<VecDeque<MarketIdea>>,
        verdict: Mutex<Option<Verdict>>,
    }

    #[async_trait::async_trait]
    impl Oracle for StubOracle {
        async fn propose_market(
            &self,
            _avoid: &[String],
            _attempt: u32,
        ) -> Result<MarketIdea, OracleError> {
            self.ideas
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(OracleError::Empty)
        }

        async fn resolve(&self, _q: &str, _d: &str) -> Result<Verdict, OracleError> {
            self.verdict
                .lock()
                .unwrap()
                .clone()
                .ok_or(OracleError::Empty)
        }
    }

    fn idea(question: &str) -> MarketIdea {
        MarketIdea {
            question: question.to_string(),
            description: "desc".to_string(),
            category: "crypto".to_string(),
        }
    }

    fn onchain_market(market_id: u64, resolved: bool, outcome: Option<bool>) -> MarketAccount {
        MarketAccount {
            market_id,
            authority: Pubkey::new_unique(),
            question: format!("question {market_id}"),
            description: "d".to_string(),
            category: "crypto".to_string(),
            resolution_time: 100,
            created_at: 50,
            initial_liquidity: 0,
            yes_liquidity: 0,
            no_liquidity: 0,
            total_volume: 0,
            resolved,
            outcome,
        }
    }

    fn stored_market(market_id: u64, resolution_time: i64) -> MarketRecord {
        MarketRecord {
            market_id,
            market_address: test_address(market_id).to_string(),
            question: format!("Will market {market_id} settle yes?"),
            description: "d".to_string(),
            category: "crypto".to_string(),
            resolution_time,
            created_at: resolution_time - 1_800,
            resolved: false,
            outcome: None,
            resolution_reasoning: None,
            resolved_at: None,
            swept: false,
            corrupted: false,
            corrupt_reason: None,
        }
    }

    struct Fixture {
        chain: Arc<MockChain>,
        store: Arc<MemoryStore>,
        oracle: Arc<StubOracle>,
        orchestrator: Orchestrator,
    }

    fn fixture(agent: AgentConfig) -> Fixture {
        let chain = Arc::new(MockChain::default());
        let store = Arc::new(MemoryStore::new());
        let oracle = Arc::new(StubOracle::default());
        let orchestrator =
            Orchestrator::new(chain.clone(), store.clone(), oracle.clone(), agent);
        Fixture {
            chain,
            store,
            oracle,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_startup_initializes_missing_config() {
        let f = fixture(AgentConfig::default());
        f.orchestrator.startup().await;
        assert!(f.chain.state.lock().unwrap().config_present);
    }

    #[tokio::test]
    async fn test_startup_survives_chain_outage() {
        let f = fixture(AgentConfig::default());
        f.chain.state.lock().unwrap().rpc_down = true;

        // Completes without initializing or touching the store.
        f.orchestrator.startup().await;
        assert!(!f.chain.state.lock().unwrap().config_present);
        assert!(f.store.all_markets().await.unwrap().is_empty());

        // The next sync after the rpc comes back proceeds as usual.
        f.chain.state.lock().unwrap().rpc_down = false;
        f.orchestrator.startup().await;
        assert!(f.chain.state.lock().unwrap().config_present);
    }

    #[tokio::test]
    async fn test_startup_imports_unknown_markets() {
        let f = fixture(AgentConfig::default());
        {
            let mut state = f.chain.state.lock().unwrap();
            state.config_present = true;
            state.scan.push(ScannedMarket {
                address: test_address(5),
                market_id: Some(5),
                account: Ok(onchain_market(5, true, Some(true))),
            });
        }

        f.orchestrator.startup().await;

        let record = f.store.get_market(5).await.unwrap().expect("imported");
        assert_eq!(record.question, "question 5");
        assert!(record.resolved);
        assert_eq!(record.outcome, Some(true));
        assert_eq!(
            record.resolution_reasoning.as_deref(),
            Some("Imported from blockchain")
        );
    }

    #[tokio::test]
    async fn test_startup_marks_undecodable_blob_corrupted() {
        let f = fixture(AgentConfig::default());
        {
            let mut state = f.chain.state.lock().unwrap();
            state.config_present = true;
            state.scan.push(ScannedMarket {
                address: test_address(9),
                market_id: Some(9),
                account: Err(DecodeError::Text {
                    field: "question",
                    detail: "invalid utf-8".to_string(),
                }),
            });
        }

        f.orchestrator.startup().await;

        let record = f.store.get_market(9).await.unwrap().expect("recorded");
        assert!(record.corrupted);
        assert!(record
            .corrupt_reason
            .as_deref()
            .unwrap()
            .contains("undecodable"));
    }

    #[tokio::test]
    async fn test_startup_corrects_drifted_address() {
        let f = fixture(AgentConfig::default());
        {
            let mut state = f.chain.state.lock().unwrap();
            state.config_present = true;
            state.scan.push(ScannedMarket {
                address: test_address(3),
                market_id: Some(3),
                account: Ok(onchain_market(3, false, None)),
            });
        }
        let mut seeded = stored_market(3, 10_000);
        seeded.market_address = Pubkey::new_unique().to_string();
        f.store.upsert_market(&seeded).await.unwrap();

        f.orchestrator.startup().await;

        let record = f.store.get_market(3).await.unwrap().unwrap();
        assert_eq!(record.market_address, test_address(3).to_string());
        assert!(!record.resolved);
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_empty_store() {
        let mut agent = AgentConfig::default();
        agent.bootstrap_markets = 2;
        let f = fixture(agent);
        f.chain.state.lock().unwrap().config_present = true;
        {
            let mut ideas = f.oracle.ideas.lock().unwrap();
            ideas.push_back(idea("Will BTC exceed $100k?"));
            ideas.push_back(idea("Will Solana flip Ethereum this year?"));
        }

        f.orchestrator.startup().await;

        let state = f.chain.state.lock().unwrap();
        assert_eq!(state.created.len(), 2);
        assert_eq!(state.market_count, 2);
    }

    #[tokio::test]
    async fn test_creation_skips_duplicate_then_creates() {
        let f = fixture(AgentConfig::default());
        {
            let mut state = f.chain.state.lock().unwrap();
            state.config_present = true;
            state.market_count = 3;
        }
        let now = Utc::now().timestamp();
        let mut seeded = stored_market(0, now + 600);
        seeded.question = "Will BTC exceed $100k?".to_string();
        f.store.upsert_market(&seeded).await.unwrap();
        {
            let mut ideas = f.oracle.ideas.lock().unwrap();
            ideas.push_back(idea("will btc exceed $100k"));
            ideas.push_back(idea("Will Solana flip Ethereum this year?"));
        }

        let created = f.orchestrator.create_market_once().await.expect("cycle");
        assert!(created);

        {
            let state = f.chain.state.lock().unwrap();
            assert_eq!(state.created.len(), 1);
            assert_eq!(
                state.created[0].question,
                "Will Solana flip Ethereum this year?"
            );
            assert_eq!(state.created[0].market_id, 3);
        }

        let record = f.store.get_market(3).await.unwrap().expect("stored");
        assert_eq!(record.market_address, test_address(3).to_string());
        assert!(!record.resolved);
    }

    #[tokio::test]
    async fn test_creation_exhausts_attempts_on_duplicates() {
        let mut agent = AgentConfig::default();
        agent.creation_attempts = 2;
        let f = fixture(agent);
        f.chain.state.lock().unwrap().config_present = true;
        let now = Utc::now().timestamp();
        let mut seeded = stored_market(0, now + 600);
        seeded.question = "Will BTC exceed $100k?".to_string();
        f.store.upsert_market(&seeded).await.unwrap();
        {
            let mut ideas = f.oracle.ideas.lock().unwrap();
            ideas.push_back(idea("Will BTC exceed $100k?"));
            ideas.push_back(idea("will btc exceed $100k!"));
        }

        let created = f.orchestrator.create_market_once().await.expect("cycle");
        assert!(!created);
        assert!(f.chain.state.lock().unwrap().created.is_empty());
    }

    #[tokio::test]
    async fn test_resolution_happy_path() {
        let f = fixture(AgentConfig::default());
        let now = Utc::now().timestamp();
        {
            let mut state = f.chain.state.lock().unwrap();
            state.config_present = true;
            state
                .accounts
                .push((test_address(1), onchain_market(1, false, None)));
        }
        f.store
            .upsert_market(&stored_market(1, now - 60))
            .await
            .unwrap();
        *f.oracle.verdict.lock().unwrap() = Some(Verdict {
            outcome: true,
            reasoning: "it happened".to_string(),
            confidence: None,
        });

        let resolved = f.orchestrator.resolution_tick().await.expect("tick");
        assert_eq!(resolved, 1);
        assert_eq!(f.chain.state.lock().unwrap().resolve_calls, vec![(1, true)]);

        let record = f.store.get_market(1).await.unwrap().unwrap();
        assert!(record.resolved);
        assert_eq!(record.outcome, Some(true));
        assert_eq!(record.resolution_reasoning.as_deref(), Some("it happened"));
        assert!(record.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_resolution_confidence_floor() {
        let f = fixture(AgentConfig::default());
        let now = Utc::now().timestamp();
        {
            let mut state = f.chain.state.lock().unwrap();
            state.config_present = true;
            state
                .accounts
                .push((test_address(1), onchain_market(1, false, None)));
        }
        f.store
            .upsert_market(&stored_market(1, now - 60))
            .await
            .unwrap();

        *f.oracle.verdict.lock().unwrap() = Some(Verdict {
            outcome: false,
            reasoning: "shaky".to_string(),
            confidence: Some(0.2),
        });
        assert_eq!(f.orchestrator.resolution_tick().await.unwrap(), 0);
        assert!(f.chain.state.lock().unwrap().resolve_calls.is_empty());
        assert!(!f.store.get_market(1).await.unwrap().unwrap().resolved);

        *f.oracle.verdict.lock().unwrap() = Some(Verdict {
            outcome: false,
            reasoning: "certain".to_string(),
            confidence: Some(0.95),
        });
        assert_eq!(f.orchestrator.resolution_tick().await.unwrap(), 1);
        assert!(f.store.get_market(1).await.unwrap().unwrap().resolved);
    }

    #[tokio::test]
    async fn test_resolution_syncs_already_resolved_chain_state() {
        let f = fixture(AgentConfig::default());
        let now = Utc::now().timestamp();
        {
            let mut state = f.chain.state.lock().unwrap();
            state.config_present = true;
            state
                .accounts
                .push((test_address(2), onchain_market(2, true, Some(false))));
        }
        f.store
            .upsert_market(&stored_market(2, now - 60))
            .await
            .unwrap();

        let resolved = f.orchestrator.resolution_tick().await.expect("tick");
        assert_eq!(resolved, 1);
        assert!(f.chain.state.lock().unwrap().resolve_calls.is_empty());

        let record = f.store.get_market(2).await.unwrap().unwrap();
        assert!(record.resolved);
        assert_eq!(record.outcome, Some(false));
        assert_eq!(
            record.resolution_reasoning.as_deref(),
            Some("Already resolved on chain")
        );
    }

    #[tokio::test]
    async fn test_resolution_address_mismatch_corrupts() {
        let f = fixture(AgentConfig::default());
        let now = Utc::now().timestamp();
        f.chain.state.lock().unwrap().config_present = true;
        let mut record = stored_market(4, now - 60);
        record.market_address = Pubkey::new_unique().to_string();
        f.store.upsert_market(&record).await.unwrap();

        assert_eq!(f.orchestrator.resolution_tick().await.unwrap(), 0);
        assert!(f.chain.state.lock().unwrap().resolve_calls.is_empty());

        let stored = f.store.get_market(4).await.unwrap().unwrap();
        assert!(stored.corrupted);

        // Terminal: later ticks skip it entirely.
        assert_eq!(f.orchestrator.resolution_tick().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resolution_adopts_onchain_id() {
        let f = fixture(AgentConfig::default());
        let now = Utc::now().timestamp();
        {
            let mut state = f.chain.state.lock().unwrap();
            state.config_present = true;
            // The account at the id-5 address was written under id 9.
            state
                .accounts
                .push((test_address(5), onchain_market(9, false, None)));
        }
        f.store
            .upsert_market(&stored_market(5, now - 60))
            .await
            .unwrap();
        *f.oracle.verdict.lock().unwrap() = Some(Verdict {
            outcome: true,
            reasoning: "settled".to_string(),
            confidence: None,
        });

        assert_eq!(f.orchestrator.resolution_tick().await.unwrap(), 1);
        assert_eq!(f.chain.state.lock().unwrap().resolve_calls, vec![(9, true)]);

        let adopted = f.store.get_market(9).await.unwrap().expect("adopted");
        assert!(adopted.resolved);
        assert_eq!(adopted.market_address, test_address(5).to_string());

        // The stale row stays behind, retired from selection.
        let stale = f.store.get_market(5).await.unwrap().unwrap();
        assert!(stale.corrupted);
    }

    #[tokio::test]
    async fn test_resolution_id_collision_corrupts() {
        let f = fixture(AgentConfig::default());
        let now = Utc::now().timestamp();
        {
            let mut state = f.chain.state.lock().unwrap();
            state.config_present = true;
            state
                .accounts
                .push((test_address(5), onchain_market(9, false, None)));
        }
        f.store
            .upsert_market(&stored_market(5, now - 60))
            .await
            .unwrap();
        // Id 9 is already tracked at its own address.
        f.store
            .upsert_market(&stored_market(9, now + 600))
            .await
            .unwrap();

        assert_eq!(f.orchestrator.resolution_tick().await.unwrap(), 0);
        assert!(f.chain.state.lock().unwrap().resolve_calls.is_empty());
        assert!(f.store.get_market(5).await.unwrap().unwrap().corrupted);
        assert!(!f.store.get_market(9).await.unwrap().unwrap().corrupted);
    }

    #[tokio::test]
    async fn test_sweep_runs_once() {
        let mut agent = AgentConfig::default();
        agent.sweep_grace_secs = 60;
        let f = fixture(agent);
        let now = Utc::now().timestamp();
        f.chain
            .state
            .lock()
            .unwrap()
            .accounts
            .push((test_address(6), onchain_market(6, true, Some(true))));

        let mut record = stored_market(6, now - 600);
        record.resolved = true;
        record.outcome = Some(true);
        record.resolved_at = Some(now - 300);
        f.store.upsert_market(&record).await.unwrap();

        assert_eq!(f.orchestrator.sweep_tick().await.unwrap(), 1);
        assert_eq!(f.chain.state.lock().unwrap().sweep_calls, vec![6]);
        assert!(f.store.get_market(6).await.unwrap().unwrap().swept);

        // Already swept, nothing due.
        assert_eq!(f.orchestrator.sweep_tick().await.unwrap(), 0);
        assert_eq!(f.chain.state.lock().unwrap().sweep_calls, vec![6]);
    }

    #[tokio::test]
    async fn test_sweep_treats_empty_vault_rejection_as_done() {
        let mut agent = AgentConfig::default();
        agent.sweep_grace_secs = 60;
        let f = fixture(agent);
        let now = Utc::now().timestamp();
        {
            let mut state = f.chain.state.lock().unwrap();
            state.sweep_rejection = Some(program::ERR_NO_REMAINING_FUNDS);
            state
                .accounts
                .push((test_address(7), onchain_market(7, true, Some(false))));
        }

        let mut record = stored_market(7, now - 600);
        record.resolved = true;
        record.outcome = Some(false);
        record.resolved_at = Some(now - 300);
        f.store.upsert_market(&record).await.unwrap();

        assert_eq!(f.orchestrator.sweep_tick().await.unwrap(), 1);
        assert!(f.chain.state.lock().unwrap().sweep_calls.is_empty());
        assert!(f.store.get_market(7).await.unwrap().unwrap().swept);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_bytes("abcdef", 4), "abcd");
        assert_eq!(truncate_bytes("ab", 4), "ab");
        // 'é' is two bytes; cutting inside it must back off.
        assert_eq!(truncate_bytes("aéé", 2), "a");
    }
}
