use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::keypair::keypair_from_seed;
use std::path::Path;
use thiserror::Error;

use crate::program::{RevisionPreset, DEFAULT_PROGRAM_ID};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("bad signing key: {0}")]
    Key(String),
    #[error("bad config value: {0}")]
    Invalid(String),
}

/// Which ingestion strategy feeds the trade sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Subscribe to program logs over WebSocket.
    Push,
    /// Poll signatures and fetch transaction details.
    Pull,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub solana: SolanaConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub helius: HeliusConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolanaConfig {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// WebSocket endpoint; derived from rpc_url when unset
    #[serde(default)]
    pub ws_url: String,
    /// Market program id (base58)
    #[serde(default = "default_program_id")]
    pub program_id: String,
    /// Deployed program revision in play
    #[serde(default = "default_revision")]
    pub revision: RevisionPreset,
    /// Signing key material - loaded from env PRIVATE_KEY_BYTES
    #[serde(default)]
    pub signing_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Seconds between market creation attempts.
    #[serde(default = "default_creation_interval")]
    pub creation_interval_secs: u64,
    /// Seconds between resolution/sweep due-checks.
    #[serde(default = "default_resolution_interval")]
    pub resolution_interval_secs: u64,
    /// Seconds between ingestion polls (pull mode).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Max signatures fetched per poll.
    #[serde(default = "default_signature_batch")]
    pub signature_batch: usize,
    /// How long a new market stays open.
    #[serde(default = "default_market_duration")]
    pub market_duration_secs: u64,
    /// Lamports seeded into each new market.
    #[serde(default = "default_initial_liquidity")]
    pub initial_liquidity_lamports: u64,
    /// Seconds after resolution before the vault is swept.
    #[serde(default = "default_sweep_grace")]
    pub sweep_grace_secs: u64,
    /// Verdicts below this confidence leave the market pending.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Content-generation retries when a candidate is a duplicate.
    #[serde(default = "default_creation_attempts")]
    pub creation_attempts: u32,
    /// Markets created right after startup sync (0 = none).
    #[serde(default)]
    pub bootstrap_markets: u32,
    #[serde(default = "default_ingest_mode")]
    pub ingest: IngestMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_url")]
    pub url: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    /// API key - loaded from env GROQ_API_KEY
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeliusConfig {
    /// Parse-transactions endpoint - overridden by env HELIUS_ENDPOINT
    #[serde(default = "default_helius_endpoint")]
    pub endpoint: String,
    /// API key - loaded from env HELIUS_API_KEY
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Valkey connection string - overridden by env VALKEY_URL
    #[serde(default = "default_store_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}
fn default_program_id() -> String {
    DEFAULT_PROGRAM_ID.to_string()
}
fn default_revision() -> RevisionPreset {
    RevisionPreset::Current
}
fn default_creation_interval() -> u64 {
    15 * 60
}
fn default_resolution_interval() -> u64 {
    60
}
fn default_poll_interval() -> u64 {
    10
}
fn default_signature_batch() -> usize {
    100
}
fn default_market_duration() -> u64 {
    30 * 60
}
fn default_initial_liquidity() -> u64 {
    100_000_000
}
fn default_sweep_grace() -> u64 {
    60 * 60
}
fn default_min_confidence() -> f64 {
    0.7
}
fn default_creation_attempts() -> u32 {
    5
}
fn default_ingest_mode() -> IngestMode {
    IngestMode::Pull
}
fn default_oracle_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}
fn default_oracle_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_helius_endpoint() -> String {
    "https://api-devnet.helius-rpc.com/".to_string()
}
fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            ws_url: String::new(),
            program_id: default_program_id(),
            revision: default_revision(),
            signing_key: String::new(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            creation_interval_secs: default_creation_interval(),
            resolution_interval_secs: default_resolution_interval(),
            poll_interval_secs: default_poll_interval(),
            signature_batch: default_signature_batch(),
            market_duration_secs: default_market_duration(),
            initial_liquidity_lamports: default_initial_liquidity(),
            sweep_grace_secs: default_sweep_grace(),
            min_confidence: default_min_confidence(),
            creation_attempts: default_creation_attempts(),
            bootstrap_markets: 0,
            ingest: default_ingest_mode(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: default_oracle_url(),
            model: default_oracle_model(),
            api_key: String::new(),
        }
    }
}

impl Default for HeliusConfig {
    fn default() -> Self {
        Self {
            endpoint: default_helius_endpoint(),
            api_key: String::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for
    /// endpoints and secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.overlay_env();
        Ok(config)
    }

    /// Defaults plus env-only secrets (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config {
            solana: SolanaConfig::default(),
            agent: AgentConfig::default(),
            oracle: OracleConfig::default(),
            helius: HeliusConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.overlay_env();
        config
    }

    // Secrets never live in the config file.
    fn overlay_env(&mut self) {
        if let Ok(url) = std::env::var("SOLANA_RPC_URL") {
            self.solana.rpc_url = url;
        }
        if let Ok(url) = std::env::var("SOLANA_WS_URL") {
            self.solana.ws_url = url;
        }
        if let Ok(key) = std::env::var("PRIVATE_KEY_BYTES") {
            self.solana.signing_key = key;
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            self.oracle.api_key = key;
        }
        if let Ok(endpoint) = std::env::var("HELIUS_ENDPOINT") {
            self.helius.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("HELIUS_API_KEY") {
            self.helius.api_key = key;
        }
        if let Ok(url) = std::env::var("VALKEY_URL") {
            self.store.url = url;
        }
    }
}

impl SolanaConfig {
    pub fn program_id(&self) -> Result<Pubkey, ConfigError> {
        self.program_id
            .parse::<Pubkey>()
            .map_err(|e| ConfigError::Invalid(format!("program_id: {e}")))
    }

    /// The WebSocket endpoint, derived from the RPC endpoint when not set.
    pub fn ws_url(&self) -> String {
        if !self.ws_url.is_empty() {
            return self.ws_url.clone();
        }
        if let Some(rest) = self.rpc_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.rpc_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.rpc_url.clone()
        }
    }

    pub fn keypair(&self) -> Result<Keypair, ConfigError> {
        if self.signing_key.is_empty() {
            return Err(ConfigError::MissingEnv("PRIVATE_KEY_BYTES".to_string()));
        }
        parse_signing_key(&self.signing_key)
    }
}

impl HeliusConfig {
    pub fn enabled(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty()
    }
}

/// Parse signing-key material in any of the shapes operators hand us:
/// a JSON integer array, bare comma-separated integers, or base58 text,
/// holding either a full 64-byte keypair or a 32-byte seed.
pub fn parse_signing_key(raw: &str) -> Result<Keypair, ConfigError> {
    let mut s = raw.trim();
    // strip one layer of shell quoting
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"'))
            || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s = &s[1..s.len() - 1];
    }

    let bytes: Vec<u8> = if s.starts_with('[') {
        serde_json::from_str(s).map_err(|e| ConfigError::Key(format!("json array: {e}")))?
    } else if s
        .chars()
        .all(|c| c.is_ascii_digit() || c == ',' || c.is_whitespace())
    {
        s.split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|e| ConfigError::Key(format!("integer list: {e}")))?
    } else {
        bs58::decode(s)
            .into_vec()
            .map_err(|e| ConfigError::Key(format!("base58: {e}")))?
    };

    match bytes.len() {
        64 => Keypair::from_bytes(&bytes).map_err(|e| ConfigError::Key(e.to_string())),
        32 => keypair_from_seed(&bytes).map_err(|e| ConfigError::Key(e.to_string())),
        n => Err(ConfigError::Key(format!(
            "expected 32 or 64 bytes, got {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signer::Signer;

    #[test]
    fn test_signing_key_formats_agree() {
        let keypair = Keypair::new();
        let bytes = keypair.to_bytes();

        let json = serde_json::to_string(&bytes.to_vec()).unwrap();
        let bare = bytes
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let b58 = bs58::encode(&bytes).into_string();
        let quoted = format!("\"{b58}\"");

        for raw in [json.as_str(), bare.as_str(), b58.as_str(), quoted.as_str()] {
            let parsed = parse_signing_key(raw).expect("format accepted");
            assert_eq!(parsed.pubkey(), keypair.pubkey(), "input {raw:?}");
        }
    }

    #[test]
    fn test_signing_key_seed() {
        let seed = [7u8; 32];
        let from_seed = parse_signing_key(&serde_json::to_string(&seed.to_vec()).unwrap())
            .expect("seed accepted");
        let direct = keypair_from_seed(&seed).unwrap();
        assert_eq!(from_seed.pubkey(), direct.pubkey());
    }

    #[test]
    fn test_signing_key_bad_length() {
        assert!(matches!(
            parse_signing_key("[1,2,3]"),
            Err(ConfigError::Key(_))
        ));
    }

    #[test]
    fn test_ws_url_derivation() {
        let mut solana = SolanaConfig::default();
        solana.rpc_url = "https://api.devnet.solana.com".to_string();
        assert_eq!(solana.ws_url(), "wss://api.devnet.solana.com");
        solana.rpc_url = "http://127.0.0.1:8899".to_string();
        assert_eq!(solana.ws_url(), "ws://127.0.0.1:8899");
        solana.ws_url = "wss://override.example".to_string();
        assert_eq!(solana.ws_url(), "wss://override.example");
    }

    #[test]
    fn test_minimal_toml() {
        let config: Config = toml::from_str(
            r#"
            [agent]
            ingest = "push"
            bootstrap_markets = 3

            [solana]
            revision = "legacy"
            "#,
        )
        .expect("parses");
        assert_eq!(config.agent.ingest, IngestMode::Push);
        assert_eq!(config.agent.bootstrap_markets, 3);
        assert_eq!(config.solana.revision, RevisionPreset::Legacy);
        assert_eq!(config.agent.creation_interval_secs, 900);
    }
}
