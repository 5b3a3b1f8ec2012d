use crate::core::monetary::{parse_amount, UNITS_PER_COIN};
use crate::error::{LedgerError, Result};
use log::warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Read-only defaults for the CLI, built once from `LEDGER_*` environment variables.
/// The library never reads this; nodes receive their config explicitly.
pub static GLOBAL_CONFIG: Lazy<LedgerConfig> = Lazy::new(|| match LedgerConfig::from_env() {
    Ok(config) => config,
    Err(e) => {
        warn!("Ignoring invalid LEDGER_* environment overrides: {e}");
        LedgerConfig::default()
    }
});

const BASE_REWARD_KEY: &str = "LEDGER_BASE_REWARD";
const HALVING_INTERVAL_KEY: &str = "LEDGER_HALVING_INTERVAL";
const INITIAL_DIFFICULTY_KEY: &str = "LEDGER_INITIAL_DIFFICULTY";
const MAX_DIFFICULTY_KEY: &str = "LEDGER_MAX_DIFFICULTY";
const TARGET_BLOCK_TIME_KEY: &str = "LEDGER_TARGET_BLOCK_TIME_MS";
const ADMISSION_POLICY_KEY: &str = "LEDGER_ADMISSION_POLICY";

/// Which balance a sender must cover at admission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionPolicy {
    /// Only chain-confirmed balance counts; pending spends are ignored, so
    /// several pending transactions may together overspend.
    #[default]
    ConfirmedOnly,
    /// Pending mempool transactions are applied before the check.
    IncludePending,
}

impl std::str::FromStr for AdmissionPolicy {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "confirmed-only" => Ok(AdmissionPolicy::ConfirmedOnly),
            "include-pending" => Ok(AdmissionPolicy::IncludePending),
            _ => Err(LedgerError::Config(format!(
                "Invalid admission policy: {s}. Valid options: confirmed-only, include-pending"
            ))),
        }
    }
}

/// Consensus and admission parameters for a node.
///
/// Amounts are in base units (10^-8 coin). Times are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Coinbase reward before any halving
    pub base_reward: u64,
    /// Reward halves every this many blocks
    pub halving_interval: u64,
    /// Difficulty used until the first retarget
    pub initial_difficulty: u32,
    pub min_difficulty: u32,
    pub max_difficulty: u32,
    /// Number of most recent post-genesis blocks averaged by the retarget
    pub retarget_window: usize,
    pub target_block_time_ms: u64,
    /// Allowed relative deviation from the target before difficulty moves
    pub tolerance: f64,
    pub admission_policy: AdmissionPolicy,
    /// Emit a progress event every N nonce attempts
    pub progress_interval: u64,
    /// Poll the cancellation token every N nonce attempts
    pub cancel_check_interval: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            base_reward: 5 * UNITS_PER_COIN,
            halving_interval: 10,
            initial_difficulty: 1,
            min_difficulty: 1,
            max_difficulty: 5,
            retarget_window: 5,
            target_block_time_ms: 5_000,
            tolerance: 0.2,
            admission_policy: AdmissionPolicy::ConfirmedOnly,
            progress_interval: 5_000,
            cancel_check_interval: 1,
        }
    }
}

impl LedgerConfig {
    /// Defaults with any `LEDGER_*` environment overrides applied
    pub fn from_env() -> Result<LedgerConfig> {
        let mut config = LedgerConfig::default();

        if let Ok(reward) = env::var(BASE_REWARD_KEY) {
            config.base_reward = parse_amount(&reward)?;
        }
        if let Ok(interval) = env::var(HALVING_INTERVAL_KEY) {
            config.halving_interval = parse_env(HALVING_INTERVAL_KEY, &interval)?;
        }
        if let Ok(difficulty) = env::var(INITIAL_DIFFICULTY_KEY) {
            config.initial_difficulty = parse_env(INITIAL_DIFFICULTY_KEY, &difficulty)?;
        }
        if let Ok(difficulty) = env::var(MAX_DIFFICULTY_KEY) {
            config.max_difficulty = parse_env(MAX_DIFFICULTY_KEY, &difficulty)?;
        }
        if let Ok(target) = env::var(TARGET_BLOCK_TIME_KEY) {
            config.target_block_time_ms = parse_env(TARGET_BLOCK_TIME_KEY, &target)?;
        }
        if let Ok(policy) = env::var(ADMISSION_POLICY_KEY) {
            config.admission_policy = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<LedgerConfig> {
        let config: LedgerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file; missing keys fall back to defaults
    pub fn load(path: &Path) -> Result<LedgerConfig> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.halving_interval == 0 {
            return Err(LedgerError::Config(
                "halving_interval must be positive".to_string(),
            ));
        }
        if self.min_difficulty == 0 || self.min_difficulty > self.max_difficulty {
            return Err(LedgerError::Config(format!(
                "Difficulty bounds [{}, {}] are invalid",
                self.min_difficulty, self.max_difficulty
            )));
        }
        if !(self.min_difficulty..=self.max_difficulty).contains(&self.initial_difficulty) {
            return Err(LedgerError::Config(format!(
                "initial_difficulty {} is outside [{}, {}]",
                self.initial_difficulty, self.min_difficulty, self.max_difficulty
            )));
        }
        if self.retarget_window == 0 {
            return Err(LedgerError::Config(
                "retarget_window must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.tolerance) {
            return Err(LedgerError::Config(format!(
                "tolerance {} must be in [0, 1)",
                self.tolerance
            )));
        }
        if self.progress_interval == 0 || self.cancel_check_interval == 0 {
            return Err(LedgerError::Config(
                "progress_interval and cancel_check_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| LedgerError::Config(format!("{key} has invalid value '{value}'")))
}
