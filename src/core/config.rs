//! Hub configuration.
//!
//! All tunable protocol parameters live in [`HubConfig`]. Defaults carry the
//! protocol constants; a deployment may load a JSON file and override single
//! values through `MINTINGHUB_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::crypto::AssetId;

// ═══════════════════════════════════════════════════════════════════════════════
// HUB CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol parameters of a minting hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// One-time fee for opening an original position
    pub opening_fee: u128,

    /// Share of a liquidation offer paid to the challenger
    pub challenger_reward_ppm: u32,

    /// Shortest allowed initialization period
    pub min_init_period: u64,

    /// Shortest allowed challenge period
    pub min_challenge_period: u64,

    /// Cooldown armed by raising the liquidation price
    pub price_increase_cooldown: u64,

    /// Minting restriction after a challenge is averted or succeeds
    pub challenge_cooldown: u64,

    /// Multiple of the liquidation price asked right after expiration
    pub expired_price_factor: u128,

    /// Minimum value of a position's minimum collateral at its price
    pub min_collateral_value: u128,

    /// Highest clone price as a multiple of the parent's price
    pub max_clone_price_factor: u128,

    /// Base annual rate added to each position's risk premium
    pub lead_rate_ppm: u32,

    /// Exponent of the phase-2 price decay curve
    pub decay_exponent: u32,

    /// Collateral asset that may be deposited and withdrawn as native value
    pub wrapped_native: Option<AssetId>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            opening_fee: OPENING_FEE,
            challenger_reward_ppm: CHALLENGER_REWARD_PPM,
            min_init_period: MIN_INIT_PERIOD,
            min_challenge_period: MIN_CHALLENGE_PERIOD,
            price_increase_cooldown: PRICE_INCREASE_COOLDOWN,
            challenge_cooldown: CHALLENGE_COOLDOWN,
            expired_price_factor: EXPIRED_PRICE_FACTOR,
            min_collateral_value: MIN_COLLATERAL_VALUE,
            max_clone_price_factor: MAX_CLONE_PRICE_FACTOR,
            lead_rate_ppm: 0,
            decay_exponent: DEFAULT_DECAY_EXPONENT,
            wrapped_native: None,
        }
    }
}

impl HubConfig {
    /// Default configuration with `asset` as the wrapped native collateral
    pub fn with_wrapped_native(asset: AssetId) -> Self {
        Self {
            wrapped_native: Some(asset),
            ..Self::default()
        }
    }

    /// Set the lead rate
    pub fn with_lead_rate(mut self, lead_rate_ppm: u32) -> Self {
        self.lead_rate_ppm = lead_rate_ppm;
        self
    }

    /// Set the phase-2 decay exponent
    pub fn with_decay_exponent(mut self, exponent: u32) -> Self {
        self.decay_exponent = exponent;
        self
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("read {}: {}", path.as_ref().display(), e)))?;

        let config: Self =
            serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Config(e.to_string()))?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Defaults with overrides from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MINTINGHUB_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} has invalid value {:?}", key, value)))
        }

        if let Some(v) = lookup("MINTINGHUB_OPENING_FEE") {
            self.opening_fee = parse("MINTINGHUB_OPENING_FEE", v)?;
        }
        if let Some(v) = lookup("MINTINGHUB_CHALLENGER_REWARD_PPM") {
            self.challenger_reward_ppm = parse("MINTINGHUB_CHALLENGER_REWARD_PPM", v)?;
        }
        if let Some(v) = lookup("MINTINGHUB_MIN_INIT_PERIOD") {
            self.min_init_period = parse("MINTINGHUB_MIN_INIT_PERIOD", v)?;
        }
        if let Some(v) = lookup("MINTINGHUB_MIN_CHALLENGE_PERIOD") {
            self.min_challenge_period = parse("MINTINGHUB_MIN_CHALLENGE_PERIOD", v)?;
        }
        if let Some(v) = lookup("MINTINGHUB_LEAD_RATE_PPM") {
            self.lead_rate_ppm = parse("MINTINGHUB_LEAD_RATE_PPM", v)?;
        }
        if let Some(v) = lookup("MINTINGHUB_DECAY_EXPONENT") {
            self.decay_exponent = parse("MINTINGHUB_DECAY_EXPONENT", v)?;
        }
        if let Some(v) = lookup("MINTINGHUB_WRAPPED_NATIVE") {
            self.wrapped_native = Some(AssetId::from_symbol(v.trim()));
        }
        Ok(())
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        if self.challenger_reward_ppm as u128 > PPM {
            return Err(Error::Config("challenger reward above 100%".into()));
        }
        if self.min_challenge_period == 0 {
            return Err(Error::Config("challenge period must be positive".into()));
        }
        if self.expired_price_factor == 0 {
            return Err(Error::Config("expired price factor must be positive".into()));
        }
        if self.max_clone_price_factor == 0 {
            return Err(Error::Config("clone price factor must be positive".into()));
        }
        if self.decay_exponent == 0 || self.decay_exponent > MAX_DECAY_EXPONENT {
            return Err(Error::Config(format!(
                "decay exponent {} outside 1..={}",
                self.decay_exponent, MAX_DECAY_EXPONENT
            )));
        }
        if self.opening_fee > self.min_collateral_value {
            return Err(Error::Config("opening fee exceeds minimum collateral value".into()));
        }
        Ok(())
    }
}
