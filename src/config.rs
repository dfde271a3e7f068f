//! Terminal configuration.
//!
//! Settings come from an optional TOML file overlaid with environment
//! variables prefixed with `TERMINAL__`; nested keys use double underscores
//! (`TERMINAL__GATEWAY__TIMEOUT_MS` maps to `gateway.timeout_ms`). Every
//! section has defaults, so no source at all yields a working terminal.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::Amount;
use crate::model::Currency;
use crate::protocol::{Protocol, ProtocolRegistry, RegistryError, RiskClass, builtin_protocols};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid protocol table: {0}")]
    Registry(#[from] RegistryError),

    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub protocols: Vec<Protocol>,
    pub offline: OfflinePolicy,
    pub gateway: GatewayConfig,
    pub pre_auth: PreAuthConfig,
    pub simulator: SimulatorConfig,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            protocols: builtin_protocols(),
            offline: OfflinePolicy::default(),
            gateway: GatewayConfig::default(),
            pre_auth: PreAuthConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl TerminalConfig {
    /// Load from `path` (if any) and `TERMINAL__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "loading config");
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("TERMINAL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?.try_deserialize::<TerminalConfig>()?;
        config.check()?;
        Ok(config)
    }

    /// Reject values that deserialize but cannot be used.
    fn check(&self) -> Result<(), ConfigError> {
        let ttl_secs = self.pre_auth.ttl_secs;
        if ttl_secs <= 0 || chrono::TimeDelta::try_seconds(ttl_secs).is_none() {
            return Err(ConfigError::Invalid {
                key: "pre_auth.ttl_secs",
                reason: format!("{ttl_secs} is not a positive number of seconds in range"),
            });
        }
        Ok(())
    }

    /// Build the protocol registry described by this config.
    pub fn registry(&self) -> Result<ProtocolRegistry, ConfigError> {
        Ok(ProtocolRegistry::new(self.protocols.iter().cloned())?)
    }
}

/// Offline floor limit for one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorLimit {
    pub currency: Currency,
    pub limit: Amount,
}

/// Rules for deciding a transaction locally when it is not sent online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflinePolicy {
    /// Protocols riskier than this are never approved offline.
    pub max_risk_class: RiskClass,
    /// Amounts above a currency's limit are declined offline. A currency
    /// with no entry is never approved offline.
    pub floor_limits: Vec<FloorLimit>,
}

impl Default for OfflinePolicy {
    fn default() -> Self {
        let limit = |currency, amount: &str| FloorLimit {
            currency,
            limit: amount.parse().unwrap_or_default(),
        };
        Self {
            max_risk_class: RiskClass::Standard,
            floor_limits: vec![
                limit(Currency::Usd, "100.00"),
                limit(Currency::Eur, "100.00"),
                limit(Currency::Gbp, "100.00"),
                limit(Currency::Btc, "0.005"),
                limit(Currency::Eth, "0.05"),
            ],
        }
    }
}

impl OfflinePolicy {
    pub fn floor_limit(&self, currency: Currency) -> Option<Amount> {
        self.floor_limits
            .iter()
            .find(|entry| entry.currency == currency)
            .map(|entry| entry.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upper bound on one online authorization round-trip.
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreAuthConfig {
    /// How long an approved hold may still be completed.
    pub ttl_secs: i64,
}

impl Default for PreAuthConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl PreAuthConfig {
    /// Saturates at [`chrono::TimeDelta::MAX`]; `load` rejects such values.
    pub fn ttl(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::try_seconds(self.ttl_secs).unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// Behaviour of the simulated gateway used by the batch binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Requests above this amount are declined.
    pub decline_above: Amount,
    /// Balance reported for balance inquiries.
    pub balance: Amount,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            decline_above: Amount::from_units(1_000),
            balance: Amount::from_units(2_500),
        }
    }
}
