//! Tunable matching and reporting parameters

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::types::*;

/// Configuration for matching, reporting, and pass limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Half-width in days of the window an exact match must fall inside
    pub date_window_days: i64,
    /// Largest absolute amount difference still treated as equal
    pub amount_epsilon: BigDecimal,
    /// Half-width in days for pairing a differing amount as a discrepancy
    pub discrepancy_date_days: i64,
    /// A statement is balanced when |variance| is below this
    pub balance_tolerance: BigDecimal,
    /// Upper bound for loading and matching in one pass
    pub pass_timeout_secs: u64,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            date_window_days: 3,
            amount_epsilon: BigDecimal::new(5.into(), 3),
            discrepancy_date_days: 1,
            balance_tolerance: BigDecimal::new(1.into(), 2),
            pass_timeout_secs: 30,
        }
    }
}

impl ReconConfig {
    /// Load from `RECON_*` environment variables, defaulting any that are unset
    pub fn from_env() -> ReconResult<Self> {
        let defaults = Self::default();

        let config = Self {
            date_window_days: env_or("RECON_DATE_WINDOW_DAYS", defaults.date_window_days)?,
            amount_epsilon: env_or("RECON_AMOUNT_EPSILON", defaults.amount_epsilon)?,
            discrepancy_date_days: env_or(
                "RECON_DISCREPANCY_DATE_DAYS",
                defaults.discrepancy_date_days,
            )?,
            balance_tolerance: env_or("RECON_BALANCE_TOLERANCE", defaults.balance_tolerance)?,
            pass_timeout_secs: env_or("RECON_PASS_TIMEOUT_SECS", defaults.pass_timeout_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ReconResult<()> {
        if self.date_window_days < 0 {
            return Err(ReconError::Config(
                "date_window_days cannot be negative".to_string(),
            ));
        }
        if self.discrepancy_date_days < 0 {
            return Err(ReconError::Config(
                "discrepancy_date_days cannot be negative".to_string(),
            ));
        }
        if self.amount_epsilon < BigDecimal::zero() {
            return Err(ReconError::Config(
                "amount_epsilon cannot be negative".to_string(),
            ));
        }
        if self.balance_tolerance <= BigDecimal::zero() {
            return Err(ReconError::Config(
                "balance_tolerance must be positive".to_string(),
            ));
        }
        if self.pass_timeout_secs == 0 {
            return Err(ReconError::Config(
                "pass_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> ReconResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ReconError::Config(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}
