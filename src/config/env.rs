//! `STAKEFLOW_*` environment overrides.

use std::fmt::Display;
use std::str::FromStr;

use super::{ConfigError, ConfigResult, EngineConfig};

const PREFIX: &str = "STAKEFLOW_";

/// Reads one environment variable by name.
pub type EnvLookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Looks `key` up in the process environment.
#[must_use]
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

struct Overrides<'a, 'env> {
    env: &'a EnvLookup<'env>,
}

impl Overrides<'_, '_> {
    fn lookup(&self, suffix: &str) -> Option<(String, String)> {
        let key = format!("{PREFIX}{suffix}");
        let value = (self.env)(&key)?;
        tracing::debug!(key = %key, "configuration override");
        Some((key, value))
    }

    fn text(&self, suffix: &str, target: &mut String) {
        if let Some((_, value)) = self.lookup(suffix) {
            *target = value;
        }
    }

    fn parsed<T>(&self, suffix: &str, target: &mut T) -> ConfigResult<()>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some((key, value)) = self.lookup(suffix) else {
            return Ok(());
        };
        let parsed = value.trim().parse::<T>();
        match parsed {
            Ok(parsed_value) => {
                *target = parsed_value;
                Ok(())
            }
            Err(err) => Err(ConfigError::InvalidEnv {
                key,
                reason: err.to_string(),
                value,
            }),
        }
    }

    fn flag(&self, suffix: &str, target: &mut bool) -> ConfigResult<()> {
        let Some((key, value)) = self.lookup(suffix) else {
            return Ok(());
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => {
                return Err(ConfigError::InvalidEnv {
                    key,
                    value,
                    reason: "expected true or false".to_owned(),
                });
            }
        }
        Ok(())
    }
}

pub(super) fn apply(config: &mut EngineConfig, env: &EnvLookup<'_>) -> ConfigResult<()> {
    let overrides = Overrides { env };
    overrides.text("ACCOUNT", &mut config.account);
    overrides.text("VALIDATOR_PUBKEY", &mut config.validator_pubkey);
    overrides.text("DATABASE_URL", &mut config.database_url);
    overrides.parsed("MODE", &mut config.mode)?;
    overrides.flag("SIGNER_CONFIGURED", &mut config.signer_configured)?;
    overrides.parsed("STOP_TIMEOUT_SECS", &mut config.stop_timeout_secs)?;

    let workers = &mut config.workers;
    for (name, worker) in [
        ("UNBOOST", &mut workers.unboost),
        ("REDEEM", &mut workers.redeem),
        ("BOOST", &mut workers.boost),
        ("STATUS", &mut workers.status),
    ] {
        overrides.flag(&format!("{name}_ENABLED"), &mut worker.enabled)?;
        overrides.parsed(&format!("{name}_INTERVAL_SECS"), &mut worker.interval_secs)?;
    }

    let transactions = &mut config.transactions;
    overrides.parsed("LOCK_MAX_HOLD_SECS", &mut transactions.lock_max_hold_secs)?;
    overrides.parsed("LOCK_WAIT_SECS", &mut transactions.lock_wait_secs)?;
    overrides.flag("AWAIT_CONFIRMATIONS", &mut transactions.await_confirmations)?;
    overrides.parsed(
        "CONFIRMATION_TIMEOUT_SECS",
        &mut transactions.confirmation_timeout_secs,
    )?;

    let retry = &mut config.retry;
    overrides.parsed("RETRY_MAX_ATTEMPTS", &mut retry.max_attempts)?;
    overrides.parsed("RETRY_BACKOFF_BASE_SECS", &mut retry.backoff_base_secs)?;
    overrides.parsed("RETRY_BACKOFF_MAX_SECS", &mut retry.backoff_max_secs)?;
    Ok(())
}
