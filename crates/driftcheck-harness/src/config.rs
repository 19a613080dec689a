use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::poll::PollPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarnessConfig {
    /// Polling while verifying a step's assertions
    #[serde(default)]
    pub verify: VerifyConfig,
    /// Polling while confirming the resource is gone
    #[serde(default)]
    pub teardown: TeardownConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default derived via field defaults

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_poll(
            "verify",
            self.verify.initial_interval_ms,
            self.verify.max_interval_ms,
            self.verify.multiplier,
            self.verify.max_attempts,
            self.verify.timeout_ms,
        )?;
        validate_poll(
            "teardown",
            self.teardown.initial_interval_ms,
            self.teardown.max_interval_ms,
            self.teardown.multiplier,
            self.teardown.max_attempts,
            self.teardown.timeout_ms,
        )?;
        if self.run.deadline_ms == 0 {
            return Err("run.deadline_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn verify_policy(&self) -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(self.verify.initial_interval_ms),
            max_interval: Duration::from_millis(self.verify.max_interval_ms),
            multiplier: self.verify.multiplier,
            max_attempts: self.verify.max_attempts,
            timeout: Duration::from_millis(self.verify.timeout_ms),
        }
    }

    pub fn teardown_policy(&self) -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(self.teardown.initial_interval_ms),
            max_interval: Duration::from_millis(self.teardown.max_interval_ms),
            multiplier: self.teardown.multiplier,
            max_attempts: self.teardown.max_attempts,
            timeout: Duration::from_millis(self.teardown.timeout_ms),
        }
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_millis(self.run.deadline_ms)
    }
}

fn validate_poll(
    section: &str,
    initial_interval_ms: u64,
    max_interval_ms: u64,
    multiplier: f64,
    max_attempts: u32,
    timeout_ms: u64,
) -> Result<(), String> {
    if initial_interval_ms == 0 {
        return Err(format!("{section}.initial_interval_ms must be > 0"));
    }
    if initial_interval_ms > max_interval_ms {
        return Err(format!(
            "{section}.initial_interval_ms must be <= {section}.max_interval_ms"
        ));
    }
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(format!("{section}.multiplier must be >= 1.0"));
    }
    if max_attempts == 0 {
        return Err(format!("{section}.max_attempts must be > 0"));
    }
    if timeout_ms == 0 {
        return Err(format!("{section}.timeout_ms must be > 0"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default = "default_verify_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_verify_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_verify_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_verify_timeout_ms")]
    pub timeout_ms: u64,
    /// Keep polling while assertions fail, until they hold or the budget runs out.
    /// When disabled only ambiguous fetch errors are retried.
    #[serde(default = "default_await_convergence")]
    pub await_convergence: bool,
}

fn default_verify_initial_interval_ms() -> u64 {
    500
}
fn default_verify_max_interval_ms() -> u64 {
    10_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_verify_max_attempts() -> u32 {
    10
}
fn default_verify_timeout_ms() -> u64 {
    120_000
}
fn default_await_convergence() -> bool {
    true
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_verify_initial_interval_ms(),
            max_interval_ms: default_verify_max_interval_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_verify_max_attempts(),
            timeout_ms: default_verify_timeout_ms(),
            await_convergence: default_await_convergence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownConfig {
    #[serde(default = "default_teardown_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_teardown_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_teardown_max_attempts")]
    pub max_attempts: u32,
    /// Budget for destroy plus absence polling. Independent of `run.deadline_ms`
    /// so teardown still gets to run after the run deadline fired.
    #[serde(default = "default_teardown_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_teardown_initial_interval_ms() -> u64 {
    1_000
}
fn default_teardown_max_interval_ms() -> u64 {
    30_000
}
fn default_teardown_max_attempts() -> u32 {
    40
}
fn default_teardown_timeout_ms() -> u64 {
    600_000
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_teardown_initial_interval_ms(),
            max_interval_ms: default_teardown_max_interval_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_teardown_max_attempts(),
            timeout_ms: default_teardown_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Overall deadline for applying and verifying every step of one run
    #[serde(default = "default_run_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_run_deadline_ms() -> u64 {
    3_600_000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_run_deadline_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::HarnessConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<HarnessConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("driftcheck.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., DRIFTCHECK__TEARDOWN__TIMEOUT_MS=60000
        builder = builder.add_source(
            Environment::with_prefix("DRIFTCHECK")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: HarnessConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
