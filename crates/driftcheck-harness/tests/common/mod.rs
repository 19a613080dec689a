#![allow(dead_code)]

use std::sync::Arc;

use driftcheck_harness::{Harness, HarnessConfig};
use driftcheck_memory::{InMemoryProvider, MemoryProviderOptions};
use driftcheck_provider::{CallJournal, JournaledProvider};

pub type Provider = JournaledProvider<InMemoryProvider>;

/// Short intervals so paused-clock tests stay readable.
pub fn fast_config() -> HarnessConfig {
    let mut cfg = HarnessConfig::default();
    cfg.verify.initial_interval_ms = 10;
    cfg.verify.max_interval_ms = 100;
    cfg.verify.max_attempts = 5;
    cfg.verify.timeout_ms = 5_000;
    cfg.teardown.initial_interval_ms = 10;
    cfg.teardown.max_interval_ms = 100;
    cfg.teardown.max_attempts = 5;
    cfg.teardown.timeout_ms = 5_000;
    cfg
}

pub fn harness_with(
    options: MemoryProviderOptions,
    config: HarnessConfig,
) -> (Harness<Provider>, CallJournal) {
    let journal = CallJournal::new();
    let provider = Arc::new(JournaledProvider::new(
        InMemoryProvider::with_options(options),
        journal.clone(),
    ));
    let harness = Harness::new(provider, config).expect("valid config");
    (harness, journal)
}

pub fn harness(options: MemoryProviderOptions) -> (Harness<Provider>, CallJournal) {
    harness_with(options, fast_config())
}
