#![allow(dead_code)]
//! Shared integration test utilities.

use proptest::prelude::ProptestConfig;
use std::sync::Once;
use tracing_subscriber::filter::LevelFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging; safe to call from every test, first call wins.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(LevelFilter::TRACE)
            .with_test_writer()
            .with_target(false)
            .with_ansi(false)
            .try_init();
    });
}

/// Property-test configuration with a bounded shrink budget.
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        max_shrink_iters: 2048,
        ..ProptestConfig::default()
    }
}
