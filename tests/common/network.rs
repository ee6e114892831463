//! Network-dependent test utilities.

use std::env;

/// Environment variable to enable network tests.
pub const RUN_NETWORK_TESTS_VAR: &str = "RUN_NETWORK_TESTS";

/// Network tests run when `RUN_NETWORK_TESTS` is set to a non-empty value.
#[allow(dead_code)]
pub fn should_run_network_tests() -> bool {
    env::var(RUN_NETWORK_TESTS_VAR)
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}
