#![allow(unused_imports)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: in-memory Mangal databases built on `MockSource`
//! - `assertions`: assertion helpers with descriptive failure messages
//! - `network`: switches for tests that talk to mangal.io

pub mod assertions;
pub mod fixtures;
pub mod network;

pub use assertions::{assert_error_contains, assert_ok};
pub use fixtures::{
    catalogue, interaction, node_id, session, set, with_network, ATTRIBUTE_ID, DATASET_ID,
};
pub use network::should_run_network_tests;
