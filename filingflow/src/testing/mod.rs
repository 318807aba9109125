//! Test doubles and fixtures.
//!
//! Shipped as a public module so downstream crates can exercise the
//! executor against fake actions, sleepers and warehouses.

mod fixtures;
mod mocks;

pub use fixtures::{noop_chain, noop_spec, spec_with};
pub use mocks::{CountingStep, FlakyStep, GatedStep, RecordingSleeper};
