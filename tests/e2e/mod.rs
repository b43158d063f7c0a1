//! End-to-end tests for the content gate.
//!
//! Each test builds a full gate over an in-memory ledger with
//! [`TestHarness`], then drives it through its public operations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod audit_trail;
mod concurrency;
mod harness;
mod scenarios;

pub use harness::{HarnessOptions, TestHarness};
