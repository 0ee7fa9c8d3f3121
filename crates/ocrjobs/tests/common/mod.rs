//! Shared test utilities for ocrjobs integration tests.
//!
//! This module provides:
//! - `FakeEngine`, a recognition engine that needs no external binaries
//! - `TestHarness` for an isolated service backed by an on-disk store
//! - In-memory image builders

pub mod engine;
pub mod harness;

pub use engine::{FakeEngine, FakeMode};
pub use harness::{blank_page, text_page, TestHarness};
