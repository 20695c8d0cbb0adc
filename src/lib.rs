//! FIXORA — football value-bet engine and ROI attribution
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod strategy;
pub mod engine;
pub mod tracking;
pub mod storage;
