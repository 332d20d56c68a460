//! Integration test crate for the collector.
//!
//! This crate has no library code; it only contains integration tests
//! that drive whole agent sessions through the ingestion facade and check
//! what lands on disk.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p collector-integration-tests
//! ```
