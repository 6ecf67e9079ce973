//! Tideline Tests - Integration and seeded simulation tests for Tideline.
//!
//! Tests drive [`tideline_browser::RecordBrowser`] against
//! [`tideline_broker::MemoryBroker`] and check session-level properties
//! that no single page can show.
//!
//! ## Test Organization
//!
//! **DST Tests** (`*_dst.rs`): Seeded layouts, page sizes and filters with
//! fault injection and read latency
//! - `browse_dst`: full browsing sessions under random configurations
//!
//! **Integration Tests** (`*_tests.rs`): Multi-component integration
//! - `browse_tests`: paging, ordering and cursor handling across crates
//!
//! **Support Modules**:
//! - `properties`: Property checkers (`check_exactly_once`, `check_sorted`, etc.)
//! - `scenarios`: Topic layouts, seeding and the session driver
//!
//! ## Naming Conventions
//!
//! - DST tests: `test_dst_<component>_<scenario>`
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;

// DST test modules (seeded simulation with fault injection).
#[cfg(test)]
mod browse_dst;
