//! Tideline Broker - The boundary to the log broker.
//!
//! The browsing engine never talks to a broker directly; it goes through the
//! [`BrokerClient`] trait defined here. The trait exposes exactly what
//! browsing needs:
//!
//! - `list_partitions`: the partition set of a topic
//! - `offset_bounds`: earliest and latest offsets of a partition
//! - `offset_for_timestamp`: first offset at or after a timestamp
//! - `read`: a bounded forward read from an offset
//!
//! [`MemoryBroker`] is an in-memory implementation with deterministic fault
//! injection, used by the CLI and by the test suites.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod error;
mod memory;

pub use client::{BrokerClient, OffsetBounds, ReadBatch, ReadRequest};
pub use error::{BrokerError, BrokerResult};
pub use memory::{FaultConfig, FaultStats, MemoryBroker};
