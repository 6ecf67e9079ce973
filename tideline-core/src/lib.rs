//! Tideline Core - Strongly-typed identifiers and record types.
//!
//! This crate provides the vocabulary shared by every Tideline crate: the
//! partition identifier, log offsets, timestamps and the immutable `Record`
//! returned by a broker read.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: a partition id can't be mixed up with an offset
//! - **Explicit types**: u64 offsets, i64 millisecond timestamps
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod record;
mod types;

pub use record::{Header, Offset, Record, Timestamp};
pub use types::PartitionId;
