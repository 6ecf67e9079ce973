//! Tideline API - The `topic/data` endpoint over the browsing engine.
//!
//! This crate maps the endpoint's JSON request onto [`tideline_browser`]
//! page options and the resulting page back onto the JSON response:
//!
//! - [`TopicDataRequest`] / [`TopicDataResponse`]: wire shapes (camelCase)
//! - [`TopicDataService`]: cluster id to browser registry
//! - [`ApiError`]: errors with their HTTP status codes
//!
//! The `tideline` binary drives the service against a seeded in-memory
//! broker and prints each page as JSON.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod demo;
mod dto;
mod error;
mod service;

pub use demo::seed_demo_topic;
pub use dto::{
    HeaderDto, Payload, RecordDto, SortOrder, TimestampParam, TopicDataRequest,
    TopicDataResponse,
};
pub use error::{ApiError, ApiResult, PAGINATION_EXPIRED};
pub use service::{page_options, TopicDataService};
