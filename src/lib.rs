//! tickfeed-rs normalizes heterogeneous exchange REST APIs into a uniform
//! market-data feed: bounded order-book snapshots and deduplicated trades,
//! persisted under monotonically increasing sequence numbers.
//!
//! Venue variance (field names, numeric encodings, timestamp units, wire
//! ordering) is absorbed behind the [`market_data::adapters::ExchangeAdapter`]
//! contract; a resilient worker pair per instrument drives the polling.

pub mod config;
pub mod error;
pub mod instrument;
pub mod market_data;
pub mod persist;
pub mod telemetry;
pub mod transport;
