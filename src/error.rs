//! Error types for the feed pipeline.

use serde_json::Value;
use thiserror::Error;

use crate::instrument::InstrumentId;

#[derive(Error, Debug)]
pub enum FeedError {
    /// Network or protocol failure reaching the exchange.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The exchange answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Required fields missing or unparseable in an otherwise successful
    /// response. Carries an echo of the offending payload for diagnosis.
    #[error("malformed response from {exchange}:{instrument}: {detail}; payload: {payload}")]
    Malformed {
        exchange: String,
        instrument: String,
        detail: String,
        payload: String,
    },

    /// Failure in the persistence sink.
    #[error("persistence error: {0}")]
    Database(#[from] sqlx::Error),
}

impl FeedError {
    pub fn malformed(instrument: &InstrumentId, detail: impl Into<String>, payload: &Value) -> Self {
        FeedError::Malformed {
            exchange: instrument.exchange.clone(),
            instrument: instrument.name.clone(),
            detail: detail.into(),
            payload: payload.to_string(),
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
