//! Delivery-side collaborator traits.
//!
//! The pipeline is transport-agnostic: it hands a serialized batch payload
//! to an injected [`Transport`] and only distinguishes success from failure.
//! HTTP semantics, endpoint URLs, and request timeouts all live behind the
//! trait, supplied by the embedding application.

use async_trait::async_trait;
use thiserror::Error;

/// Errors a transport can report for one delivery attempt.
///
/// The flush coordinator treats every variant identically (log and retry on
/// the next tick); the split exists so transports can report what happened.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never completed (connection refused, timeout, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// The collection endpoint answered with a non-success status.
    #[error("endpoint rejected batch: {0}")]
    Rejected(String),
}

/// Sends one serialized batch payload to the collection endpoint.
///
/// Implementations must bound their own request time; the coordinator does
/// not impose a timeout on top.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &str) -> Result<(), TransportError>;
}

/// Reports whether the collection endpoint is currently reachable.
///
/// Checked at the top of every flush cycle; unreachable is a normal
/// precondition, not an error, and simply defers the cycle.
pub trait ConnectivityOracle: Send + Sync {
    fn is_reachable(&self) -> bool;
}
