//! Batch delivery of queued events.
//!
//! A fixed-interval [`FlushScheduler`] emits ticks; the [`FlushCoordinator`]
//! turns each tick into one flush cycle against the durable queue. Failed
//! deliveries stay queued and retry on the next tick; a cycle that finds the
//! queue empty stops the scheduler until new events arrive.

pub mod coordinator;
pub mod scheduler;
pub mod transport;

pub use coordinator::FlushCoordinator;
pub use scheduler::{DEFAULT_FLUSH_INTERVAL, FlushScheduler};
pub use transport::{ConnectivityOracle, Transport, TransportError};
