//! Relay pipeline components.
//!
//! ## Flow
//!
//! ```text
//! client → Dispatcher (store correlation, enqueue) → QueueBackend
//!        → RelayWorker → processing endpoint
//!        → StatusRelay (correlation lookup, merge) → status / reply destinations
//!
//! inbound payload → InboundGateway → first destination → second destination
//! ```

pub mod dispatcher;
pub mod gateway;
pub mod status;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use gateway::{ForwardResult, ForwardStatus, InboundFailure, InboundGateway, InboundResponse};
pub use status::{StatusOutcome, StatusRelay};
pub use worker::RelayWorker;
