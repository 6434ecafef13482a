//! The standalone outbox relay process (spec.md §6.7: independently
//! scalable from the API process). `main.rs` is the thin entry point;
//! `worker` holds the actual drain loop.

pub mod metrics;
pub mod worker;

pub use worker::RelayWorker;
