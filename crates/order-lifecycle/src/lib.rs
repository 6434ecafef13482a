//! Background workers for the order-lifecycle service: the periodic
//! pending/confirmed sweep (`processor`) and the idempotent user-event
//! consumer (`consumer`). Both are run as tasks spawned by `order-api`'s
//! binary, not standalone processes — spec.md §4.5/§4.6 describe them as
//! part of the same service as the HTTP API.

pub mod consumer;
pub mod metrics;
pub mod processor;

pub use consumer::Consumer;
pub use metrics::TaskLiveness;
pub use processor::{Processor, ProcessorTopics};
