//! Shared data model and wire types for the order-lifecycle service.
//!
//! Mirrors `mqk-schemas`'s role in the teacher workspace: a dependency-free
//! (beyond serde/chrono/uuid) crate that every other crate in this workspace
//! depends on for its shapes, so the DB layer, the relay, the API, and the
//! consumer all agree on one definition of an order, an outbox row, and an
//! event payload.

pub mod envelope;
pub mod events;
pub mod order;

pub use envelope::{EventEnvelope, EventType, UnknownEventType};
pub use events::{
    parse, EventPayload, EventSchemaError, OrderCancelledData, OrderConfirmedData, OrderCreatedData,
    OrderItemSnapshot, OrderShippedData, UserCreatedData, UserDeletedData, UserUpdatedData,
};
pub use order::{Order, OrderItem, OrderStatus};
