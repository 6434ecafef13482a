//! The order-lifecycle HTTP API: request/response DTOs, shared state, and
//! the Axum router. `main.rs` also spawns the lifecycle processor and the
//! event consumer as background tasks in this same process (spec.md §6.7:
//! API + processor + consumer are one deployable, the relay is another).

pub mod api_types;
pub mod metrics;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
