//! Axum-facing server plumbing: shared [`ApiState`], the system router
//! (health check), and the handful of utoipa wiring every feature slice's
//! own router builds on top of.

pub mod health;
pub mod router;
pub mod state;

pub use state::{ApiState, ApiStateBuilder, ApiStateError};
