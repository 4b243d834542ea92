//! # HTTP Gateway
//!
//! JSON API over the study assistant: material upload, listing and
//! deletion, study-plan generation, and per-session chat.

mod api;
mod server;
mod session;

pub use api::{ApiError, KEY_INVALID_MESSAGE};
pub use server::{GatewayState, SharedGateway, router, run};
pub use session::{SESSION_HEADER, SessionId};
