//! HTTP boundary for TrafficLink.
//!
//! Thin axum layer over the device, preference and command services. All
//! error-to-HTTP translation happens in [`models::error`].

pub mod handlers;
pub mod models;
pub mod server;
pub mod shutdown;

pub use server::{create_router, run, ServerState};
