//! Conversation gateway.
//!
//! Hosts the HTTP + WebSocket surface, owns the session registry, and drives
//! each session's generate / synthesize / transmit pipeline with barge-in.

pub mod connection;
pub mod coordinator;
pub mod heartbeat;
pub mod lifecycle;
pub mod registry;
pub mod server;
pub mod state;
pub mod sweeper;

pub use registry::SessionRegistry;
pub use server::{router, serve, start_gateway};
pub use state::GatewayState;
