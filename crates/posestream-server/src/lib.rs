//! # posestream-server
//!
//! Axum WebSocket server streaming landmark results back to clients that
//! send video frames.
//!
//! - **Registry**: [`registry::ConnectionRegistry`] tracks live sessions by client id
//! - **Sessions**: [`session::ClientSession`] owns lifecycle, counters and sequencing
//! - **Processing**: [`processing::ProcessingLoop`] drains a drop-oldest queue
//!   through a dedicated detector thread
//! - **Codec**: [`codec`] decodes base64 frames and encodes result envelopes
//! - **Protocol**: [`protocol`] parses envelopes and dispatches them to the session
//! - **Transport**: [`websocket`] runs one task per connection with heartbeat
//! - **Server**: [`server::PosestreamServer`] wires routes, health and metrics

#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod health;
pub mod metrics;
pub mod processing;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use server::PosestreamServer;
