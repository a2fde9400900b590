//! WebSocket transport: per-connection session task and heartbeat monitor.

pub mod heartbeat;
pub mod transport;

pub use heartbeat::{HeartbeatResult, Liveness, run_heartbeat};
pub use transport::run_ws_session;
