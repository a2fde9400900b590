//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle that renders `/metrics`. Call once at startup, before
/// any metric is recorded; a second call fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections refused at upgrade (counter, labels: reason).
pub const WS_REJECTIONS_TOTAL: &str = "ws_rejections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Frames accepted into a session queue (counter).
pub const FRAMES_RECEIVED_TOTAL: &str = "frames_received_total";
/// Frames discarded (counter, labels: reason = backpressure | decode).
pub const FRAMES_DROPPED_TOTAL: &str = "frames_dropped_total";
/// Frames that went through detection (counter).
pub const FRAMES_PROCESSED_TOTAL: &str = "frames_processed_total";
/// Dequeue-to-result latency (histogram).
pub const FRAME_PROCESSING_SECONDS: &str = "frame_processing_seconds";
/// Detectors that became unusable (counter).
pub const DETECTOR_FAILURES_TOTAL: &str = "detector_failures_total";
/// Broadcast deliveries that failed (counter).
pub const BROADCAST_FAILURES_TOTAL: &str = "broadcast_failures_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_from_local_recorder() {
        // Local recorder; the global one can only be installed once per process.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(FRAMES_RECEIVED_TOTAL).increment(3);
        });
        let output = render(&handle);
        assert!(output.contains("frames_received_total 3"), "{output}");
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_REJECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            FRAMES_RECEIVED_TOTAL,
            FRAMES_DROPPED_TOTAL,
            FRAMES_PROCESSED_TOTAL,
            FRAME_PROCESSING_SECONDS,
            DETECTOR_FAILURES_TOTAL,
            BROADCAST_FAILURES_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
