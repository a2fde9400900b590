//! Heartbeat ping/pong liveness monitoring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Liveness flags for one connection, shared by the reader and the monitor.
#[derive(Debug)]
pub struct Liveness {
    alive: AtomicBool,
    last_seen: Mutex<Instant>,
}

impl Liveness {
    /// A freshly connected client counts as alive.
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Record a pong or any other inbound traffic.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the client was heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the client was last heard from.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Watch a connection's liveness.
///
/// At each `interval` tick the alive flag is checked and reset. After
/// `timeout / interval` consecutive silent ticks (at least one) the client is
/// considered dead.
pub async fn run_heartbeat(
    liveness: Arc<Liveness>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    // first tick completes immediately
    let _ = ticker.tick().await;
    let interval_ms = interval.as_millis().max(1);
    let max_missed = u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if liveness.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled() {
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(async move {
            run_heartbeat(
                Arc::new(Liveness::new()),
                Duration::from_secs(100),
                Duration::from_secs(300),
                cancel2,
            )
            .await
        });
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let liveness = Arc::new(Liveness::new());
        let _ = liveness.check_alive();
        let result = run_heartbeat(
            liveness,
            Duration::from_millis(100),
            Duration::from_millis(300),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_intervals_respected() {
        // 3 missed 100 ms ticks, not 3 seconds
        let liveness = Arc::new(Liveness::new());
        let _ = liveness.check_alive();
        let started = time::Instant::now();
        let _ = run_heartbeat(
            liveness,
            Duration::from_millis(100),
            Duration::from_millis(300),
            CancellationToken::new(),
        )
        .await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn chatty_client_stays_alive() {
        let liveness = Arc::new(Liveness::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            liveness.clone(),
            Duration::from_millis(50),
            Duration::from_millis(100),
            cancel.clone(),
        ));
        for _ in 0..10 {
            time::sleep(Duration::from_millis(20)).await;
            liveness.mark_alive();
        }
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[test]
    fn check_alive_resets_flag() {
        let liveness = Liveness::new();
        assert!(liveness.check_alive());
        assert!(!liveness.check_alive());
        liveness.mark_alive();
        assert!(liveness.check_alive());
    }

    #[test]
    fn last_seen_tracks_activity() {
        let liveness = Liveness::new();
        std::thread::sleep(Duration::from_millis(10));
        let before = liveness.last_seen_elapsed();
        liveness.mark_alive();
        assert!(liveness.last_seen_elapsed() < before);
    }
}
