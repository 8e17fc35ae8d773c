//! Heartbeat Manager
//!
//! Keeps a feed connection honest: pings on an interval and reports a
//! timeout when nothing at all has arrived for too long. A connection that
//! goes silent without a close frame is otherwise never noticed.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping messages. Zero disables the heartbeat.
    pub ping_interval: Duration,
    /// Silence after which the connection is considered dead.
    pub idle_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, idle_timeout: Duration) -> Self {
        Self {
            ping_interval,
            idle_timeout,
        }
    }

    /// Configuration that never pings or times out.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            ping_interval: Duration::ZERO,
            idle_timeout: Duration::ZERO,
        }
    }

    /// Whether the heartbeat should run.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.ping_interval.is_zero()
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Request to send a ping frame.
    SendPing,
    /// Idle timeout exceeded, connection should be restarted.
    Timeout,
}

/// Last-activity clock shared between the manager and the receive loop.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: Mutex<Instant>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Record that a frame of any kind was received.
    pub fn record_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last received frame.
    #[must_use]
    pub fn time_since_activity(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// Heartbeat manager that monitors connection health.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the heartbeat monitoring loop until cancelled or a timeout is sent.
    pub async fn run(self) {
        if !self.config.is_enabled() {
            return;
        }

        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if !self.check_and_ping().await {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `false` once the loop should exit.
    async fn check_and_ping(&self) -> bool {
        let idle = self.state.time_since_activity();
        if !self.config.idle_timeout.is_zero() && idle > self.config.idle_timeout {
            tracing::warn!(
                idle_secs = idle.as_secs(),
                timeout_secs = self.config.idle_timeout.as_secs(),
                "Heartbeat timeout detected"
            );
            let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
            return false;
        }

        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::debug!("Event channel closed, stopping heartbeat");
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert!(config.is_enabled());
        assert!(!HeartbeatConfig::disabled().is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_idle_clock() {
        let state = HeartbeatState::new();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(state.time_since_activity() >= Duration::from_secs(10));

        state.record_activity();
        assert!(state.time_since_activity() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn manager_sends_ping_events() {
        let config = HeartbeatConfig::new(Duration::from_secs(1), Duration::from_secs(60));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatManager::new(config, state, event_tx, cancel.clone()).run(),
        );

        let event = event_rx.recv().await.expect("channel should not close");
        assert_eq!(event, HeartbeatEvent::SendPing);

        cancel.cancel();
        handle.await.expect("task should complete");
    }

    #[tokio::test(start_paused = true)]
    async fn manager_detects_idle_timeout() {
        let config = HeartbeatConfig::new(Duration::from_secs(1), Duration::from_secs(3));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatManager::new(config, state, event_tx, cancel.clone()).run(),
        );

        let mut received_timeout = false;
        while let Some(event) = event_rx.recv().await {
            if event == HeartbeatEvent::Timeout {
                received_timeout = true;
                break;
            }
        }

        assert!(received_timeout, "should receive timeout event");
        handle.await.expect("manager should exit after timeout");
    }

    #[tokio::test]
    async fn disabled_manager_returns_immediately() {
        let (event_tx, _event_rx) = mpsc::channel(1);
        let manager = HeartbeatManager::new(
            HeartbeatConfig::disabled(),
            Arc::new(HeartbeatState::new()),
            event_tx,
            CancellationToken::new(),
        );

        let result = tokio::time::timeout(Duration::from_millis(100), manager.run()).await;
        assert!(result.is_ok());
    }
}
