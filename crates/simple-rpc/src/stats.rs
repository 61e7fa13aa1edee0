// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-socket counters and timers.
//!
//! All updates are relaxed atomics; a [`StatsSnapshot`] is a best-effort view
//! and counters read in one snapshot are not mutually consistent under
//! concurrent traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time copy of a socket's statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsSnapshot {
    /// Bytes handed to the transport, headers included
    pub tx_bytes: u64,
    /// Bytes received from the transport, headers included
    pub rx_bytes: u64,
    /// Requests sent by local calls
    pub requests_sent: u64,
    /// Requests received and queued as tasks
    pub requests_received: u64,
    /// Replies sent by local tasks
    pub responses_sent: u64,
    /// Responses delivered to a waiting call
    pub responses_received: u64,
    /// Responses for calls no longer in the correlation table
    pub stale_responses: u64,
    /// Responses for calls that already had one
    pub duplicate_responses: u64,
    /// Messages dropped for bad version, unknown opcode or short header
    pub unexpected_messages: u64,
    /// Requests dropped because the pending queue was full
    pub rejected_requests: u64,
    /// Detached tasks finalized during poll
    pub tasks_reaped: u64,
    /// Time spent in call-side API operations
    pub client_api_ns: u64,
    /// Time spent in task-side API operations
    pub server_api_ns: u64,
    /// Time spent in polls that received or reaped something
    pub poll_active_ns: u64,
    /// Time spent in all polls
    pub poll_total_ns: u64,
}

/// Live statistics for one socket.
#[derive(Debug, Default)]
pub struct SocketStats {
    tx_bytes: AtomicU64,
    rx_bytes: AtomicU64,
    requests_sent: AtomicU64,
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    responses_received: AtomicU64,
    stale_responses: AtomicU64,
    duplicate_responses: AtomicU64,
    unexpected_messages: AtomicU64,
    rejected_requests: AtomicU64,
    tasks_reaped: AtomicU64,
    client_api_ns: AtomicU64,
    server_api_ns: AtomicU64,
    poll_active_ns: AtomicU64,
    poll_total_ns: AtomicU64,
    timers_enabled: bool,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl SocketStats {
    pub fn new(timers_enabled: bool) -> Self {
        Self {
            timers_enabled,
            ..Self::default()
        }
    }

    pub fn record_request_sent(&self, bytes: usize) {
        bump(&self.requests_sent, 1);
        bump(&self.tx_bytes, bytes as u64);
    }

    pub fn record_response_sent(&self, bytes: usize) {
        bump(&self.responses_sent, 1);
        bump(&self.tx_bytes, bytes as u64);
    }

    pub fn record_rx(&self, bytes: usize) {
        bump(&self.rx_bytes, bytes as u64);
    }

    pub fn record_request_received(&self) {
        bump(&self.requests_received, 1);
    }

    pub fn record_response_received(&self) {
        bump(&self.responses_received, 1);
    }

    pub fn record_stale(&self) {
        bump(&self.stale_responses, 1);
    }

    pub fn record_duplicate(&self) {
        bump(&self.duplicate_responses, 1);
    }

    pub fn record_unexpected(&self) {
        bump(&self.unexpected_messages, 1);
    }

    pub fn record_rejected(&self) {
        bump(&self.rejected_requests, 1);
    }

    pub fn record_reaped(&self, n: usize) {
        bump(&self.tasks_reaped, n as u64);
    }

    /// Start timing a call-side API operation. Time is added on drop.
    pub fn client_timer(&self) -> ScopedTimer<'_> {
        ScopedTimer::start(&self.client_api_ns, self.timers_enabled)
    }

    /// Start timing a task-side API operation. Time is added on drop.
    pub fn server_timer(&self) -> ScopedTimer<'_> {
        ScopedTimer::start(&self.server_api_ns, self.timers_enabled)
    }

    /// Start timing a poll; `active` polls are also counted separately.
    pub fn poll_start(&self) -> Option<Instant> {
        self.timers_enabled.then(Instant::now)
    }

    pub fn record_poll(&self, started: Option<Instant>, active: bool) {
        let Some(started) = started else {
            return;
        };
        let ns = nanos(started.elapsed());
        bump(&self.poll_total_ns, ns);
        if active {
            bump(&self.poll_active_ns, ns);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            tx_bytes: load(&self.tx_bytes),
            rx_bytes: load(&self.rx_bytes),
            requests_sent: load(&self.requests_sent),
            requests_received: load(&self.requests_received),
            responses_sent: load(&self.responses_sent),
            responses_received: load(&self.responses_received),
            stale_responses: load(&self.stale_responses),
            duplicate_responses: load(&self.duplicate_responses),
            unexpected_messages: load(&self.unexpected_messages),
            rejected_requests: load(&self.rejected_requests),
            tasks_reaped: load(&self.tasks_reaped),
            client_api_ns: load(&self.client_api_ns),
            server_api_ns: load(&self.server_api_ns),
            poll_active_ns: load(&self.poll_active_ns),
            poll_total_ns: load(&self.poll_total_ns),
        }
    }
}

/// Adds the elapsed time to a counter when dropped.
pub struct ScopedTimer<'a> {
    counter: &'a AtomicU64,
    started: Option<Instant>,
}

impl<'a> ScopedTimer<'a> {
    fn start(counter: &'a AtomicU64, enabled: bool) -> Self {
        Self {
            counter,
            started: enabled.then(Instant::now),
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        if let Some(started) = self.started {
            bump(self.counter, nanos(started.elapsed()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = SocketStats::new(false);
        stats.record_request_sent(52);
        stats.record_response_sent(46);
        stats.record_rx(10);
        stats.record_stale();
        stats.record_duplicate();
        stats.record_reaped(3);

        let snap = stats.snapshot();
        assert_eq!(snap.requests_sent, 1);
        assert_eq!(snap.responses_sent, 1);
        assert_eq!(snap.tx_bytes, 98);
        assert_eq!(snap.rx_bytes, 10);
        assert_eq!(snap.stale_responses, 1);
        assert_eq!(snap.duplicate_responses, 1);
        assert_eq!(snap.tasks_reaped, 3);
    }

    #[test]
    fn test_timers_disabled_stay_zero() {
        let stats = SocketStats::new(false);
        {
            let _t = stats.client_timer();
            std::thread::sleep(Duration::from_millis(1));
        }
        let started = stats.poll_start();
        assert!(started.is_none());
        stats.record_poll(started, true);

        let snap = stats.snapshot();
        assert_eq!(snap.client_api_ns, 0);
        assert_eq!(snap.poll_total_ns, 0);
    }

    #[test]
    fn test_timers_enabled_accumulate() {
        let stats = SocketStats::new(true);
        {
            let _t = stats.server_timer();
            std::thread::sleep(Duration::from_millis(1));
        }
        let started = stats.poll_start();
        std::thread::sleep(Duration::from_millis(1));
        stats.record_poll(started, false);

        let snap = stats.snapshot();
        assert!(snap.server_api_ns >= 1_000_000);
        assert!(snap.poll_total_ns >= 1_000_000);
        assert_eq!(snap.poll_active_ns, 0);
    }
}
