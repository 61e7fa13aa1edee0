// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Correlation engine.
//!
//! The [`Socket`] issues call ids, keeps the correlation table used to route
//! responses, queues inbound requests as tasks and keeps detached tasks until
//! their replies settle. It never spawns threads; all progress happens inside
//! [`Socket::poll`].
//!
//! # Locking
//!
//! One mutex guards the correlation table, the pending queue and the detached
//! collection. Each call's state has its own mutex. The socket lock is always
//! taken before a call lock, never the other way around.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::SocketConfig;
use crate::error::Result;
use crate::proto::{
    CallId, HeaderCommon, Opcode, RequestHeader, ResponseHeader, HEADER_LEN, PROTOCOL_VERSION,
};
use crate::rpc::{CallState, Delivery, Rpc, SharedCall};
use crate::stats::{SocketStats, StatsSnapshot};
use crate::task::{ServerTask, TaskState};
use crate::transport::{InMessage, Transport};

struct SocketInner<T: Transport> {
    /// Calls whose handles are still alive.
    calls: HashMap<CallId, SharedCall<T>>,
    /// Received requests in arrival order.
    pending: VecDeque<TaskState<T>>,
    /// Released tasks whose reply is still in flight.
    detached: Vec<TaskState<T>>,
}

/// RPC endpoint over a transport.
///
/// Handles returned by [`alloc_rpc`](Self::alloc_rpc) and
/// [`receive`](Self::receive) borrow the socket and cannot outlive it. The
/// socket is `Sync` when the transport is, so it can be shared between scoped
/// threads.
pub struct Socket<T: Transport> {
    transport: T,
    owner_id: u64,
    next_sequence: AtomicU64,
    inner: Mutex<SocketInner<T>>,
    config: SocketConfig,
    stats: SocketStats,
}

impl<T: Transport> Socket<T> {
    /// Create a socket with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::build(transport, SocketConfig::default())
    }

    /// Create a socket with a validated configuration.
    pub fn with_config(transport: T, config: SocketConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: T, config: SocketConfig) -> Self {
        let owner_id = transport.id();
        log::debug!("Socket {} created ({:?})", owner_id, config);
        Self {
            owner_id,
            next_sequence: AtomicU64::new(1),
            inner: Mutex::new(SocketInner {
                calls: HashMap::new(),
                pending: VecDeque::new(),
                detached: Vec::new(),
            }),
            stats: SocketStats::new(config.collect_timers),
            config,
            transport,
        }
    }

    // -----------------------------------------------------------------------
    // Application API
    // -----------------------------------------------------------------------

    /// Start a new call. The request is not sent until [`Rpc::send`].
    pub fn alloc_rpc(&self) -> Rpc<'_, T> {
        let _timer = self.stats.client_timer();
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let call_id = CallId::new(self.owner_id, sequence);
        let state = CallState::shared(call_id);
        self.inner.lock().calls.insert(call_id, Arc::clone(&state));
        Rpc::new(self, call_id, state)
    }

    /// Take the oldest received request, if any.
    pub fn receive(&self) -> Option<ServerTask<'_, T>> {
        let _timer = self.stats.server_timer();
        let state = self.inner.lock().pending.pop_front()?;
        Some(ServerTask::new(self, state))
    }

    /// Advance the transport, dispatch every available inbound message and
    /// reap detached tasks whose replies have settled. Never blocks.
    pub fn poll(&self) {
        let started = self.stats.poll_start();
        self.transport.poll();

        let mut active = false;
        while let Some(message) = self.transport.receive() {
            active = true;
            self.dispatch(message);
        }
        if self.reap_detached() > 0 {
            active = true;
        }

        self.stats.record_poll(started, active);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Owner id stamped into every call id this socket issues.
    pub fn owner_id(&self) -> u64 {
        self.owner_id
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn stats_ref(&self) -> &SocketStats {
        &self.stats
    }

    /// Calls whose handles are still alive.
    pub fn outstanding_rpcs(&self) -> usize {
        self.inner.lock().calls.len()
    }

    /// Received requests not yet taken by [`receive`](Self::receive).
    pub fn pending_tasks(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Released tasks waiting for their reply to settle.
    pub fn detached_tasks(&self) -> usize {
        self.inner.lock().detached.len()
    }

    // -----------------------------------------------------------------------
    // Handle release
    // -----------------------------------------------------------------------

    /// Remove a call from the correlation table and finalize it.
    pub(crate) fn drop_rpc(&self, call_id: CallId) {
        let removed = self.inner.lock().calls.remove(&call_id);
        match removed {
            Some(state) => state.lock().finalize(),
            None => log::debug!("Call {} released but not in correlation table", call_id),
        }
    }

    /// Take back a released task. Finalized at once unless its reply is still
    /// in flight, in which case it is detached until a later poll.
    pub(crate) fn remand_task(&self, mut state: TaskState<T>) {
        if !state.poll() {
            state.finalize();
            return;
        }
        log::debug!(
            "Task for call {} detached with reply in flight",
            state.call_id()
        );
        state.detach();
        self.inner.lock().detached.push(state);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn dispatch(&self, message: T::InMessage) {
        self.stats.record_rx(message.len());

        let mut buf = [0u8; HEADER_LEN];
        let n = message.get(0, &mut buf);
        let header = &buf[..n];

        let common = match HeaderCommon::decode(header) {
            Ok(common) => common,
            Err(e) => {
                log::warn!("Dropping inbound message: {}", e);
                self.stats.record_unexpected();
                return;
            }
        };
        if common.version != PROTOCOL_VERSION {
            log::warn!(
                "Dropping inbound message with protocol version {} (expected {})",
                common.version,
                PROTOCOL_VERSION
            );
            self.stats.record_unexpected();
            return;
        }

        match common.opcode {
            Opcode::Request => self.handle_request(header, message),
            Opcode::Response => self.handle_response(header, message),
            Opcode::Manifest | Opcode::Invalid | Opcode::Unknown(_) => {
                log::warn!("Unexpected protocol message received.");
                self.stats.record_unexpected();
            }
        }
    }

    fn handle_request(&self, header: &[u8], mut message: T::InMessage) {
        let header = match RequestHeader::decode(header) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("Dropping request: {}", e);
                self.stats.record_unexpected();
                return;
            }
        };

        let reply_address = self.transport.decode_address(&header.reply_address);
        message.strip(HEADER_LEN);

        let mut inner = self.inner.lock();
        if let Some(max) = self.config.max_pending_tasks {
            if inner.pending.len() >= max {
                drop(inner);
                log::warn!(
                    "Pending task queue full ({}), dropping request for call {}",
                    max,
                    header.call_id
                );
                self.stats.record_rejected();
                return;
            }
        }
        inner
            .pending
            .push_back(TaskState::new(header.call_id, message, reply_address));
        drop(inner);

        self.stats.record_request_received();
    }

    fn handle_response(&self, header: &[u8], message: T::InMessage) {
        let header = match ResponseHeader::decode(header) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("Dropping response: {}", e);
                self.stats.record_unexpected();
                return;
            }
        };

        let inner = self.inner.lock();
        let delivered = inner
            .calls
            .get(&header.call_id)
            .map(|call| call.lock().handle_response(message));
        drop(inner);

        match delivered {
            Some(Delivery::Accepted) => self.stats.record_response_received(),
            Some(Delivery::Duplicate) => self.stats.record_duplicate(),
            Some(Delivery::Unsent) => self.stats.record_stale(),
            None => {
                log::debug!("Discarding response for unknown call {}", header.call_id);
                self.stats.record_stale();
            }
        }
    }

    fn reap_detached(&self) -> usize {
        let done: Vec<TaskState<T>> = {
            let mut inner = self.inner.lock();
            if inner.detached.is_empty() {
                return 0;
            }
            let (done, live): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.detached)
                .into_iter()
                .partition(|task| !task.poll());
            inner.detached = live;
            done
        };

        let n = done.len();
        for task in done {
            debug_assert!(task.is_detached());
            log::debug!("Reaped detached task for call {}", task.call_id());
            task.finalize();
        }
        self.stats.record_reaped(n);
        n
    }
}

impl<T: Transport> Drop for Socket<T> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let pending = std::mem::take(&mut inner.pending);
        let detached = std::mem::take(&mut inner.detached);
        if !pending.is_empty() || !detached.is_empty() {
            log::debug!(
                "Socket {} dropped with {} pending and {} detached tasks",
                self.owner_id,
                pending.len(),
                detached.len()
            );
        }
        for task in pending.into_iter().chain(detached) {
            task.finalize();
        }
    }
}

impl<T: Transport> std::fmt::Debug for Socket<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("owner_id", &self.owner_id)
            .field("outstanding_rpcs", &self.outstanding_rpcs())
            .field("pending_tasks", &self.pending_tasks())
            .field("detached_tasks", &self.detached_tasks())
            .finish()
    }
}
