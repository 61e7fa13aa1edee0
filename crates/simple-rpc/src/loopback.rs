// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process reliable transport.
//!
//! A [`LoopbackNetwork`] is a registry of endpoints; each [`LoopbackTransport`]
//! owns one endpoint with a lock-free inbox. Payloads are delivered to the
//! destination inbox as soon as they are sent, while the sender observes the
//! send as `InProgress` until its own transport is polled. This mirrors a real
//! transport closely enough to exercise detached-task reaping.
//!
//! Test controls:
//! - [`LoopbackTransport::hold_completions`] keeps sends in flight across polls
//! - [`LoopbackTransport::fail_sends_to`] makes sends to one address fail
//! - [`LoopbackTransport::abandon_inbound`] marks delivered requests as
//!   abandoned by their senders

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam::queue::SegQueue;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;

use crate::transport::{InMessage, OutMessage, SendStatus, Transport, WireAddress};

/// Tag byte leading every encoded loopback address.
const ADDRESS_TAG: u8 = 0x4C;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Address of a loopback endpoint. Equal to the endpoint id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopbackAddress(pub u64);

impl LoopbackAddress {
    /// Address that no endpoint ever owns.
    pub const UNREACHABLE: Self = Self(0);
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

struct Endpoint {
    inbox: SegQueue<LoopbackInMessage>,
    in_flight: Mutex<Vec<Arc<SendSlot>>>,
    delivered: Mutex<Vec<Weak<AtomicBool>>>,
    failing: DashSet<u64>,
    hold: AtomicBool,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            inbox: SegQueue::new(),
            in_flight: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            failing: DashSet::new(),
            hold: AtomicBool::new(false),
        }
    }

    fn deliver(&self, data: Vec<u8>) {
        let dropped = Arc::new(AtomicBool::new(false));
        {
            let mut delivered = self.delivered.lock();
            delivered.retain(|w| w.strong_count() > 0);
            delivered.push(Arc::downgrade(&dropped));
        }
        self.inbox.push(LoopbackInMessage {
            data,
            offset: 0,
            dropped,
        });
    }
}

struct NetworkInner {
    endpoints: DashMap<u64, Arc<Endpoint>>,
    next_id: AtomicU64,
}

/// Registry of in-process endpoints.
#[derive(Clone)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                endpoints: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a new endpoint and return its transport.
    pub fn endpoint(&self) -> LoopbackTransport {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let endpoint = Arc::new(Endpoint::new());
        self.inner.endpoints.insert(id, Arc::clone(&endpoint));
        LoopbackTransport {
            network: Arc::clone(&self.inner),
            endpoint,
            id,
        }
    }

    /// Number of live endpoints.
    pub fn len(&self) -> usize {
        self.inner.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.endpoints.is_empty()
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One endpoint on a [`LoopbackNetwork`].
///
/// Dropping the transport unregisters the endpoint; later sends to its address
/// fail.
pub struct LoopbackTransport {
    network: Arc<NetworkInner>,
    endpoint: Arc<Endpoint>,
    id: u64,
}

impl LoopbackTransport {
    pub fn address(&self) -> LoopbackAddress {
        LoopbackAddress(self.id)
    }

    /// While set, `poll` leaves every in-flight send `InProgress`.
    pub fn hold_completions(&self, hold: bool) {
        self.endpoint.hold.store(hold, Ordering::Release);
    }

    /// Make every later send from this endpoint to `dest` settle as `Failed`.
    pub fn fail_sends_to(&self, dest: LoopbackAddress) {
        self.endpoint.failing.insert(dest.0);
    }

    /// Mark every message delivered to this endpoint as abandoned by its sender.
    pub fn abandon_inbound(&self) {
        let delivered = self.endpoint.delivered.lock();
        for flag in delivered.iter().filter_map(Weak::upgrade) {
            flag.store(true, Ordering::Release);
        }
    }

    /// Messages waiting in the inbox.
    pub fn inbox_len(&self) -> usize {
        self.endpoint.inbox.len()
    }

    /// Sends not yet settled by `poll`.
    pub fn in_flight(&self) -> usize {
        self.endpoint.in_flight.lock().len()
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.network.endpoints.remove(&self.id);
    }
}

impl Transport for LoopbackTransport {
    type Address = LoopbackAddress;
    type OutMessage = LoopbackOutMessage;
    type InMessage = LoopbackInMessage;

    fn id(&self) -> u64 {
        self.id
    }

    fn local_address(&self) -> LoopbackAddress {
        self.address()
    }

    fn alloc(&self) -> LoopbackOutMessage {
        LoopbackOutMessage {
            data: Vec::new(),
            slot: None,
            network: Arc::clone(&self.network),
            origin: Arc::clone(&self.endpoint),
        }
    }

    fn receive(&self) -> Option<LoopbackInMessage> {
        self.endpoint.inbox.pop()
    }

    fn poll(&self) {
        if self.endpoint.hold.load(Ordering::Acquire) {
            return;
        }
        let settled: Vec<Arc<SendSlot>> = std::mem::take(&mut *self.endpoint.in_flight.lock());
        for slot in settled {
            slot.settle();
        }
    }

    fn encode_address(&self, address: &LoopbackAddress) -> WireAddress {
        let mut buf = [0u8; 9];
        buf[0] = ADDRESS_TAG;
        buf[1..9].copy_from_slice(&address.0.to_le_bytes());
        WireAddress::from_slice(&buf)
    }

    fn decode_address(&self, wire: &WireAddress) -> LoopbackAddress {
        let bytes = wire.as_bytes();
        if bytes[0] != ADDRESS_TAG {
            return LoopbackAddress::UNREACHABLE;
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&bytes[1..9]);
        LoopbackAddress(u64::from_le_bytes(id))
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

struct SendSlot {
    status: Mutex<SendStatus>,
    outcome: SendStatus,
}

impl SendSlot {
    fn settle(&self) {
        let mut status = self.status.lock();
        if *status == SendStatus::InProgress {
            *status = self.outcome;
        }
    }
}

/// Outbound loopback message.
pub struct LoopbackOutMessage {
    data: Vec<u8>,
    slot: Option<Arc<SendSlot>>,
    network: Arc<NetworkInner>,
    origin: Arc<Endpoint>,
}

impl OutMessage for LoopbackOutMessage {
    type Address = LoopbackAddress;

    fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn prepend(&mut self, bytes: &[u8]) {
        self.data.splice(0..0, bytes.iter().copied());
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn send(&mut self, destination: &LoopbackAddress) {
        let target = self
            .network
            .endpoints
            .get(&destination.0)
            .map(|e| Arc::clone(e.value()));

        let outcome = match target {
            Some(endpoint) if !self.origin.failing.contains(&destination.0) => {
                endpoint.deliver(self.data.clone());
                SendStatus::Completed
            }
            _ => SendStatus::Failed,
        };

        let slot = Arc::new(SendSlot {
            status: Mutex::new(SendStatus::InProgress),
            outcome,
        });
        self.origin.in_flight.lock().push(Arc::clone(&slot));
        self.slot = Some(slot);
    }

    fn cancel(&mut self) {
        if let Some(slot) = &self.slot {
            let mut status = slot.status.lock();
            if *status == SendStatus::InProgress {
                *status = SendStatus::Canceled;
            }
        }
    }

    /// Unsent messages report `InProgress`.
    fn status(&self) -> SendStatus {
        self.slot
            .as_ref()
            .map_or(SendStatus::InProgress, |slot| *slot.status.lock())
    }
}

/// Inbound loopback message.
pub struct LoopbackInMessage {
    data: Vec<u8>,
    offset: usize,
    dropped: Arc<AtomicBool>,
}

impl InMessage for LoopbackInMessage {
    fn len(&self) -> usize {
        self.data.len() - self.offset
    }

    fn get(&self, offset: usize, buf: &mut [u8]) -> usize {
        let start = self.offset.saturating_add(offset).min(self.data.len());
        let src = &self.data[start..];
        let n = src.len().min(buf.len());
        buf[..n].copy_from_slice(&src[..n]);
        n
    }

    fn strip(&mut self, n: usize) {
        self.offset = self.offset.saturating_add(n).min(self.data.len());
    }

    fn dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_settles_on_poll() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint();
        let b = net.endpoint();

        let mut msg = a.alloc();
        msg.append(b"world");
        msg.prepend(b"hello ");
        msg.send(&b.address());
        assert_eq!(msg.status(), SendStatus::InProgress);
        assert_eq!(b.inbox_len(), 1);

        a.poll();
        assert_eq!(msg.status(), SendStatus::Completed);

        let received = b.receive().unwrap();
        assert_eq!(received.to_vec(), b"hello world");
        assert!(b.receive().is_none());
    }

    #[test]
    fn test_unknown_destination_fails() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint();

        let mut msg = a.alloc();
        msg.append(&[1, 2, 3]);
        msg.send(&LoopbackAddress::UNREACHABLE);
        a.poll();
        assert_eq!(msg.status(), SendStatus::Failed);
    }

    #[test]
    fn test_fail_sends_to_and_hold() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint();
        let b = net.endpoint();
        a.fail_sends_to(b.address());
        a.hold_completions(true);

        let mut msg = a.alloc();
        msg.send(&b.address());
        a.poll();
        assert_eq!(msg.status(), SendStatus::InProgress);
        assert_eq!(a.in_flight(), 1);
        assert_eq!(b.inbox_len(), 0);

        a.hold_completions(false);
        a.poll();
        assert_eq!(msg.status(), SendStatus::Failed);
        assert_eq!(a.in_flight(), 0);
    }

    #[test]
    fn test_cancel_in_flight() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint();
        let b = net.endpoint();

        let mut msg = a.alloc();
        msg.send(&b.address());
        msg.cancel();
        a.poll();
        assert_eq!(msg.status(), SendStatus::Canceled);
    }

    #[test]
    fn test_address_encoding() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint();
        let wire = a.encode_address(&LoopbackAddress(0xDEAD_BEEF));
        assert_eq!(wire.as_bytes()[0], ADDRESS_TAG);
        assert_eq!(a.decode_address(&wire), LoopbackAddress(0xDEAD_BEEF));
        assert_eq!(
            a.decode_address(&WireAddress::default()),
            LoopbackAddress::UNREACHABLE
        );
    }

    #[test]
    fn test_strip_and_abandon() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint();
        let b = net.endpoint();

        let mut msg = a.alloc();
        msg.append(b"abcdef");
        msg.send(&b.address());

        let mut received = b.receive().unwrap();
        received.strip(2);
        assert_eq!(received.len(), 4);
        assert_eq!(received.to_vec(), b"cdef");
        received.strip(100);
        assert!(received.is_empty());

        assert!(!received.dropped());
        b.abandon_inbound();
        assert!(received.dropped());
    }

    #[test]
    fn test_endpoint_unregisters_on_drop() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint();
        let b = net.endpoint();
        let b_addr = b.address();
        assert_eq!(net.len(), 2);
        drop(b);
        assert_eq!(net.len(), 1);

        let mut msg = a.alloc();
        msg.send(&b_addr);
        a.poll();
        assert_eq!(msg.status(), SendStatus::Failed);
    }
}
