// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client-side call handle.
//!
//! An [`Rpc`] is created by [`Socket::alloc_rpc`] and owns one request/response
//! exchange. Its mutable state is shared with the socket's correlation table so
//! that [`Socket::poll`] can deliver the response from any thread.
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted --send--> InProgress --response--> Completed
//!                          |
//!                          +--request send failed--> Failed
//! ```
//!
//! A response that arrives wins over a later send failure; `Completed` is
//! never regressed.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, RpcError};
use crate::proto::{CallId, RequestHeader, HEADER_LEN};
use crate::socket::Socket;
use crate::transport::{InMessage, OutMessage, SendStatus, Transport};

/// Observable state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// No request has been sent yet.
    NotStarted,
    /// Request sent, no response yet.
    InProgress,
    /// Response arrived.
    Completed,
    /// Request could not be delivered and no response arrived.
    Failed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Shared call state
// ---------------------------------------------------------------------------

pub(crate) type SharedCall<T> = Arc<Mutex<CallState<T>>>;

/// Outcome of handing a response to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Accepted,
    Duplicate,
    /// The call has not sent its request yet.
    Unsent,
}

pub(crate) struct CallState<T: Transport> {
    call_id: CallId,
    request: Option<T::OutMessage>,
    response: Option<T::InMessage>,
    response_arrived: bool,
}

impl<T: Transport> CallState<T> {
    pub(crate) fn new(call_id: CallId) -> Self {
        Self {
            call_id,
            request: None,
            response: None,
            response_arrived: false,
        }
    }

    pub(crate) fn shared(call_id: CallId) -> SharedCall<T> {
        Arc::new(Mutex::new(Self::new(call_id)))
    }

    /// Store an inbound response (header still attached).
    ///
    /// Duplicates and responses for a call that never sent its request are
    /// discarded without touching the call.
    pub(crate) fn handle_response(&mut self, mut message: T::InMessage) -> Delivery {
        let Some(request) = self.request.as_mut() else {
            log::debug!("Response for unsent call {} discarded", self.call_id);
            return Delivery::Unsent;
        };
        if self.response_arrived {
            log::info!("Duplicate response for call {} discarded", self.call_id);
            return Delivery::Duplicate;
        }
        request.cancel();
        message.strip(HEADER_LEN);
        self.response = Some(message);
        self.response_arrived = true;
        Delivery::Accepted
    }

    pub(crate) fn status(&self) -> Status {
        let Some(request) = self.request.as_ref() else {
            return Status::NotStarted;
        };
        if self.response_arrived {
            return Status::Completed;
        }
        match request.status() {
            SendStatus::Failed | SendStatus::Canceled => Status::Failed,
            SendStatus::InProgress | SendStatus::Completed => Status::InProgress,
        }
    }

    /// Cancel a request still in flight. Used when the handle goes away.
    pub(crate) fn finalize(&mut self) {
        if let Some(request) = self.request.as_mut() {
            if request.status() == SendStatus::InProgress {
                request.cancel();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle for one outgoing call.
///
/// Dropping the handle removes the call from the socket's correlation table;
/// responses arriving afterwards are discarded as stale.
pub struct Rpc<'s, T: Transport> {
    socket: &'s Socket<T>,
    call_id: CallId,
    state: SharedCall<T>,
}

impl<'s, T: Transport> Rpc<'s, T> {
    pub(crate) fn new(socket: &'s Socket<T>, call_id: CallId, state: SharedCall<T>) -> Self {
        Self {
            socket,
            call_id,
            state,
        }
    }

    pub fn id(&self) -> CallId {
        self.call_id
    }

    /// Allocate an empty request message for [`send_message`](Self::send_message).
    pub fn alloc_request(&self) -> T::OutMessage {
        self.socket.transport().alloc()
    }

    /// Send `payload` as the request body to `destination`.
    pub fn send(&self, destination: &T::Address, payload: &[u8]) -> Result<()> {
        let mut message = self.alloc_request();
        message.append(payload);
        self.send_message(destination, message)
    }

    /// Send a request body built by the caller. The request header is
    /// prepended here.
    pub fn send_message(&self, destination: &T::Address, mut message: T::OutMessage) -> Result<()> {
        let stats = self.socket.stats_ref();
        let _timer = stats.client_timer();

        let mut state = self.state.lock();
        if state.request.is_some() {
            return Err(RpcError::AlreadySent(self.call_id));
        }

        let transport = self.socket.transport();
        let reply_address = transport.encode_address(&transport.local_address());
        message.prepend(&RequestHeader::new(self.call_id, reply_address).encode());

        let len = message.len();
        message.send(destination);
        state.request = Some(message);
        drop(state);

        stats.record_request_sent(len);
        log::trace!(
            "Call {} sent {} bytes to {:?}",
            self.call_id,
            len,
            destination
        );
        Ok(())
    }

    /// Take the response body. Returns `None` before arrival and on every call
    /// after the first successful one.
    pub fn receive(&self) -> Option<T::InMessage> {
        let _timer = self.socket.stats_ref().client_timer();
        self.state.lock().response.take()
    }

    /// Copy the response body out without taking it.
    pub fn response_bytes(&self) -> Option<Vec<u8>> {
        self.state.lock().response.as_ref().map(InMessage::to_vec)
    }

    pub fn check_status(&self) -> Status {
        self.state.lock().status()
    }

    /// Poll the socket until the call leaves `InProgress`.
    ///
    /// Spins without sleeping or timing out; a call that never completes and
    /// never fails keeps the caller here. A call that was never sent returns
    /// `NotStarted` at once.
    pub fn wait(&self) -> Status {
        loop {
            let status = self.check_status();
            if status != Status::InProgress {
                return status;
            }
            self.socket.poll();
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `max_polls` polls and
    /// returns the status at that point.
    pub fn wait_for_polls(&self, max_polls: usize) -> Status {
        for _ in 0..max_polls {
            let status = self.check_status();
            if status != Status::InProgress {
                return status;
            }
            self.socket.poll();
        }
        self.check_status()
    }
}

impl<T: Transport> Drop for Rpc<'_, T> {
    fn drop(&mut self) {
        self.socket.drop_rpc(self.call_id);
    }
}

impl<T: Transport> std::fmt::Debug for Rpc<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rpc")
            .field("call_id", &self.call_id)
            .field("status", &self.check_status())
            .finish()
    }
}
