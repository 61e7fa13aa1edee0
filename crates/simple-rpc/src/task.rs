// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-side task handle.
//!
//! A [`ServerTask`] wraps one inbound request. The task state is owned: it
//! sits in the socket's pending queue until [`Socket::receive`] moves it into
//! a handle, and moves back to the socket when the handle is dropped. A task
//! whose reply is still in flight at that point is kept by the socket
//! (detached) until the send settles.

use crate::error::{Result, RpcError};
use crate::proto::{CallId, ResponseHeader};
use crate::socket::Socket;
use crate::transport::{InMessage, OutMessage, SendStatus, Transport};

pub(crate) struct TaskState<T: Transport> {
    call_id: CallId,
    request: T::InMessage,
    reply_address: T::Address,
    response: Option<T::OutMessage>,
    detached: bool,
}

impl<T: Transport> TaskState<T> {
    /// `request` must already have its header stripped.
    pub(crate) fn new(call_id: CallId, request: T::InMessage, reply_address: T::Address) -> Self {
        Self {
            call_id,
            request,
            reply_address,
            response: None,
            detached: false,
        }
    }

    pub(crate) fn call_id(&self) -> CallId {
        self.call_id
    }

    /// True only while a reply send is in flight for a request its sender
    /// still wants.
    pub(crate) fn poll(&self) -> bool {
        if self.request.dropped() {
            return false;
        }
        match &self.response {
            None => false,
            Some(response) => !response.status().is_settled(),
        }
    }

    pub(crate) fn detach(&mut self) {
        self.detached = true;
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached
    }

    /// Release the task. A reply still in flight for an abandoned request is
    /// canceled.
    pub(crate) fn finalize(mut self) {
        if let Some(response) = self.response.as_mut() {
            if response.status() == SendStatus::InProgress {
                response.cancel();
            }
        }
    }
}

/// Handle for one inbound request.
pub struct ServerTask<'s, T: Transport> {
    socket: &'s Socket<T>,
    state: Option<TaskState<T>>,
}

impl<'s, T: Transport> ServerTask<'s, T> {
    pub(crate) fn new(socket: &'s Socket<T>, state: TaskState<T>) -> Self {
        Self {
            socket,
            state: Some(state),
        }
    }

    fn state(&self) -> &TaskState<T> {
        match &self.state {
            Some(state) => state,
            None => unreachable!("task state is only taken on drop"),
        }
    }

    fn state_mut(&mut self) -> &mut TaskState<T> {
        match &mut self.state {
            Some(state) => state,
            None => unreachable!("task state is only taken on drop"),
        }
    }

    /// Id of the call this request belongs to.
    pub fn call_id(&self) -> CallId {
        self.state().call_id
    }

    /// Request body, header stripped.
    pub fn request(&self) -> &T::InMessage {
        &self.state().request
    }

    pub fn request_bytes(&self) -> Vec<u8> {
        self.state().request.to_vec()
    }

    /// Where the reply will be sent.
    pub fn reply_address(&self) -> &T::Address {
        &self.state().reply_address
    }

    /// True once a reply has been handed to the transport.
    pub fn has_replied(&self) -> bool {
        self.state().response.is_some()
    }

    /// Allocate an empty reply message for [`reply_message`](Self::reply_message).
    pub fn alloc_out_message(&self) -> T::OutMessage {
        self.socket.transport().alloc()
    }

    /// Send `payload` back to the caller.
    pub fn reply(&mut self, payload: &[u8]) -> Result<()> {
        let mut message = self.alloc_out_message();
        message.append(payload);
        self.reply_message(message)
    }

    /// Send a reply body built by the caller. The response header is
    /// prepended here.
    pub fn reply_message(&mut self, mut message: T::OutMessage) -> Result<()> {
        let socket = self.socket;
        let _timer = socket.stats_ref().server_timer();

        let state = self.state_mut();
        if state.response.is_some() {
            return Err(RpcError::AlreadyReplied(state.call_id));
        }

        message.prepend(&ResponseHeader::new(state.call_id).encode());
        let len = message.len();
        message.send(&state.reply_address);
        log::trace!(
            "Call {} replied {} bytes to {:?}",
            state.call_id,
            len,
            state.reply_address
        );
        state.response = Some(message);

        socket.stats_ref().record_response_sent(len);
        Ok(())
    }

    /// Send status of the reply, if one was sent.
    pub fn reply_status(&self) -> Option<SendStatus> {
        self.state().response.as_ref().map(OutMessage::status)
    }
}

impl<T: Transport> Drop for ServerTask<'_, T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.socket.remand_task(state);
        }
    }
}

impl<T: Transport> std::fmt::Debug for ServerTask<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerTask")
            .field("call_id", &self.call_id())
            .field("reply_address", self.reply_address())
            .field("replied", &self.has_replied())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackNetwork, LoopbackTransport};

    #[test]
    fn test_task_poll_states() {
        let net = LoopbackNetwork::new();
        let server = net.endpoint();
        let client = net.endpoint();

        let mut msg = client.alloc();
        msg.append(b"req");
        msg.send(&server.address());
        let request = server.receive().unwrap();

        let mut state =
            TaskState::<LoopbackTransport>::new(CallId::new(9, 1), request, client.address());
        // no reply yet
        assert!(!state.poll());

        let mut reply = server.alloc();
        reply.send(&client.address());
        state.response = Some(reply);
        assert!(state.poll());

        server.poll();
        assert!(!state.poll());
    }

    #[test]
    fn test_task_poll_abandoned_request() {
        let net = LoopbackNetwork::new();
        let server = net.endpoint();
        let client = net.endpoint();

        let mut msg = client.alloc();
        msg.send(&server.address());
        let request = server.receive().unwrap();

        let mut state =
            TaskState::<LoopbackTransport>::new(CallId::new(9, 2), request, client.address());
        let mut reply = server.alloc();
        reply.send(&client.address());
        state.response = Some(reply);
        assert!(state.poll());

        server.abandon_inbound();
        assert!(!state.poll());
        assert!(!state.is_detached());
        state.detach();
        assert!(state.is_detached());
        state.finalize();
    }
}
