// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Transport contract consumed by the correlation layer.
//
// The transport is assumed reliable and message-oriented. Everything here is
// non-blocking: sends complete asynchronously and are observed through
// `OutMessage::status`, receives return at most one message per call.

use std::fmt::{self, Debug};

// ---------------------------------------------------------------------------
// Wire address
// ---------------------------------------------------------------------------

/// Size of an encoded transport address in bytes.
pub const WIRE_ADDRESS_LEN: usize = 20;

/// Transport address in its fixed-size wire encoding.
///
/// The bytes are opaque to this crate; only the transport that produced them
/// can decode them.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WireAddress([u8; WIRE_ADDRESS_LEN]);

impl WireAddress {
    pub const fn new(bytes: [u8; WIRE_ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, zero-padding or truncating to [`WIRE_ADDRESS_LEN`].
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; WIRE_ADDRESS_LEN];
        let n = bytes.len().min(WIRE_ADDRESS_LEN);
        out[..n].copy_from_slice(&bytes[..n]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; WIRE_ADDRESS_LEN] {
        &self.0
    }
}

impl Debug for WireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireAddress(")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

// ---------------------------------------------------------------------------
// Send status
// ---------------------------------------------------------------------------

/// Progress of an asynchronous send as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendStatus {
    /// Send is still in flight.
    InProgress,
    /// Message was delivered.
    Completed,
    /// Message could not be delivered.
    Failed,
    /// Send was canceled before it settled.
    Canceled,
}

impl SendStatus {
    /// True once the send will make no further progress.
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Outbound message owned by the caller until sent.
///
/// Dropping the message releases it back to the transport. Dropping a message
/// whose send is in flight is allowed; the transport decides whether the send
/// still completes.
pub trait OutMessage: Send {
    type Address;

    /// Append bytes at the end of the message.
    fn append(&mut self, bytes: &[u8]);

    /// Prepend bytes at the front of the message.
    fn prepend(&mut self, bytes: &[u8]);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start an asynchronous send. Progress is observed through
    /// [`status`](OutMessage::status).
    fn send(&mut self, destination: &Self::Address);

    /// Cancel an in-flight send. No effect once the send has settled.
    fn cancel(&mut self);

    fn status(&self) -> SendStatus;
}

/// Inbound message handed out by [`Transport::receive`].
pub trait InMessage: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy bytes starting at `offset` into `buf`. Returns the number of
    /// bytes copied, which is short when the message ends first.
    fn get(&self, offset: usize, buf: &mut [u8]) -> usize;

    /// Remove `n` bytes from the front of the message.
    fn strip(&mut self, n: usize);

    /// True if the sender abandoned the request this message carries.
    fn dropped(&self) -> bool;

    /// Copy the whole message body out.
    fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len()];
        let n = self.get(0, &mut out);
        out.truncate(n);
        out
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Reliable message transport the socket runs on.
pub trait Transport: Send + Sync {
    type Address: Clone + Debug + Send + Sync;
    type OutMessage: OutMessage<Address = Self::Address>;
    type InMessage: InMessage;

    /// Endpoint id, stable for the lifetime of the transport.
    fn id(&self) -> u64;

    /// Address peers use to reach this endpoint.
    fn local_address(&self) -> Self::Address;

    fn alloc(&self) -> Self::OutMessage;

    /// Take the next inbound message, if any. Never blocks.
    fn receive(&self) -> Option<Self::InMessage>;

    /// Advance transport progress (send completions, deliveries).
    fn poll(&self);

    fn encode_address(&self, address: &Self::Address) -> WireAddress;

    fn decode_address(&self, wire: &WireAddress) -> Self::Address;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecMessage(Vec<u8>);

    impl InMessage for VecMessage {
        fn len(&self) -> usize {
            self.0.len()
        }

        fn get(&self, offset: usize, buf: &mut [u8]) -> usize {
            let src = self.0.get(offset..).unwrap_or(&[]);
            let n = src.len().min(buf.len());
            buf[..n].copy_from_slice(&src[..n]);
            n
        }

        fn strip(&mut self, n: usize) {
            self.0.drain(..n.min(self.0.len()));
        }

        fn dropped(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_wire_address_from_slice() {
        let short = WireAddress::from_slice(&[1, 2, 3]);
        assert_eq!(&short.as_bytes()[..3], &[1, 2, 3]);
        assert!(short.as_bytes()[3..].iter().all(|&b| b == 0));

        let long = WireAddress::from_slice(&[0xFF; 32]);
        assert_eq!(long.as_bytes(), &[0xFF; WIRE_ADDRESS_LEN]);
        assert!(format!("{:?}", long).starts_with("WireAddress(ffff"));
    }

    #[test]
    fn test_in_message_to_vec_after_strip() {
        let mut msg = VecMessage(b"headerbody".to_vec());
        msg.strip(6);
        assert_eq!(msg.to_vec(), b"body");
        assert!(!msg.is_empty());

        let mut buf = [0u8; 8];
        assert_eq!(msg.get(2, &mut buf), 2);
        assert_eq!(msg.get(10, &mut buf), 0);
    }

    #[test]
    fn test_send_status_settled() {
        assert!(!SendStatus::InProgress.is_settled());
        assert!(SendStatus::Completed.is_settled());
        assert!(SendStatus::Failed.is_settled());
        assert!(SendStatus::Canceled.is_settled());
    }
}
