// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// SimpleRpc wire header definitions.
//
// All parsing is safe: malformed input returns Err, never panics.
// Integers are little-endian.

use std::fmt;

use crate::error::ProtoError;
use crate::transport::{WireAddress, WIRE_ADDRESS_LEN};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Protocol version stamped into every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of [`HeaderCommon`] in bytes (version + opcode).
pub const HEADER_COMMON_LEN: usize = 2;

/// Size of an encoded [`CallId`] in bytes.
pub const CALL_ID_LEN: usize = 16;

/// Size of both [`RequestHeader`] and [`ResponseHeader`] in bytes.
///
/// Request: common (2) + call id (16) + reply address (20) + pad (4).
/// Response: common (2) + call id (16) + reserved (24).
pub const HEADER_LEN: usize = HEADER_COMMON_LEN + CALL_ID_LEN + WIRE_ADDRESS_LEN + 4;

const CALL_ID_OFFSET: usize = HEADER_COMMON_LEN;
const REPLY_ADDRESS_OFFSET: usize = CALL_ID_OFFSET + CALL_ID_LEN;

// Opcode bytes
pub const OPCODE_REQUEST: u8 = 1;
pub const OPCODE_RESPONSE: u8 = 2;
pub const OPCODE_MANIFEST: u8 = 3;
pub const OPCODE_INVALID: u8 = 4;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for one call.
///
/// `owner_id` is the id of the socket that issued the call and `sequence` is
/// unique and monotonically increasing for that socket. Ordering is
/// lexicographic on `(owner_id, sequence)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId {
    /// Id of the socket that owns the call
    pub owner_id: u64,
    /// Per-socket sequence number, starting at 1
    pub sequence: u64,
}

impl CallId {
    /// Create a new CallId
    pub const fn new(owner_id: u64, sequence: u64) -> Self {
        Self { owner_id, sequence }
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.owner_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.sequence.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut owner = [0u8; 8];
        let mut seq = [0u8; 8];
        owner.copy_from_slice(&buf[0..8]);
        seq.copy_from_slice(&buf[8..16]);
        Self {
            owner_id: u64::from_le_bytes(owner),
            sequence: u64::from_le_bytes(seq),
        }
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.owner_id, self.sequence)
    }
}

/// Identifies one response to a call.
///
/// The base protocol only ever honors the first response, so this id is not
/// needed for correlation; it exists for extensions that send several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResponseId {
    /// Call the response belongs to
    pub call_id: CallId,
    /// Response number within the call
    pub sequence: u64,
}

impl ResponseId {
    /// Create a new ResponseId
    pub const fn new(call_id: CallId, sequence: u64) -> Self {
        Self { call_id, sequence }
    }
}

// ---------------------------------------------------------------------------
// Opcode
// ---------------------------------------------------------------------------

/// Distinguishes the protocol message types.
///
/// Bytes outside the known range decode to `Unknown` so that the receiver can
/// log and drop the message instead of failing the whole poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Request,
    Response,
    Manifest,
    Invalid,
    Unknown(u8),
}

impl Opcode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            OPCODE_REQUEST => Self::Request,
            OPCODE_RESPONSE => Self::Response,
            OPCODE_MANIFEST => Self::Manifest,
            OPCODE_INVALID => Self::Invalid,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Request => OPCODE_REQUEST,
            Self::Response => OPCODE_RESPONSE,
            Self::Manifest => OPCODE_MANIFEST,
            Self::Invalid => OPCODE_INVALID,
            Self::Unknown(v) => v,
        }
    }
}

// ---------------------------------------------------------------------------
// Common header
// ---------------------------------------------------------------------------

/// Prefix shared by every protocol message (2 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderCommon {
    pub version: u8,
    pub opcode: Opcode,
}

impl HeaderCommon {
    /// Common header for the current protocol version.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            opcode,
        }
    }

    /// Decode the common prefix. Only fails on truncated input; version and
    /// opcode are left for the caller to judge.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < HEADER_COMMON_LEN {
            return Err(ProtoError::Truncated {
                needed: HEADER_COMMON_LEN,
                actual: buf.len(),
            });
        }
        Ok(Self {
            version: buf[0],
            opcode: Opcode::from_u8(buf[1]),
        })
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = self.version;
        buf[1] = self.opcode.as_u8();
    }

    fn check(&self, expected: Opcode) -> Result<(), ProtoError> {
        if self.version != PROTOCOL_VERSION {
            return Err(ProtoError::UnsupportedVersion(self.version));
        }
        if self.opcode != expected {
            return Err(ProtoError::Malformed {
                expected: expected.as_u8(),
                actual: self.opcode.as_u8(),
            });
        }
        Ok(())
    }
}

impl Default for HeaderCommon {
    fn default() -> Self {
        Self::new(Opcode::Invalid)
    }
}

fn check_len(buf: &[u8]) -> Result<(), ProtoError> {
    if buf.len() < HEADER_LEN {
        return Err(ProtoError::Truncated {
            needed: HEADER_LEN,
            actual: buf.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Request header
// ---------------------------------------------------------------------------

/// Header prepended to request messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub common: HeaderCommon,
    /// Call this request belongs to
    pub call_id: CallId,
    /// Replies to this request go to this address
    pub reply_address: WireAddress,
}

impl RequestHeader {
    pub fn new(call_id: CallId, reply_address: WireAddress) -> Self {
        Self {
            common: HeaderCommon::new(Opcode::Request),
            call_id,
            reply_address,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        self.common.write_to(&mut buf);
        self.call_id.write_to(&mut buf[CALL_ID_OFFSET..REPLY_ADDRESS_OFFSET]);
        buf[REPLY_ADDRESS_OFFSET..REPLY_ADDRESS_OFFSET + WIRE_ADDRESS_LEN]
            .copy_from_slice(self.reply_address.as_bytes());
        // trailing pad stays zero
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        check_len(buf)?;
        let common = HeaderCommon::decode(buf)?;
        common.check(Opcode::Request)?;
        let call_id = CallId::read_from(&buf[CALL_ID_OFFSET..REPLY_ADDRESS_OFFSET]);
        let reply_address = WireAddress::from_slice(
            &buf[REPLY_ADDRESS_OFFSET..REPLY_ADDRESS_OFFSET + WIRE_ADDRESS_LEN],
        );
        Ok(Self {
            common,
            call_id,
            reply_address,
        })
    }
}

// ---------------------------------------------------------------------------
// Response header
// ---------------------------------------------------------------------------

/// Header prepended to response messages.
///
/// Padded with reserved zero bytes to the same length as [`RequestHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub common: HeaderCommon,
    /// Call this response answers
    pub call_id: CallId,
}

impl ResponseHeader {
    pub fn new(call_id: CallId) -> Self {
        Self {
            common: HeaderCommon::new(Opcode::Response),
            call_id,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        self.common.write_to(&mut buf);
        self.call_id.write_to(&mut buf[CALL_ID_OFFSET..REPLY_ADDRESS_OFFSET]);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        check_len(buf)?;
        let common = HeaderCommon::decode(buf)?;
        common.check(Opcode::Response)?;
        Ok(Self {
            common,
            call_id: CallId::read_from(&buf[CALL_ID_OFFSET..REPLY_ADDRESS_OFFSET]),
        })
    }
}
