// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for SimpleRpc operations.
//!
//! Network-level conditions (failed sends, stale or duplicate responses,
//! unexpected opcodes, abandoned requests) are never reported through these
//! types. They surface as [`Status`](crate::Status) values or are logged and
//! swallowed by [`Socket::poll`](crate::Socket::poll). `RpcError` only covers
//! API misuse and construction problems.

use crate::proto::CallId;
use thiserror::Error;

/// Result type for SimpleRpc operations
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors returned by the application-facing API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// `send` was called on a call that already sent its request.
    #[error("rpc {0} already sent its request")]
    AlreadySent(CallId),

    /// `reply` was called on a task that already replied.
    #[error("task for rpc {0} already replied")]
    AlreadyReplied(CallId),

    /// Socket configuration failed validation.
    #[error("config error: {0}")]
    Config(String),
}

/// Errors produced while decoding protocol headers.
///
/// These never cross the API boundary; the socket logs them and drops the
/// offending message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// Message is shorter than the header being decoded.
    #[error("message truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    /// Protocol version byte does not match ours.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Header carries a different opcode than the one being decoded.
    #[error("header opcode mismatch: expected 0x{expected:02x}, got 0x{actual:02x}")]
    Malformed { expected: u8, actual: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_display() {
        let err = RpcError::AlreadySent(CallId::new(7, 3));
        assert_eq!(err.to_string(), "rpc (7, 3) already sent its request");

        let err = RpcError::AlreadyReplied(CallId::new(1, 2));
        assert!(err.to_string().contains("already replied"));

        let err = RpcError::Config("max_pending_tasks must be > 0".into());
        assert!(err.to_string().starts_with("config error"));
    }

    #[test]
    fn test_proto_error_display() {
        let err = ProtoError::Truncated {
            needed: 42,
            actual: 2,
        };
        assert!(err.to_string().contains("need 42"));

        let err = ProtoError::Malformed {
            expected: 1,
            actual: 2,
        };
        assert!(err.to_string().contains("0x01"));
        assert!(err.to_string().contains("0x02"));
    }
}
