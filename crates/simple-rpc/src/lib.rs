// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SimpleRpc: call correlation and lifecycle over a reliable message transport.
//!
//! The crate sits between an application and a transport that already
//! delivers messages reliably. It issues call ids, prepends small protocol
//! headers, matches responses to outstanding calls and hands inbound requests
//! to the application as tasks.
//!
//! # Architecture
//!
//! ```text
//!  Client application                                  Server application
//!        |                                                     ^
//!   alloc_rpc / send                                  receive / reply
//!        v                                                     |
//!  +-----------+   [RequestHeader | body]   +-----------+      |
//!  |  Socket   | -------------------------> |  Socket   | -----+
//!  | (table)   | <------------------------- | (tasks)   |
//!  +-----------+   [ResponseHeader | body]  +-----------+
//!        |                                        |
//!        +---------------- Transport -------------+
//! ```
//!
//! Nothing runs in the background: every arrival is dispatched inside
//! [`Socket::poll`], which [`Rpc::wait`] calls in a loop.
//!
//! # Example
//!
//! ```
//! use simple_rpc::loopback::LoopbackNetwork;
//! use simple_rpc::{Socket, Status};
//!
//! let net = LoopbackNetwork::new();
//! let client = Socket::new(net.endpoint());
//! let server = Socket::new(net.endpoint());
//! let server_addr = server.transport().address();
//!
//! let rpc = client.alloc_rpc();
//! rpc.send(&server_addr, b"ping").unwrap();
//!
//! server.poll();
//! let mut task = server.receive().unwrap();
//! assert_eq!(task.request_bytes(), b"ping");
//! task.reply(b"pong").unwrap();
//!
//! assert_eq!(rpc.wait(), Status::Completed);
//! assert_eq!(rpc.response_bytes().unwrap(), b"pong");
//! ```

pub mod config;
pub mod error;
pub mod loopback;
pub mod proto;
pub mod rpc;
pub mod socket;
pub mod stats;
pub mod task;
pub mod transport;

// Re-exports for convenience.
pub use config::SocketConfig;
pub use error::{ProtoError, Result, RpcError};
pub use proto::{
    CallId, HeaderCommon, Opcode, RequestHeader, ResponseHeader, ResponseId, HEADER_LEN,
    PROTOCOL_VERSION,
};
pub use rpc::{Rpc, Status};
pub use socket::Socket;
pub use stats::StatsSnapshot;
pub use task::ServerTask;
pub use transport::{InMessage, OutMessage, SendStatus, Transport, WireAddress, WIRE_ADDRESS_LEN};
