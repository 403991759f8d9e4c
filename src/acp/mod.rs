//! Agent Client Protocol (ACP) stream handling.
//!
//! This module manages bidirectional JSON-RPC 2.0 communication with agent
//! processes. The wire is newline-delimited JSON over the child's stdio, or
//! an SSE read stream paired with an HTTP send endpoint. Each active session
//! owns one connection built from a transport pump plus a [`jsonrpc`] client,
//! wrapped by the [`client::AcpClient`] bridge.

pub mod client;
pub mod jsonrpc;
pub mod mock;
pub mod protocol;
pub mod sse;
pub mod tools;
pub mod transport;
