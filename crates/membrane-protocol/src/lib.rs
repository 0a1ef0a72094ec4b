//! Streaming protocol between the membrane and a function process.
//!
//! This crate turns one physical bidirectional stream into a worker:
//! - `ServerMessage` / `ClientMessage` - Wire messages in each direction
//! - `WireCodec` - Length-delimited JSON framing
//! - `handshake` - Registration handshake performed before a stream becomes a worker
//! - `FaasWorker` - Single-flight `Worker` implementation over a stream
//! - `FunctionClient` - Function side of the stream, for Rust functions and tests
//!
//! The protocol carries no correlation identifier, so at most one trigger
//! may be outstanding on a stream at any time.

mod adapter;
mod client;
mod codec;
mod handshake;
mod message;

pub use adapter::*;
pub use client::*;
pub use codec::*;
pub use handshake::*;
pub use message::*;
