//! Core abstractions for the membrane runtime.
//!
//! This crate provides the types every other membrane crate builds on:
//! - `Trigger` - Canonical inbound invocation (HTTP-shaped or event-shaped)
//! - `HttpResponse` / `EventAck` - Canonical replies
//! - `ToCanonical` / `FromCanonical` - Gateway conversion contracts
//! - `Worker` trait - Something that can execute a trigger
//! - `MembraneError` - The runtime's error taxonomy

mod convert;
mod error;
mod trigger;
mod worker;

pub use convert::*;
pub use error::*;
pub use trigger::*;
pub use worker::*;
