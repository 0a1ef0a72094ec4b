//! Function process supervision.
//!
//! This crate boots and watches the function process:
//! - `ChildState` - Lifecycle state machine (`NotStarted → Starting → Ready → Exited`)
//! - `ChildSupervisor` - Spawns the process, waits for it to register, stops it

mod state;
mod supervisor;

pub use state::*;
pub use supervisor::*;
