//! loom: a declarative workflow execution core.
//!
//! Each member crate is re-exported under a short module name:
//!
//! - [`message`]: envelopes, intents and lease-stamped actions
//! - [`fsm`]: pure state machines compiled from definitions
//! - [`workflow`]: workflow definitions and their batch order
//! - [`lease`]: single-writer leases and the lease store boundary
//! - [`handler`]: handler contracts, output shapes and the routing registry
//! - [`bus`]: the event bus binding
//! - [`orchestrator`]: lease-guarded workflow execution
//! - [`runtime`]: node wiring and the envelope runner

pub use loom_bus as bus;
pub use loom_fsm as fsm;
pub use loom_handler as handler;
pub use loom_lease as lease;
pub use loom_message as message;
pub use loom_orchestrator as orchestrator;
pub use loom_runtime as runtime;
pub use loom_workflow as workflow;
