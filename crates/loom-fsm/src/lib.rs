//! Loom FSM
//!
//! The reducer core: a pure transition function over a validated state machine.
//!
//! ```text
//! FsmDefinition ──compile──▶ StateMachine
//!                                 │
//!        (state, FsmEvent) ──transition──▶ TransitionOutcome { next_state, intents, actions }
//! ```
//!
//! `transition` performs no I/O. Entry and exit actions are returned to the caller,
//! which hands them to the event-bus binding.

mod condition;
mod definition;
mod error;
mod machine;
mod template;

pub use condition::{Condition, Operator, evaluate_condition};
pub use definition::{ActionTemplate, FsmDefinition, StateDef, TransitionDef, WILDCARD};
pub use error::FsmError;
pub use machine::{FsmEvent, StateMachine, TransitionOutcome, transition};
pub use template::{SchemaType, coerce_payload, render_payload};
