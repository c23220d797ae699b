//! Loom Message
//!
//! The units that travel between loom nodes:
//! - [`Envelope`] wraps any payload with routing and correlation metadata
//! - [`Intent`] is a side-effect request emitted by pure state reduction
//! - [`Action`] is an Intent that has been authorized under a lease and epoch
//!
//! The message category (event, command, intent) is never stored on the envelope.
//! It is derived from the payload through the [`Payload`] trait so the two cannot drift.

mod action;
mod envelope;
mod error;
mod intent;
mod payload;

pub use action::{Action, ActionType, LeaseStamp};
pub use envelope::{Envelope, Priority};
pub use error::EnvelopeError;
pub use intent::Intent;
pub use payload::{DynPayload, MessageCategory, Payload};
