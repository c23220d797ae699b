//! Handler routing and output contracts.
//!
//! Handlers are registered on a [`HandlerRegistryBuilder`] during startup and the
//! builder is frozen into a read-only [`HandlerRegistry`]. Every value a handler
//! returns is a [`HandlerOutput`], which cannot be built with fields its
//! [`NodeKind`] is not allowed to populate.

mod error;
mod handler;
mod output;
mod registry;
mod topic;

pub use error::{HandlerError, RegistrationError, RoutingError};
pub use handler::Handler;
pub use output::{HandlerOutput, NodeKind, OutputField, OutputOrigin, OutputParts, ShapeViolation, validate_output};
pub use registry::{Candidate, HandlerRegistry, HandlerRegistryBuilder, MatchTier, RoutingKey};
pub use topic::topic_matches;
