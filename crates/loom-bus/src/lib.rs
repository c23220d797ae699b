//! Publish/subscribe boundary.
//!
//! Reducers and orchestrators never talk to a broker directly. They publish
//! [`BusMessage`]s through an [`EventPublisher`] bound at construction; the binding
//! decides what happens next (forward to a broker, persist, stream to a UI, drop).

mod error;
mod events;
mod publisher;

pub use error::PublishError;
pub use events::{ActionPhase, BusMessage, ExecutionEvent};
pub use publisher::{ChannelPublisher, EventPublisher, NoopPublisher, RecordingPublisher};
