//! Session domain: the registry of waiting clients, their sinks, and expiry.

pub mod policy;
pub mod registry;
pub mod sink;
pub mod sweep;

pub use policy::{SessionStatus, SweepPolicy};
pub use registry::{ConnectionId, SessionRegistry, SessionSnapshot, SweepReport};
pub use sink::{ChannelSink, SessionEvent, SessionSink, SinkError};
pub use sweep::spawn_sweeper;
