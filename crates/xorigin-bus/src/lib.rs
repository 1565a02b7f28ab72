//! Cross-origin event bus.
//!
//! Two realms that can only exchange opaque messages establish a private
//! port through a keyed, origin-checked handshake, then call each other's
//! event handlers. Every call carries its own single-use reply port, which
//! is the only correlation a reply needs.

pub mod bus;
pub mod config;
pub mod connector;
pub mod control;
pub mod error;
pub mod events;
pub mod gate;
pub mod handshake;
pub mod listener;
pub mod origin;

pub use bus::{CrossOriginBus, Role};
pub use config::{BusOptions, DEFAULT_REPLY_TIMEOUT};
pub use connector::connect;
pub use control::{ReplyStatus, REPLY_FAILURE, REPLY_SUCCESS};
pub use error::{BusError, Result, Severity};
pub use events::{handler, EventBus, Handler, HandlerResult, LocalBus};
pub use gate::{ConnectionState, ReadinessGate};
pub use handshake::{connect_token, CONNECT_PREFIX};
pub use listener::host;
pub use origin::{Allowlist, OriginPattern};
