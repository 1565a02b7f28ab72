//! In-process message-passing primitives for isolated execution contexts.
//!
//! Models the environment two cross-origin peers live in:
//! - [`Realm`]: an execution context identified by its origin
//! - [`Frame`]: a hosted child realm opened from a URL
//! - [`Port`]: one end of an entangled duplex channel; ports can be
//!   transferred inside messages
//!
//! This is the lowest layer of xorigin. Everything else builds on top of
//! the [`Port`] and [`Realm`] types provided here.

pub mod error;
pub mod port;
pub mod realm;

pub use error::{Result, TransportError};
pub use port::{Port, PortReceiver, PortSender, Transfer};
pub use realm::{origin_of, Frame, Listener, MessageEvent, PortSlot, Realm, WindowProxy};
