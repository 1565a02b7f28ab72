//! Keyed, origin-checked messaging between isolated execution contexts.
//!
//! A host realm opens a frame; the hosted realm offers it a private port
//! together with a shared key. Once the host accepts, each side can call
//! the other's event handlers and receive exactly one reply per call.
//!
//! # Crate Structure
//!
//! - [`transport`]: ports, realms and frames
//! - [`codec`]: argument blocks and envelopes
//! - [`bus`]: handshake, origin allowlist and call correlation (behind the
//!   `bus` feature, enabled by default)

/// Re-export transport types.
pub mod transport {
    pub use xorigin_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use xorigin_codec::*;
}

/// Re-export bus types (requires `bus` feature).
#[cfg(feature = "bus")]
pub mod bus {
    pub use xorigin_bus::*;
}
