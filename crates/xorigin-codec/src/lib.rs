//! Transfer codec and message envelopes for cross-origin messaging.
//!
//! Every call argument travels as its own [`Block`]: the JSON text of the
//! value, packed into an opaque byte sequence. An [`Envelope`] pairs a
//! message name with the ordered blocks; the sender's origin always rides
//! in the first block so the receiver can verify provenance without
//! trusting the transport.

pub mod args;
pub mod block;
pub mod envelope;
pub mod error;

pub use args::Arguments;
pub use block::{decode, encode, Block, BlockEncoding};
pub use envelope::{from_envelope, to_envelope, Envelope, Message, WireMessage};
pub use error::{CodecError, Result};
