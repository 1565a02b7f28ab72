use serde_json::Value;
use tracing::trace;

use crate::args::Arguments;
use crate::block::{decode, encode, Block, BlockEncoding};
use crate::error::Result;

/// A named message with its encoded arguments, as carried on a port.
///
/// The first transfer always holds the sender's origin; the remaining ones
/// are the call arguments in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Call, event or reply-status name.
    pub message: String,
    /// Encoded origin slot followed by the encoded arguments.
    pub transfers: Vec<Block>,
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Call, event or reply-status name.
    pub message: String,
    /// Decoded arguments, origin slot removed.
    pub args: Vec<Value>,
    /// Origin declared by the sender. `None` when the origin slot is
    /// missing or does not hold a string.
    pub origin: Option<String>,
}

/// Everything that travels between two realms or two ports.
#[derive(Debug, Clone)]
pub enum WireMessage {
    /// A bare string token, such as a connect request.
    Text(String),
    /// A call, event or reply.
    Envelope(Envelope),
}

/// Build an envelope, prepending `origin` as the leading block.
pub fn to_envelope<A: Arguments + ?Sized>(
    message: &str,
    origin: &str,
    args: &A,
    encoding: BlockEncoding,
) -> Result<Envelope> {
    let mut transfers = Vec::with_capacity(args.count() + 1);
    transfers.push(encode(origin, encoding)?);
    args.encode_into(&mut transfers, encoding)?;
    trace!(call = message, blocks = transfers.len(), "built envelope");
    Ok(Envelope {
        message: message.to_string(),
        transfers,
    })
}

/// Decode an envelope and strip the origin slot from its arguments.
pub fn from_envelope(envelope: &Envelope, encoding: BlockEncoding) -> Result<Message> {
    let mut blocks = envelope.transfers.iter();
    let origin = match blocks.next() {
        Some(block) => match decode(block, encoding)? {
            Value::String(origin) => Some(origin),
            _ => None,
        },
        None => None,
    };
    let args = blocks
        .map(|block| decode(block, encoding))
        .collect::<Result<Vec<_>>>()?;

    Ok(Message {
        message: envelope.message.clone(),
        args,
        origin,
    })
}
