use std::time::Duration;

use serde_json::Value;
use tracing::trace;
use xorigin_codec::{from_envelope, to_envelope, BlockEncoding, Envelope, WireMessage};
use xorigin_transport::{Port, TransportError};

use crate::error::{BusError, Result};
use crate::events::HandlerResult;

/// Reply message: the handler resolved.
pub const REPLY_SUCCESS: &str = "success";
/// Reply message: the handler rejected.
pub const REPLY_FAILURE: &str = "failure";

/// Status carried by a reply envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Success,
    Failure,
}

impl ReplyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplyStatus::Success => REPLY_SUCCESS,
            ReplyStatus::Failure => REPLY_FAILURE,
        }
    }

    /// Status of a reply message name. Anything but `success` is a failure.
    pub fn from_message(message: &str) -> Self {
        if message == REPLY_SUCCESS {
            ReplyStatus::Success
        } else {
            ReplyStatus::Failure
        }
    }
}

/// Build the reply envelope for a handler outcome.
pub fn reply_envelope(
    result: &HandlerResult,
    origin: &str,
    encoding: BlockEncoding,
) -> Result<Envelope> {
    let envelope = match result {
        Ok(None) => to_envelope(REPLY_SUCCESS, origin, &(), encoding)?,
        Ok(Some(value)) => to_envelope(REPLY_SUCCESS, origin, &(value,), encoding)?,
        Err(reason) => to_envelope(REPLY_FAILURE, origin, &(reason,), encoding)?,
    };
    Ok(envelope)
}

/// Post the reply for a handler outcome on the call's reply port.
pub fn send_reply(
    reply: &Port<WireMessage>,
    result: &HandlerResult,
    origin: &str,
    encoding: BlockEncoding,
) -> Result<()> {
    let envelope = reply_envelope(result, origin, encoding)?;
    trace!(port = reply.id(), status = %envelope.message, "sending reply");
    reply.post(WireMessage::Envelope(envelope), Vec::new())?;
    Ok(())
}

/// Settle a call from its reply envelope.
///
/// The origin slot is stripped and not verified: the reply port is private
/// to the call.
pub fn read_reply(envelope: &Envelope, encoding: BlockEncoding) -> Result<Option<Value>> {
    let message = from_envelope(envelope, encoding)?;
    let first = message.args.into_iter().next();
    match ReplyStatus::from_message(&message.message) {
        ReplyStatus::Success => Ok(first),
        ReplyStatus::Failure => Err(BusError::Remote(first.unwrap_or(Value::Null))),
    }
}

/// Wait for the single reply on a call's reply port, then close the port.
pub async fn await_reply(
    mut port: Port<WireMessage>,
    timeout: Option<Duration>,
    encoding: BlockEncoding,
) -> Result<Option<Value>> {
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, recv_reply(&mut port, encoding))
            .await
            .unwrap_or_else(|_| Err(BusError::Timeout(limit))),
        None => recv_reply(&mut port, encoding).await,
    };
    port.close();
    outcome
}

async fn recv_reply(port: &mut Port<WireMessage>, encoding: BlockEncoding) -> Result<Option<Value>> {
    let port_id = port.id();
    loop {
        match port.recv().await {
            Some(transfer) => match transfer.data {
                WireMessage::Envelope(envelope) => return read_reply(&envelope, encoding),
                WireMessage::Text(_) => {
                    trace!(port = port_id, "ignoring text on reply port");
                }
            },
            None => return Err(TransportError::PortClosed(port_id).into()),
        }
    }
}
