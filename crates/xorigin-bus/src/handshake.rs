//! Connection handshake.
//!
//! The hosted side creates a port pair, keeps one end and posts
//! `connect:<key>` with the other end to its host, then considers itself
//! connected. The host adopts the offered port only when both the sender
//! origin and the token check out; anything else is dropped without a
//! response.

use tracing::debug;
use xorigin_codec::WireMessage;
use xorigin_transport::{Listener, MessageEvent, Port, PortSlot, Realm, TransportError};

use crate::error::Result;
use crate::origin::Allowlist;

/// Prefix of the connect token.
pub const CONNECT_PREFIX: &str = "connect:";

/// Connect token for `key`. The empty key is allowed.
pub fn connect_token(key: &str) -> String {
    format!("{CONNECT_PREFIX}{key}")
}

/// Offer a fresh port to the host of `realm`.
///
/// Returns the locally kept end. Whether the host accepts is never reported.
pub fn initiate(realm: &Realm<WireMessage>, key: &str) -> Result<Port<WireMessage>> {
    let parent = realm
        .parent()
        .ok_or_else(|| TransportError::NoParent(realm.origin().to_string()))?;

    let (local, remote) = Port::pair();
    parent.post_message(WireMessage::Text(connect_token(key)), "*", vec![remote])?;
    debug!(
        origin = %realm.origin(),
        port = local.id(),
        key_len = key.len(),
        "sent connect request"
    );
    Ok(local)
}

/// Whether a realm event is an acceptable connect request.
pub fn verify_connect(
    event: &MessageEvent<WireMessage>,
    allowlist: &Allowlist,
    expected_token: &str,
) -> bool {
    let token_matches = matches!(&event.data, WireMessage::Text(token) if token == expected_token);
    token_matches && !event.origin.is_empty() && allowlist.verify(&event.origin)
}

/// Wait for the first acceptable connect request and claim its port.
///
/// Returns the remote origin and the adopted port, or `None` once the realm
/// is gone.
pub async fn accept(
    listener: &mut Listener<WireMessage>,
    allowlist: &Allowlist,
    expected_token: &str,
) -> Option<(String, Port<WireMessage>)> {
    loop {
        let event = listener.recv().await?;
        if !verify_connect(&event, allowlist, expected_token) {
            debug!(origin = %event.origin, "connect attempt dropped");
            continue;
        }
        let Some(port) = event.ports.first().and_then(PortSlot::take) else {
            debug!(origin = %event.origin, "connect attempt carried no port");
            continue;
        };
        debug!(origin = %event.origin, port = port.id(), "connect request accepted");
        return Some((event.origin, port));
    }
}
