use std::sync::Arc;

use tokio::runtime::Handle;
use xorigin_codec::WireMessage;
use xorigin_transport::Realm;

use crate::bus::{CrossOriginBus, Role};
use crate::config::BusOptions;
use crate::error::Result;
use crate::events::EventBus;
use crate::handshake;

/// Connect from a hosted realm to its host.
///
/// Sends the connect request and returns a bus that is already connected:
/// the host either adopts the offered port or silently ignores it. Must be
/// called from within a tokio runtime.
pub fn connect(
    realm: &Realm<WireMessage>,
    options: BusOptions,
    hub: Arc<dyn EventBus>,
) -> Result<CrossOriginBus> {
    options.validate()?;
    let runtime = Handle::try_current()?;

    let port = handshake::initiate(realm, &options.key)?;
    let bus = CrossOriginBus::assemble(
        Role::Hosted,
        realm.origin().to_string(),
        &options,
        hub,
        None,
        runtime,
    );
    bus.link().attach(port, None);
    Ok(bus)
}
