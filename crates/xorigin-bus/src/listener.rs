use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;
use xorigin_codec::WireMessage;
use xorigin_transport::Realm;

use crate::bus::{CrossOriginBus, Role};
use crate::config::BusOptions;
use crate::error::Result;
use crate::events::EventBus;
use crate::handshake;
use crate::origin::Allowlist;

/// Open a frame at `url` inside `realm` and wait for it to connect.
///
/// The returned bus is `Connecting` until a connect request from an allowed
/// origin with the matching key arrives; every other request is ignored.
/// The connect listener is registered before the frame opens and removed
/// once a request is accepted or the bus is disposed. Must be called from
/// within a tokio runtime.
pub fn host(
    realm: &Realm<WireMessage>,
    url: &str,
    options: BusOptions,
    hub: Arc<dyn EventBus>,
) -> Result<CrossOriginBus> {
    options.validate()?;
    let runtime = Handle::try_current()?;

    let mut listener = realm.listen();
    let frame = realm.open_frame(url)?;
    let bus = CrossOriginBus::assemble(
        Role::Host,
        realm.origin().to_string(),
        &options,
        hub,
        Some(frame),
        runtime,
    );

    let link = bus.link().clone();
    let allowlist = Allowlist::compile(&options.origins);
    let token = handshake::connect_token(&options.key);
    let runtime = link.runtime().clone();
    runtime.spawn(async move {
        let accepted = tokio::select! {
            biased;
            _ = link.shutdown().cancelled() => None,
            accepted = handshake::accept(&mut listener, &allowlist, &token) => accepted,
        };
        drop(listener);

        match accepted {
            Some((origin, port)) => {
                link.attach(port, Some(origin));
            }
            None => debug!("stopped waiting for connect request"),
        }
    });

    Ok(bus)
}
