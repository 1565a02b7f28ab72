//! Host and hosted bus in one process, calling each other.
//!
//! Run with:
//!   cargo run --example ping-pong

use std::sync::Arc;

use serde_json::json;
use xorigin::bus::{connect, handler, host, BusOptions, EventBus, LocalBus};
use xorigin::codec::WireMessage;
use xorigin::transport::Realm;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let page = Realm::<WireMessage>::new("https://app.example.com");

    let page_hub = Arc::new(LocalBus::new());
    page_hub.on(
        "ping",
        handler(|args| async move {
            let n = args.first().and_then(|v| v.as_i64()).unwrap_or_default();
            Ok(Some(json!(n + 1)))
        }),
    );

    let options = BusOptions::new(["https://*.example.com"]).with_key("demo");
    let parent = host(&page, "https://widget.example.com/embed", options, page_hub)?;
    eprintln!("Hosting {}", parent.frame().map_or("?", |f| f.url()));

    // Inside the frame.
    let widget_realm = parent
        .frame()
        .map(|frame| frame.realm().clone())
        .ok_or("host bus has no frame")?;
    let widget_hub = Arc::new(LocalBus::new());
    widget_hub.on(
        "title",
        handler(|_| async { Ok(Some(json!("Widget"))) }),
    );
    let widget = connect(
        &widget_realm,
        BusOptions::new([page.origin()]).with_key("demo"),
        widget_hub,
    )?;

    let pong = widget.fire("ping", &(41,)).await?;
    eprintln!("ping 41 -> {}", pong.unwrap_or_default());

    let title = parent.fire("title", &()).await?;
    eprintln!("widget title: {}", title.unwrap_or_default());

    widget.dispose();
    parent.dispose();
    Ok(())
}
