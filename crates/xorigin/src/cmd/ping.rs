use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::info;
use xorigin_bus::{connect, handler, host, BusOptions, EventBus, LocalBus};
use xorigin_codec::BlockEncoding;
use xorigin_transport::Realm;

use crate::cmd::{parse_duration, PingArgs};
use crate::exit::{bus_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{json_text, print_record, OutputFormat};

#[derive(Serialize)]
struct PingOutput {
    host_origin: String,
    frame_origin: String,
    remote_origin: Option<String>,
    message: String,
    reply: Option<Value>,
    latency_ms: f64,
}

pub fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let call_args = parse_call_args(&args.args)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))?;
    let out = runtime.block_on(exchange(&args, call_args, timeout))?;

    let reply = out.reply.as_ref().map_or_else(|| "-".to_string(), json_text);
    let fields = [
        ("host_origin", out.host_origin.clone()),
        ("frame_origin", out.frame_origin.clone()),
        (
            "remote_origin",
            out.remote_origin.clone().unwrap_or_else(|| "-".to_string()),
        ),
        ("message", out.message.clone()),
        ("reply", reply),
        ("latency_ms", out.latency_ms.to_string()),
    ];
    print_record(&out, &fields, format);
    Ok(SUCCESS)
}

async fn exchange(
    args: &PingArgs,
    call_args: Vec<Value>,
    timeout: Duration,
) -> CliResult<PingOutput> {
    let encoding = BlockEncoding::from(args.encoding);
    let realm = Realm::new(args.host_origin.clone());

    let hub = Arc::new(LocalBus::new());
    hub.on(
        &args.message,
        handler(|call| async move { Ok(call.into_iter().next()) }),
    );

    let host_options = BusOptions::new(args.allow.iter().cloned())
        .with_key(args.key.clone())
        .with_reply_timeout(Some(timeout))
        .with_encoding(encoding);
    let parent =
        host(&realm, &args.url, host_options, hub).map_err(|err| bus_error("host failed", err))?;
    let frame_realm = parent
        .frame()
        .map(|frame| frame.realm().clone())
        .ok_or_else(|| CliError::new(INTERNAL, "host bus has no frame"))?;

    // The hosted side only ever hears from its own host.
    let child_options = BusOptions::new([realm.origin()])
        .with_key(args.child_key.clone().unwrap_or_else(|| args.key.clone()))
        .with_reply_timeout(Some(timeout))
        .with_encoding(encoding);
    let child = connect(&frame_realm, child_options, Arc::new(LocalBus::new()))
        .map_err(|err| bus_error("connect failed", err))?;

    let started = Instant::now();
    let reply = child
        .fire(&args.message, call_args.as_slice())
        .await
        .map_err(|err| bus_error("call failed", err))?;
    let latency_ms = (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0;
    info!(call = %args.message, latency_ms, "reply received");

    let out = PingOutput {
        host_origin: realm.origin().to_string(),
        frame_origin: child.origin().to_string(),
        remote_origin: parent.remote_origin(),
        message: args.message.clone(),
        reply,
        latency_ms,
    };
    child.dispose();
    parent.dispose();
    Ok(out)
}

fn parse_call_args(input: &str) -> CliResult<Vec<Value>> {
    match serde_json::from_str::<Value>(input) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(value) => Ok(vec![value]),
        Err(err) => Err(CliError::new(
            USAGE,
            format!("--args is not valid JSON: {err}"),
        )),
    }
}
