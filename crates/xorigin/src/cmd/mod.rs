use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use xorigin_codec::BlockEncoding;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod codec;
pub mod matcher;
pub mod ping;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect a host and a hosted bus in-process and make one call.
    Ping(PingArgs),
    /// Check an origin against allowlist patterns.
    Match(MatchArgs),
    /// Encode a JSON value into a block and print it as hex.
    Encode(EncodeArgs),
    /// Decode a hex block back into JSON.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Ping(args) => ping::run(args, format),
        Command::Match(args) => matcher::run(args, format),
        Command::Encode(args) => codec::encode(args, format),
        Command::Decode(args) => codec::decode(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum EncodingArg {
    #[default]
    Utf8,
    Latin1,
}

impl From<EncodingArg> for BlockEncoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Utf8 => BlockEncoding::Utf8,
            EncodingArg::Latin1 => BlockEncoding::Latin1,
        }
    }
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Origin of the host realm.
    #[arg(long, default_value = "http://localhost")]
    pub host_origin: String,
    /// URL of the hosted frame. Its origin is what the host verifies.
    #[arg(long, default_value = "http://sub.example.com/app")]
    pub url: String,
    /// Origin pattern the host accepts (repeatable, `*` wildcard).
    #[arg(long = "allow", value_name = "PATTERN", required = true)]
    pub allow: Vec<String>,
    /// Shared connect key of the host.
    #[arg(long, env = "XORIGIN_KEY", default_value = "", hide_env_values = true)]
    pub key: String,
    /// Connect key used by the hosted side. Defaults to --key.
    #[arg(long)]
    pub child_key: Option<String>,
    /// Message name to call.
    #[arg(long, default_value = "ping")]
    pub message: String,
    /// Call arguments as a JSON array (a non-array value is one argument).
    #[arg(long, default_value = "[]")]
    pub args: String,
    /// Reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Block encoding on both sides.
    #[arg(long, value_enum, default_value_t = EncodingArg::Utf8)]
    pub encoding: EncodingArg,
}

#[derive(Args, Debug)]
pub struct MatchArgs {
    /// Origin to check.
    pub origin: String,
    /// Allowlist pattern (repeatable).
    #[arg(long = "pattern", short = 'p', value_name = "PATTERN", required = true)]
    pub patterns: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// JSON value to encode.
    pub json: String,
    /// Block encoding.
    #[arg(long, value_enum, default_value_t = EncodingArg::Utf8)]
    pub encoding: EncodingArg,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex bytes of the block.
    pub hex: String,
    /// Block encoding.
    #[arg(long, value_enum, default_value_t = EncodingArg::Utf8)]
    pub encoding: EncodingArg,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `250ms`, `5s`, `2m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input:?}")))?;
    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        other => {
            return Err(CliError::new(
                USAGE,
                format!("unknown duration unit {other:?} (use ms, s or m)"),
            ))
        }
    };

    if duration.is_zero() {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }
    Ok(duration)
}
