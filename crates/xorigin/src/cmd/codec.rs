use serde::Serialize;
use serde_json::Value;
use xorigin_codec::{Block, BlockEncoding};

use crate::cmd::{DecodeArgs, EncodeArgs};
use crate::exit::{codec_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{json_text, print_record, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput {
    encoding: BlockEncoding,
    bytes: usize,
    hex: String,
}

#[derive(Serialize)]
struct DecodeOutput {
    encoding: BlockEncoding,
    bytes: usize,
    value: Value,
}

pub fn encode(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let encoding = BlockEncoding::from(args.encoding);
    let value: Value = serde_json::from_str(&args.json)
        .map_err(|err| CliError::new(USAGE, format!("input is not valid JSON: {err}")))?;
    let block = xorigin_codec::encode(&value, encoding)
        .map_err(|err| codec_error("encode failed", err))?;

    let out = EncodeOutput {
        encoding,
        bytes: block.len(),
        hex: hex::encode(block.as_bytes()),
    };
    let fields = [
        ("encoding", encoding.to_string()),
        ("bytes", out.bytes.to_string()),
        ("hex", out.hex.clone()),
    ];
    print_record(&out, &fields, format);
    Ok(SUCCESS)
}

pub fn decode(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let encoding = BlockEncoding::from(args.encoding);
    let bytes = hex::decode(args.hex.trim())
        .map_err(|err| CliError::new(USAGE, format!("input is not valid hex: {err}")))?;
    let block = Block::from_bytes(bytes);
    let value = xorigin_codec::decode(&block, encoding)
        .map_err(|err| codec_error("decode failed", err))?;

    let fields = [
        ("encoding", encoding.to_string()),
        ("bytes", block.len().to_string()),
        ("value", json_text(&value)),
    ];
    let out = DecodeOutput {
        encoding,
        bytes: block.len(),
        value,
    };
    print_record(&out, &fields, format);
    Ok(SUCCESS)
}
