use hwlink_frame::{FrameConfig, FrameReader, FrameWriter};
use hwlink_registry::catalog;
use hwlink_transport::{StreamPair, Transport};
use tracing::{info, warn};

use crate::cmd::{endpoint, parse_duration, Context, SendArgs};
use crate::exit::{frame_error, registry_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_frame;

pub fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let mut endpoint = endpoint(&args.address, &ctx.config)?;

    let StreamPair { reader, writer } = endpoint
        .open_stream()
        .map_err(|err| transport_error("connect failed", err))?;

    let frame_config = ctx.config.frame_config();
    let mut frames = FrameWriter::with_config_device(writer, frame_config.clone())
        .map_err(|err| frame_error("connect failed", err))?;
    frames
        .send(args.code, &payload)
        .map_err(|err| frame_error("send failed", err))?;
    info!(
        endpoint = %endpoint.describe(),
        header_code = args.code,
        size = payload.len(),
        "frame sent"
    );

    if args.wait {
        let reply_config = FrameConfig {
            read_timeout: Some(wait_timeout),
            ..frame_config
        };
        let mut replies = FrameReader::with_config_device(reader, reply_config)
            .map_err(|err| frame_error("receive failed", err))?;
        let frame = replies
            .read_frame()
            .map_err(|err| frame_error("receive failed", err))?;
        let registry = catalog::registry().map_err(|err| registry_error("catalog", err))?;
        print_frame(&frame, &registry, ctx.format);
    }

    if let Err(err) = endpoint.close() {
        warn!(error = %err, "failed to close device stream");
    }
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(text) = &args.hex {
        let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = digits.strip_prefix("0x").unwrap_or(&digits);
        return hex::decode(digits)
            .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")));
    }
    Ok(Vec::new())
}
