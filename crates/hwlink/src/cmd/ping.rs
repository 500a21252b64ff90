use std::sync::Arc;
use std::time::{Duration, Instant};

use hwlink_registry::catalog::{self, ButtonAck, ButtonRequest, Failure, Ping, Success};
use hwlink_session::{DeviceEvent, Listener, RecvError, Session};
use hwlink_transport::Endpoint;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::{endpoint, parse_duration, Context, PingArgs};
use crate::exit::{
    registry_error, session_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, TIMEOUT,
};
use crate::output::OutputFormat;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Serialize)]
struct PingOutput {
    endpoint: String,
    ok: bool,
    reply: &'static str,
    code: Option<u32>,
    message: Option<String>,
    latency_ms: f64,
}

/// How the device answered a ping.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Success(Success),
    Failure(Failure),
    ButtonRequest(ButtonRequest),
    Other(&'static str),
}

fn classify(event: &DeviceEvent) -> Reply {
    if let Some(success) = event.downcast_ref::<Success>() {
        Reply::Success(success.clone())
    } else if let Some(failure) = event.downcast_ref::<Failure>() {
        Reply::Failure(failure.clone())
    } else if let Some(request) = event.downcast_ref::<ButtonRequest>() {
        Reply::ButtonRequest(request.clone())
    } else {
        Reply::Other(event.message_name())
    }
}

pub fn run(args: PingArgs, ctx: &Context) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let endpoint = endpoint(&args.address, &ctx.config)?;
    let registry = Arc::new(catalog::registry().map_err(|err| registry_error("catalog", err))?);
    let session = Session::with_config(endpoint, registry, ctx.config.clone())
        .map_err(|err| session_error("invalid config", err))?;

    let listener = Listener::new();
    session
        .add_listener(&listener)
        .map_err(|err| session_error("listener setup failed", err))?;
    session
        .connect()
        .map_err(|err| session_error("connect failed", err))?;

    let started = Instant::now();
    session
        .send(&Ping {
            message: args.message.clone(),
        })
        .map_err(|err| session_error("send failed", err))?;

    let outcome = await_reply(&session, &listener, started + timeout);
    let latency = started.elapsed();
    close(&session);

    let reply = match outcome {
        Ok(reply) => reply,
        Err(err) if err.code == TIMEOUT => {
            return Err(CliError::new(
                TIMEOUT,
                format!("no reply within {timeout:?}"),
            ))
        }
        Err(err) => return Err(err),
    };

    let out = match reply {
        Reply::Success(success) => PingOutput {
            endpoint: session.describe(),
            ok: true,
            reply: "Success",
            code: None,
            message: success.message,
            latency_ms: millis(latency),
        },
        Reply::Failure(failure) => PingOutput {
            endpoint: session.describe(),
            ok: false,
            reply: "Failure",
            code: failure.code,
            message: failure.message,
            latency_ms: millis(latency),
        },
        Reply::ButtonRequest(_) | Reply::Other(_) => {
            return Err(CliError::new(INTERNAL, "unexpected reply state"));
        }
    };

    print_ping(&out, ctx.format);
    if out.ok {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(
            FAILURE,
            format!(
                "device answered Failure: {}",
                out.message.as_deref().unwrap_or("no message")
            ),
        ))
    }
}

fn await_reply(
    session: &Session<Endpoint>,
    listener: &Listener,
    deadline: Instant,
) -> CliResult<Reply> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(TIMEOUT, "timed out"));
        }

        match listener.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(event) => match classify(&event) {
                reply @ (Reply::Success(_) | Reply::Failure(_)) => return Ok(reply),
                Reply::ButtonRequest(request) => {
                    info!(code = ?request.code, "confirm on the device");
                    session
                        .send(&ButtonAck::default())
                        .map_err(|err| session_error("send failed", err))?;
                }
                Reply::Other(name) => debug!(message_type = name, "ignoring unrelated message"),
            },
            Err(RecvError::Timeout) => {
                if let Some(reason) = session.stop_reason() {
                    if listener.pending() == 0 {
                        return Err(CliError::new(
                            FAILURE,
                            format!("device stopped before replying: {reason:?}"),
                        ));
                    }
                }
            }
            Err(RecvError::Overflowed { missed }) => {
                warn!(missed, "events skipped while waiting for reply");
            }
            Err(err) => return Err(CliError::new(INTERNAL, format!("receive failed: {err}"))),
        }
    }
}

fn close(session: &Session<Endpoint>) {
    if !session.is_connected() {
        return;
    }
    if let Err(err) = session.close() {
        warn!(error = %err, "failed to close session");
    }
}

fn millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

fn print_ping(out: &PingOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Ping {}:", out.endpoint);
            println!("  Reply:    {}", out.reply);
            if let Some(code) = out.code {
                println!("  Code:     {code}");
            }
            println!(
                "  Message:  {}",
                out.message.as_deref().unwrap_or("(none)")
            );
            println!("  Latency:  {:.2}ms", out.latency_ms);
        }
    }
}
