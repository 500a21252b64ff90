use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hwlink_registry::catalog::{self, Initialize};
use hwlink_session::{Listener, RecvError, Session, StopReason};
use hwlink_transport::Endpoint;
use tracing::{debug, warn};

use crate::cmd::{endpoint, Context, MonitorArgs};
use crate::exit::{
    registry_error, session_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
};
use crate::output::{print_event, print_summary};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: MonitorArgs, ctx: &Context) -> CliResult<i32> {
    let mut config = ctx.config.clone();
    if let Some(overflow) = args.overflow {
        config.overflow_policy = overflow.into();
    }

    let endpoint = endpoint(&args.address, &config)?;
    let registry = Arc::new(catalog::registry().map_err(|err| registry_error("catalog", err))?);
    let session = Session::with_config(endpoint, Arc::clone(&registry), config)
        .map_err(|err| session_error("invalid config", err))?;

    let listener = Listener::new();
    session
        .add_listener(&listener)
        .map_err(|err| session_error("listener setup failed", err))?;
    session
        .connect()
        .map_err(|err| session_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    if args.initialize {
        session
            .send(&Initialize::default())
            .map_err(|err| session_error("send failed", err))?;
    }

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match listener.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                print_event(&event, &registry, ctx.format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvError::Timeout) => {
                if session.stop_reason().is_some() && listener.pending() == 0 {
                    break;
                }
            }
            Err(RecvError::Overflowed { missed }) => {
                warn!(missed, "output fell behind the device, events skipped");
            }
            Err(err) => {
                return Err(CliError::new(INTERNAL, format!("receive failed: {err}")));
            }
        }
    }

    finish(session, ctx)
}

fn finish(session: Session<Endpoint>, ctx: &Context) -> CliResult<i32> {
    let stop_reason = session.stop_reason();
    let stats = session.stats();
    let endpoint = session.describe();
    debug!(?stop_reason, "monitor finished");

    if session.is_connected() {
        session
            .close()
            .map_err(|err| session_error("close failed", err))?;
    }
    print_summary(&endpoint, stop_reason.as_ref(), &stats, ctx.format);

    match stop_reason {
        Some(StopReason::Fatal(message)) => Err(CliError::new(
            FAILURE,
            format!("device stream failed: {message}"),
        )),
        _ => Ok(SUCCESS),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
