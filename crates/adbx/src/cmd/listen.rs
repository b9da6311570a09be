use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adbx_session::{
    Delivery, MessageSink, Routing, Session, SessionConfig, SessionState, SinkError,
};
use adbx_transport::{Transport, UnixDomainSocket};
use tracing::{debug, info};

use crate::cmd::ListenArgs;
use crate::exit::{fault_error, session_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

/// Upper bound on one readiness wait so Ctrl-C is noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Prints messages routed to the special channels as they arrive.
struct PrintSink {
    format: OutputFormat,
    printed: usize,
}

impl MessageSink for PrintSink {
    fn on_control_message(&mut self, delivery: Delivery) -> Result<(), SinkError> {
        print_message(
            delivery.channel(),
            Routing::Dispatch,
            delivery.payload(),
            self.format,
        );
        self.printed = self.printed.saturating_add(1);
        Ok(())
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let stream = listener
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;

    let mut config = SessionConfig {
        poll_timeout: Some(POLL_INTERVAL),
        ..SessionConfig::default()
    };
    if let Some(max_payload) = args.max_payload {
        config.max_payload_size = max_payload;
    }
    let sink = PrintSink { format, printed: 0 };
    let mut session =
        Session::init(stream, config, sink).map_err(|err| session_error("session failed", err))?;

    let done = |printed: usize| args.count.is_some_and(|count| printed >= count);

    loop {
        session
            .pump_while(|s| {
                running.load(Ordering::SeqCst)
                    && !s.is_terminal()
                    && !done(s.sink().printed)
                    && !has_buffered(s)
            })
            .map_err(|err| session_error("session failed", err))?;

        print_buffered(&mut session, format, &done);

        if done(session.sink().printed) {
            debug!(printed = session.sink().printed, "message count reached");
            break;
        }
        if !running.load(Ordering::SeqCst) {
            info!("interrupted");
            break;
        }
        if session.is_terminal() {
            break;
        }
    }

    if let SessionState::Failed(fault) = session.state() {
        return Err(fault_error("session failed", fault));
    }
    info!(
        printed = session.sink().printed,
        state = %session.state(),
        "listener finished"
    );
    Ok(SUCCESS)
}

fn has_buffered<T: Transport>(session: &Session<T, PrintSink>) -> bool {
    session
        .channels()
        .iter()
        .any(|channel| channel.buffered() > 0)
}

fn print_buffered<T, F>(session: &mut Session<T, PrintSink>, format: OutputFormat, done: &F)
where
    T: Transport,
    F: Fn(usize) -> bool,
{
    let ready: Vec<u16> = session
        .channels()
        .iter()
        .filter(|channel| channel.buffered() > 0)
        .map(|channel| channel.id())
        .collect();

    for id in ready {
        while !done(session.sink().printed) {
            let Some(payload) = session.recv(id) else {
                break;
            };
            print_message(id, Routing::Buffer, &payload, format);
            let sink = session.sink_mut();
            sink.printed = sink.printed.saturating_add(1);
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
