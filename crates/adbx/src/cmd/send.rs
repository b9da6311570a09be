use std::fs;

use adbx_session::{Discard, Session, SessionConfig, SessionState};
use adbx_transport::UnixDomainSocket;
use bytes::Bytes;
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{fault_error, io_error, session_error, transport_error, CliError, CliResult};
use crate::exit::{SUCCESS, USAGE};
use crate::output::{print_send_summary, OutputFormat, SendSummary};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.repeat == 0 {
        return Err(CliError::new(USAGE, "--repeat must be greater than zero"));
    }
    let payload = resolve_payload(&args)?;
    let config = session_config(&args);

    let stream = UnixDomainSocket::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let mut session = Session::init(stream, config, Discard)
        .map_err(|err| session_error("session failed", err))?;

    for _ in 0..args.repeat {
        session
            .send(args.channel, payload.clone())
            .map_err(|err| session_error("send failed", err))?;
    }
    debug!(
        channel = args.channel,
        messages = args.repeat,
        in_flight = session.total_in_flight(),
        "all messages queued"
    );

    session.shutdown();
    session
        .pump_while(|s| !s.is_terminal())
        .map_err(|err| session_error("shutdown failed", err))?;

    if let SessionState::Failed(fault) = session.state() {
        return Err(fault_error("shutdown failed", fault));
    }

    let summary = SendSummary {
        channel: args.channel,
        messages: args.repeat,
        bytes: payload.len().saturating_mul(args.repeat),
        state: session.state().to_string(),
    };
    print_send_summary(&summary, format);
    Ok(SUCCESS)
}

fn session_config(args: &SendArgs) -> SessionConfig {
    let mut config = SessionConfig {
        backpressure: args.policy.into(),
        ..SessionConfig::default()
    };
    if let Some(max_outgoing) = args.max_outgoing {
        config.max_outgoing_msg = max_outgoing;
    }
    config
}

fn resolve_payload(args: &SendArgs) -> CliResult<Bytes> {
    if let Some(data) = &args.data {
        return Ok(Bytes::copy_from_slice(data.as_bytes()));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(Bytes::from)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Bytes::new())
}
