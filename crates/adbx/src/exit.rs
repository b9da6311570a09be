use std::fmt;
use std::io;

use adbx_session::{FaultKind, SessionError, SessionFault, SessionState};
use adbx_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = err
        .io_source()
        .map_or(TRANSPORT_ERROR, |source| io_code(source.kind()));
    CliError::new(code, format!("{context}: {err}"))
}

pub fn fault_error(context: &str, fault: &SessionFault) -> CliError {
    let code = match fault.kind {
        FaultKind::Transport => TRANSPORT_ERROR,
        FaultKind::Framing | FaultKind::Protocol => DATA_INVALID,
    };
    CliError::new(code, format!("{context}: {fault}"))
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Ended {
            state: SessionState::Failed(fault),
            ..
        } => fault_error(context, &fault),
        SessionError::Stalled { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SessionError::MessageTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SessionError::ChannelLimit { .. }
        | SessionError::UnknownChannel(_)
        | SessionError::TableFull { .. }
        | SessionError::ReservedKind { .. }
        | SessionError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use adbx_frame::Message;

    use super::*;

    #[test]
    fn failed_session_maps_fault_kind() {
        let err = SessionError::Ended {
            state: SessionState::Failed(SessionFault::new(FaultKind::Framing, "bad magic")),
            message: None,
        };
        let cli = session_error("send failed", err);
        assert_eq!(cli.code, DATA_INVALID);
        assert!(cli.message.contains("bad magic"));
    }

    #[test]
    fn usage_errors_map_to_usage() {
        let err = SessionError::ChannelLimit {
            channel: 900,
            max: 256,
            message: Some(Message::new(900, "x")),
        };
        assert_eq!(session_error("send failed", err).code, USAGE);
        assert_eq!(
            session_error("init", SessionError::Config("bad".into())).code,
            USAGE
        );
    }

    #[test]
    fn permission_denied_keeps_its_code() {
        let err = TransportError::Connect {
            path: "/tmp/x.sock".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(transport_error("connect failed", err).code, PERMISSION_DENIED);
    }
}
