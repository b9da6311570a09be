use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use adbx_frame::TO_PEER;
use adbx_session::BackpressurePolicy;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept one peer and print every message it sends.
    Listen(ListenArgs),
    /// Connect, send messages on one channel and close the session.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Largest payload accepted from the peer, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Channel to send on.
    #[arg(long, short = 'c', default_value_t = TO_PEER)]
    pub channel: u16,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Send the payload N times.
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,
    /// Payload bytes allowed in flight before sending blocks.
    #[arg(long, value_name = "BYTES", env = "ADBX_MAX_OUTGOING")]
    pub max_outgoing: Option<usize>,
    /// Whether the in-flight ceiling applies per channel or to the session.
    #[arg(long, value_enum, default_value = "per-channel")]
    pub policy: PolicyArg,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum PolicyArg {
    PerChannel,
    Aggregate,
}

impl From<PolicyArg> for BackpressurePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::PerChannel => BackpressurePolicy::PerChannel,
            PolicyArg::Aggregate => BackpressurePolicy::Aggregate,
        }
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
