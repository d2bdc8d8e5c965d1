//! Command-line interface definition.

use std::net::{IpAddr, Ipv4Addr};

use clap::{Args, Parser, Subcommand, ValueEnum};

use framecast_core::TracingOutputFormat;
use framecast_protocol::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT};

/// framecast - length-prefixed message broadcasting over TCP
#[derive(Debug, Parser)]
#[command(name = "framecast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value_t = LogFormat::Compact,
        env = "FRAMECAST_LOG_FORMAT",
        global = true
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a text server: print received messages, broadcast stdin lines
    Serve(ServeArgs),

    /// Send text messages to a server and wait for one reply
    Send(SendArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, short, env = "FRAMECAST_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to listen on
    #[arg(long, env = "FRAMECAST_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Largest accepted payload in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: u32,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Server host name or address
    #[arg(long, env = "FRAMECAST_HOST", default_value = "localhost")]
    pub host: String,

    /// Server port
    #[arg(long, short, env = "FRAMECAST_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of times to send the message
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: u32,

    /// Pause between sends, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,

    /// Exit after sending instead of waiting for a reply
    #[arg(long)]
    pub no_wait: bool,

    /// Connect and read timeout in seconds
    #[arg(long, env = "FRAMECAST_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Text to send
    pub text: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => TracingOutputFormat::Pretty,
            LogFormat::Compact => TracingOutputFormat::Compact,
            LogFormat::Json => TracingOutputFormat::Json,
        }
    }
}
