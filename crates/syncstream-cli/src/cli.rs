use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "syncstream",
    version,
    about = "Synchronized multi-stream sample generator",
    long_about = "Generate test streams on a shared sample clock and drive them with \
                  timestamped start/pause/stop/marker commands.\n\
                  Run `simulate` for the streams and `control` for the command sender."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one or more simulated streams
    Simulate(SimulateArgs),
    /// Send control commands read from stdin to running streams
    Control(ControlArgs),
}

/// Clock discipline for every simulated stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClockArg {
    /// Arithmetic timestamps on a shared grid; late commands burst-replay
    Sync,
    /// Wall-clock timestamps; late commands drop the missed interval
    Realtime,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of streams
    #[arg(short = 'n', long, default_value_t = 1)]
    pub num_streams: u32,

    /// Channels per stream
    #[arg(short = 'c', long, default_value_t = 30)]
    pub num_channels: usize,

    /// Nominal sample rate in Hz
    #[arg(short = 's', long, default_value_t = 500.0)]
    pub sample_rate: f64,

    /// Channel functions, recycled across channels
    #[arg(long = "fn", default_values_t = vec!["counter".to_string()], num_args = 1..)]
    pub functions: Vec<String>,

    /// Content type reported with every batch
    #[arg(long, default_value = "data")]
    pub content_type: String,

    /// Latency budget in seconds
    #[arg(long, default_value_t = 0.2)]
    pub latency: f64,

    #[arg(long, value_enum, default_value_t = ClockArg::Sync)]
    pub clock: ClockArg,

    /// Listen for control commands on this UDP port; streams wait for `start`
    #[arg(long, env = "SYNCSTREAM_CONTROL_PORT")]
    pub control_port: Option<u16>,

    /// Stop after this many seconds of stream time
    #[arg(long)]
    pub max_time: Option<f64>,

    /// Stop after this many samples per stream
    #[arg(long)]
    pub max_samples: Option<u64>,

    /// Identifier added to every stream name
    #[arg(long)]
    pub name: Option<String>,

    /// JSON stream configuration; flags above are ignored when given
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(long)]
    pub debug: bool,
}

#[derive(Args, Debug)]
pub struct ControlArgs {
    /// Local address to send from
    #[arg(long, default_value = "0.0.0.0:0")]
    pub bind: SocketAddr,

    /// Stream listener addresses
    #[arg(long, required = true, num_args = 1..)]
    pub peer: Vec<SocketAddr>,

    /// Seconds between issuing a command and its execution time
    #[arg(long, default_value_t = 0.5)]
    pub latency: f64,

    /// Sender id; random when omitted
    #[arg(long)]
    pub sender_id: Option<u64>,

    /// Debug logging
    #[arg(long)]
    pub debug: bool,
}
