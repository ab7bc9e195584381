use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use syncstream_control::{CommandReceiver, ReceiverConfig};
use syncstream_core::{ClockMode, SyncError, SyncResult};
use syncstream_runtime::{
    shared_origin, shutdown_channel, spawn_streams, ChannelFunction, LauncherConfig, StreamConfig,
    StreamProcess, TracingMetrics, TracingSink,
};
use syncstream_time::{SystemClock, WallClock};
use syncstream_transport::{UdpCommandTransport, DEFAULT_RECEIVE_BUFFER};

use crate::cli::{ClockArg, SimulateArgs};
use crate::exit_codes;

pub async fn execute(args: SimulateArgs) -> i32 {
    let launcher = match launcher_config(&args) {
        Ok(launcher) => launcher,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::CONFIG_ERROR;
        }
    };

    match run(launcher, args.control_port).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) if matches!(e, SyncError::InvalidConfiguration(_)) => {
            eprintln!("Error: {}", e);
            exit_codes::CONFIG_ERROR
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::TRANSPORT_ERROR
        }
    }
}

/// Stream configuration from a JSON file or the command-line flags
pub fn launcher_config(args: &SimulateArgs) -> SyncResult<LauncherConfig> {
    let mut stream = match &args.config {
        Some(path) => StreamConfig::from_json_file(path)?,
        None => {
            let latency = Duration::try_from_secs_f64(args.latency).map_err(|e| {
                SyncError::InvalidConfiguration(format!("latency {}: {e}", args.latency))
            })?;
            let functions = args
                .functions
                .iter()
                .map(|f| f.parse::<ChannelFunction>())
                .collect::<SyncResult<Vec<_>>>()?;
            let base = match args.clock {
                ClockArg::Sync => StreamConfig::synchronized(args.sample_rate, args.num_channels),
                ClockArg::Realtime => StreamConfig::realtime(args.sample_rate, args.num_channels),
            };
            StreamConfig {
                content_type: args.content_type.clone(),
                functions,
                latency_budget: latency,
                max_time: args.max_time,
                max_samples: args.max_samples,
                ..base
            }
        }
    };
    // Without a controller nothing would ever send `Start`.
    stream.auto_start = args.control_port.is_none();

    let mut launcher = LauncherConfig::new(args.num_streams, stream);
    launcher.name = args.name.clone();
    launcher.stream_configs(None)?;
    Ok(launcher)
}

async fn run(launcher: LauncherConfig, control_port: Option<u16>) -> SyncResult<()> {
    let wall: Arc<dyn WallClock> = Arc::new(SystemClock::unix());

    // Free-running synchronized streams share one origin; controlled ones
    // take theirs from the first `Start`.
    let origin = match (control_port, launcher.stream.mode) {
        (None, ClockMode::Synchronized) => {
            Some(shared_origin(&*wall, launcher.stream.latency_budget))
        }
        _ => None,
    };

    let mut processes = Vec::new();
    for (i, config) in launcher.stream_configs(origin)?.into_iter().enumerate() {
        tracing::info!(
            stream = %config.stream,
            name = %config.name,
            rate = config.sample_rate,
            channels = config.channel_count,
            mode = ?config.mode,
            "starting stream"
        );
        let sink = TracingSink::new(config.content_type.clone());
        let mut process = StreamProcess::new(config, wall.clone(), sink)?
            .with_metrics(Arc::new(TracingMetrics));

        if let Some(port) = control_port {
            let port = port.checked_add(i as u16).ok_or_else(|| {
                SyncError::InvalidConfiguration(format!("control port {port} + {i} overflows"))
            })?;
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let transport = UdpCommandTransport::bind(addr, wall.clone()).await?;
            tracing::info!(stream = i, listen = %transport.local_addr(), "waiting for commands");
            let receiver = CommandReceiver::new(
                Box::new(transport.subscribe(DEFAULT_RECEIVE_BUFFER)),
                ReceiverConfig::default(),
                wall.clone(),
            );
            process = process.with_receiver(receiver);
        }
        processes.push(process);
    }

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut handles = spawn_streams(processes, &shutdown_rx);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping streams");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut result = Ok(());
    for handle in handles.drain(..) {
        match handle.await {
            Ok(Ok(stats)) => tracing::info!(
                samples = stats.samples,
                burst = stats.burst_samples,
                dropped = stats.dropped_samples,
                late = stats.late_commands,
                "stream finished"
            ),
            Ok(Err(e)) => result = Err(e),
            Err(e) => {
                result = Err(SyncError::ChannelUnavailable(format!("stream task: {e}")));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn simulate(argv: &[&str]) -> SimulateArgs {
        let argv = ["syncstream", "simulate"].iter().chain(argv).copied();
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Simulate(args) => args,
            other => panic!("expected simulate, got {other:?}"),
        }
    }

    #[test]
    fn test_flags_build_launcher() {
        let launcher = launcher_config(&simulate(&["-n", "3", "--fn", "sine", "counter", "--name", "lab"])).unwrap();
        assert_eq!(launcher.num_streams, 3);
        assert!(launcher.stream.auto_start);
        assert_eq!(
            launcher.stream.functions,
            vec![ChannelFunction::Sine, ChannelFunction::Counter]
        );
        let configs = launcher.stream_configs(None).unwrap();
        assert_eq!(configs[2].name, "lab test stream 2 sine counter");
    }

    #[test]
    fn test_control_port_waits_for_start() {
        let launcher = launcher_config(&simulate(&["--clock", "realtime", "--control-port", "9100"])).unwrap();
        assert!(!launcher.stream.auto_start);
        assert_eq!(launcher.stream.mode, ClockMode::Realtime);
    }

    #[test]
    fn test_invalid_flags_rejected() {
        assert!(matches!(
            launcher_config(&simulate(&["--fn", "square"])),
            Err(SyncError::InvalidConfiguration(_))
        ));
        assert!(launcher_config(&simulate(&["--latency=-1"])).is_err());
        assert!(launcher_config(&simulate(&["-s", "0"])).is_err());
        assert!(launcher_config(&simulate(&["-n", "0"])).is_err());
    }
}
