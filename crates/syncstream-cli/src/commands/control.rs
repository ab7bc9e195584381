use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use syncstream_control::{CommandSender, SenderConfig};
use syncstream_core::{CommandPayload, SyncError, SyncResult};
use syncstream_time::{SystemClock, WallClock};
use syncstream_transport::{Backoff, BackoffConfig, UdpCommandTransport};

use crate::cli::ControlArgs;
use crate::exit_codes;

/// Attempts per command before giving up on the transport
const MAX_SEND_ATTEMPTS: u32 = 5;

pub async fn execute(args: ControlArgs) -> i32 {
    let stamp_latency = match Duration::try_from_secs_f64(args.latency) {
        Ok(latency) => latency,
        Err(e) => {
            eprintln!("Error: latency {}: {}", args.latency, e);
            return exit_codes::CONFIG_ERROR;
        }
    };

    let wall: Arc<dyn WallClock> = Arc::new(SystemClock::unix());
    let transport = match UdpCommandTransport::bind(args.bind, wall.clone()).await {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::TRANSPORT_ERROR;
        }
    };
    for peer in &args.peer {
        transport.add_peer(*peer);
    }

    let sender = CommandSender::new(
        SenderConfig {
            sender_id: args.sender_id,
            stamp_latency,
        },
        wall,
    )
    .with_transport(transport);
    tracing::info!(sender = %sender.sender_id(), peers = args.peer.len(), "controller ready");

    match read_commands(sender).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::TRANSPORT_ERROR
        }
    }
}

/// Issue one command per stdin line until end of input
async fn read_commands(mut sender: CommandSender) -> SyncResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut backoff = Backoff::new(BackoffConfig::default());

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| SyncError::ChannelUnavailable(format!("stdin: {e}")))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let payload = match line.parse::<CommandPayload>() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };
        send_with_backoff(&mut sender, payload, &mut backoff).await?;
    }
    Ok(())
}

async fn send_with_backoff(
    sender: &mut CommandSender,
    payload: CommandPayload,
    backoff: &mut Backoff,
) -> SyncResult<()> {
    loop {
        match sender.issue(payload.clone()) {
            Ok(command) => {
                backoff.reset();
                tracing::info!(command = %command, "sent");
                return Ok(());
            }
            Err(e @ SyncError::ChannelUnavailable(_)) if backoff.attempts() + 1 < MAX_SEND_ATTEMPTS => {
                let delay = backoff.next_delay();
                tracing::warn!(error = %e, retry_in = ?delay, "send failed");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
