//! Chaos transport - command delivery under hostile network conditions
//!
//! Simulates per subscriber:
//! - Delay and jitter
//! - Loss, including bursts
//! - Reordering
//! - Duplication
//!
//! Delivery follows a `WallClock`, so a manual clock drives it
//! deterministically together with the streams.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use syncstream_core::{ControlCommand, SyncError, SyncResult, Timestamp};
use syncstream_time::WallClock;
use syncstream_transport::{CommandSource, CommandTransport, ReceivedCommand};

/// Jitter distribution type
#[derive(Clone, Debug)]
pub enum JitterDistribution {
    /// No jitter
    None,
    Uniform { min_ms: u32, max_ms: u32 },
    /// Pareto distribution (heavy tail), capped at one second
    Pareto { scale_ms: f64, shape: f64 },
}

impl JitterDistribution {
    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        match self {
            JitterDistribution::None => Duration::ZERO,
            JitterDistribution::Uniform { min_ms, max_ms } => {
                let dist = Uniform::new_inclusive(*min_ms, (*max_ms).max(*min_ms));
                Duration::from_millis(dist.sample(rng) as u64)
            }
            JitterDistribution::Pareto { scale_ms, shape } => {
                let u: f64 = rng.gen_range(f64::EPSILON..1.0);
                let value = scale_ms / u.powf(1.0 / shape);
                Duration::from_millis(value.min(1000.0) as u64)
            }
        }
    }
}

/// Network chaos configuration
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    pub base_latency: Duration,
    pub jitter: JitterDistribution,
    /// Packet loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    pub burst_loss_prob: f64,
    pub burst_length: (u32, u32),
    pub reorder_prob: f64,
    /// Max positions a reordered command jumps ahead
    pub reorder_depth: u32,
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(50),
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 50,
            },
            loss_rate: 0.01,
            burst_loss_prob: 0.0,
            burst_length: (2, 5),
            reorder_prob: 0.05,
            reorder_depth: 3,
            duplicate_prob: 0.01,
        }
    }
}

impl ChaosConfig {
    /// Fixed delay, nothing else
    pub fn delay(latency: Duration) -> Self {
        ChaosConfig {
            base_latency: latency,
            jitter: JitterDistribution::None,
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            reorder_prob: 0.0,
            reorder_depth: 0,
            duplicate_prob: 0.0,
        }
    }

    /// LAN-like conditions
    pub fn good() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(2),
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 5,
            },
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (1, 1),
            reorder_prob: 0.01,
            reorder_depth: 2,
            duplicate_prob: 0.001,
        }
    }

    /// Every command arrives, duplicated and out of order
    pub fn duplicating() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(20),
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 40,
            },
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (1, 1),
            reorder_prob: 0.3,
            reorder_depth: 4,
            duplicate_prob: 0.5,
        }
    }

    /// Heavy-tailed delays past typical latency budgets, with loss
    pub fn hostile() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(200),
            jitter: JitterDistribution::Pareto {
                scale_ms: 100.0,
                shape: 1.2,
            },
            loss_rate: 0.15,
            burst_loss_prob: 0.05,
            burst_length: (2, 6),
            reorder_prob: 0.2,
            reorder_depth: 10,
            duplicate_prob: 0.05,
        }
    }
}

/// Chaos transport statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChaosStats {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
    pub reordered: u64,
    pub duplicated: u64,
    pub max_latency_ms: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 / self.sent as f64
        }
    }
}

#[derive(Clone, Debug)]
struct InFlight {
    command: Arc<ControlCommand>,
    sent_at: Timestamp,
    deliver_at: Timestamp,
}

struct ChaosState {
    config: ChaosConfig,
    rng: StdRng,
    queues: Vec<VecDeque<InFlight>>,
    burst_remaining: u32,
    stats: ChaosStats,
}

impl ChaosState {
    fn should_drop(&mut self) -> bool {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }
        if self.rng.gen::<f64>() < self.config.burst_loss_prob {
            let (min, max) = self.config.burst_length;
            self.burst_remaining = self.rng.gen_range(min..=max.max(min));
            return true;
        }
        self.rng.gen::<f64>() < self.config.loss_rate
    }

    fn enqueue(&mut self, queue: usize, command: &Arc<ControlCommand>, now: Timestamp) {
        self.stats.sent += 1;
        if self.should_drop() {
            self.stats.lost += 1;
            return;
        }

        let latency = self.config.base_latency + self.config.jitter.sample(&mut self.rng);
        let packet = InFlight {
            command: Arc::clone(command),
            sent_at: now,
            deliver_at: now + latency,
        };

        let reorder = self.rng.gen::<f64>() < self.config.reorder_prob;
        let in_flight = self.queues[queue].len();
        if reorder && in_flight > 0 {
            let depth = self.config.reorder_depth.min(in_flight as u32);
            let jump = self.rng.gen_range(0..=depth) as usize;
            self.queues[queue].insert(in_flight - jump, packet.clone());
            self.stats.reordered += 1;
        } else {
            self.queues[queue].push_back(packet.clone());
        }

        if self.rng.gen::<f64>() < self.config.duplicate_prob {
            let extra = self.config.jitter.sample(&mut self.rng);
            self.queues[queue].push_back(InFlight {
                deliver_at: packet.deliver_at + extra,
                ..packet
            });
            self.stats.duplicated += 1;
        }
    }
}

/// Command transport that delivers through simulated network chaos
#[derive(Clone)]
pub struct ChaosTransport {
    state: Arc<Mutex<ChaosState>>,
    wall: Arc<dyn WallClock>,
}

impl ChaosTransport {
    /// Create a transport with a fixed RNG seed
    pub fn new(config: ChaosConfig, seed: u64, wall: Arc<dyn WallClock>) -> Self {
        ChaosTransport {
            state: Arc::new(Mutex::new(ChaosState {
                config,
                rng: StdRng::seed_from_u64(seed),
                queues: Vec::new(),
                burst_remaining: 0,
                stats: ChaosStats::default(),
            })),
            wall,
        }
    }

    /// New receiving end; sees commands broadcast after this call
    pub fn subscribe(&self) -> ChaosSource {
        let mut state = self.state.lock();
        state.queues.push(VecDeque::new());
        ChaosSource {
            state: Arc::clone(&self.state),
            wall: Arc::clone(&self.wall),
            queue: state.queues.len() - 1,
        }
    }

    pub fn stats(&self) -> ChaosStats {
        self.state.lock().stats.clone()
    }

    /// Commands still in flight across all subscribers
    pub fn in_flight(&self) -> usize {
        self.state.lock().queues.iter().map(VecDeque::len).sum()
    }
}

impl CommandTransport for ChaosTransport {
    fn broadcast(&self, command: &Arc<ControlCommand>) -> SyncResult<()> {
        let now = self.wall.now();
        let mut state = self.state.lock();
        if state.queues.is_empty() {
            return Err(SyncError::ChannelUnavailable("no chaos subscribers".into()));
        }
        for queue in 0..state.queues.len() {
            state.enqueue(queue, command, now);
        }
        Ok(())
    }
}

/// Receiving end of a `ChaosTransport`
pub struct ChaosSource {
    state: Arc<Mutex<ChaosState>>,
    wall: Arc<dyn WallClock>,
    queue: usize,
}

impl CommandSource for ChaosSource {
    fn try_recv(&mut self) -> SyncResult<Option<ReceivedCommand>> {
        let now = self.wall.now();
        let mut state = self.state.lock();
        let due = state.queues[self.queue]
            .iter()
            .position(|p| p.deliver_at <= now);
        let Some(packet) = due.and_then(|pos| state.queues[self.queue].remove(pos)) else {
            return Ok(None);
        };

        let latency = (packet.deliver_at.since(packet.sent_at) * 1000.0) as u64;
        state.stats.delivered += 1;
        state.stats.max_latency_ms = state.stats.max_latency_ms.max(latency);
        Ok(Some(ReceivedCommand {
            command: packet.command,
            sent_at: Some(packet.sent_at),
        }))
    }
}
