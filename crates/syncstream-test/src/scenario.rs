//! Scenario harness - several streams and one controller on a manual clock
//!
//! Every tick runs all stream processes at the current manual time, then
//! advances the clock by one step. Stalls advance the clock without
//! ticking, which is how a descheduled process looks to the streams.

use std::sync::Arc;
use std::time::Duration;

use syncstream_control::{CommandReceiver, CommandSender, ReceiverConfig, SenderConfig};
use syncstream_core::{CommandPayload, ControlCommand, SyncResult, Timestamp};
use syncstream_runtime::{
    ProcessState, RecordingMetrics, RecordingObserver, StreamConfig, StreamEvent, StreamProcess, VecSink,
};
use syncstream_time::{ManualClock, WallClock};
use syncstream_transport::{BroadcastHub, CommandSource, CommandTransport};

use crate::chaos::{ChaosConfig, ChaosTransport};

/// Scenario configuration
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub streams: Vec<StreamConfig>,
    /// Manual clock reading at the first tick
    pub start: f64,
    /// Clock advance per tick
    pub step: Duration,
    /// Added to the clock when the controller stamps a command
    pub stamp_latency: Duration,
    /// Deliver commands through a chaos transport instead of a broadcast hub
    pub chaos: Option<ChaosConfig>,
    pub seed: u64,
}

impl ScenarioConfig {
    pub fn new(streams: Vec<StreamConfig>) -> Self {
        ScenarioConfig {
            streams,
            start: 0.0,
            step: Duration::from_millis(10),
            stamp_latency: Duration::ZERO,
            chaos: None,
            seed: 0x5eed,
        }
    }

    pub fn with_chaos(mut self, chaos: ChaosConfig) -> Self {
        self.chaos = Some(chaos);
        self
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn starting_at(mut self, start: f64) -> Self {
        self.start = start;
        self
    }
}

/// One simulated stream with everything it produced
pub struct ScenarioStream {
    pub process: StreamProcess,
    pub sink: VecSink,
    pub observer: RecordingObserver,
    pub metrics: RecordingMetrics,
    pub events: Vec<StreamEvent>,
}

impl ScenarioStream {
    /// Every warning the stream reported, in order
    pub fn warnings(&self) -> Vec<&syncstream_core::SyncError> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Warning(w) => Some(w),
                _ => None,
            })
            .collect()
    }
}

/// Streams plus controller driven by one manual clock
pub struct Scenario {
    wall: Arc<ManualClock>,
    step: f64,
    sender: CommandSender,
    streams: Vec<ScenarioStream>,
    chaos: Option<ChaosTransport>,
}

impl Scenario {
    pub fn new(config: ScenarioConfig) -> SyncResult<Self> {
        let wall = Arc::new(ManualClock::new(config.start));

        let hub = Arc::new(BroadcastHub::default());
        let chaos = config
            .chaos
            .map(|chaos| ChaosTransport::new(chaos, config.seed, wall.clone()));
        let transport: Arc<dyn CommandTransport> = match &chaos {
            Some(chaos) => Arc::new(chaos.clone()),
            None => hub.clone(),
        };

        let mut streams = Vec::with_capacity(config.streams.len());
        for stream_config in config.streams {
            let source: Box<dyn CommandSource> = match &chaos {
                Some(chaos) => Box::new(chaos.subscribe()),
                None => Box::new(hub.subscribe()?),
            };
            let receiver = CommandReceiver::new(source, ReceiverConfig::default(), wall.clone());
            let sink = VecSink::new();
            let observer = RecordingObserver::new();
            let metrics = RecordingMetrics::new();
            let process = StreamProcess::new(stream_config, wall.clone(), sink.clone())?
                .with_receiver(receiver)
                .with_metrics(Arc::new(metrics.clone()))
                .with_observer(observer.clone());
            streams.push(ScenarioStream {
                process,
                sink,
                observer,
                metrics,
                events: Vec::new(),
            });
        }

        let sender = CommandSender::new(
            SenderConfig {
                sender_id: Some(config.seed),
                stamp_latency: config.stamp_latency,
            },
            wall.clone(),
        )
        .with_transport(transport);

        Ok(Scenario {
            wall,
            step: config.step.as_secs_f64(),
            sender,
            streams,
            chaos,
        })
    }

    pub fn now(&self) -> Timestamp {
        self.wall.now()
    }

    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.wall
    }

    /// Issue a command stamped with the controller's latency
    pub fn issue(&mut self, payload: CommandPayload) -> SyncResult<Arc<ControlCommand>> {
        self.sender.issue(payload)
    }

    /// Issue a command for an explicit time
    pub fn issue_at(&mut self, payload: CommandPayload, t: f64) -> SyncResult<Arc<ControlCommand>> {
        self.sender.issue_at(payload, Timestamp(t))
    }

    /// Tick every stream at the current time, then advance one step
    pub fn tick(&mut self) -> SyncResult<()> {
        for stream in &mut self.streams {
            let events = stream.process.tick()?;
            stream.events.extend(events);
        }
        self.wall.advance(self.step);
        Ok(())
    }

    /// Tick until the clock passes `t` or every stream stopped
    pub fn run_until(&mut self, t: f64) -> SyncResult<()> {
        while self.now().0 < t && !self.all_stopped() {
            self.tick()?;
        }
        Ok(())
    }

    /// Advance the clock by `secs` without ticking
    pub fn stall(&mut self, secs: f64) {
        self.wall.advance(secs);
    }

    pub fn stream(&self, index: usize) -> &ScenarioStream {
        &self.streams[index]
    }

    pub fn streams(&self) -> &[ScenarioStream] {
        &self.streams
    }

    pub fn chaos(&self) -> Option<&ChaosTransport> {
        self.chaos.as_ref()
    }

    pub fn all_stopped(&self) -> bool {
        self.streams
            .iter()
            .all(|s| s.process.state() == ProcessState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncstream_core::StreamId;

    fn synchronized(stream: u32) -> StreamConfig {
        StreamConfig {
            stream: StreamId::new(stream),
            batch_size: Some(1),
            ..StreamConfig::synchronized(10.0, 2)
        }
    }

    #[test]
    fn test_start_reaches_every_stream() {
        let mut scenario =
            Scenario::new(ScenarioConfig::new(vec![synchronized(0), synchronized(1)])).unwrap();
        scenario.tick().unwrap();
        scenario.issue_at(CommandPayload::Start, 0.5).unwrap();
        scenario.run_until(1.0).unwrap();

        for stream in scenario.streams() {
            assert_eq!(stream.process.scheduler().clock().origin(), Some(Timestamp(0.5)));
            assert_eq!(stream.sink.timestamps()[0], Timestamp(0.5));
            assert_eq!(stream.observer.executions().len(), 1);
        }
    }

    #[test]
    fn test_stall_advances_without_ticking() {
        let mut scenario = Scenario::new(ScenarioConfig::new(vec![synchronized(0)])).unwrap();
        scenario.tick().unwrap();
        let ticks = scenario.stream(0).process.stats().ticks;
        scenario.stall(2.0);
        assert!(scenario.now().0 > 2.0);
        assert_eq!(scenario.stream(0).process.stats().ticks, ticks);
    }
}
