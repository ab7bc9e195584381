//! Stream process - one data stream's tick loop
//!
//! Each tick runs in stages:
//! 1. Emit the next due batch
//! 2. Poll the command channel (non-blocking)
//! 3. Reconcile each accepted command and apply its catch-up decision
//! 4. Execute pending commands whose execution point was reached
//!
//! Recoverable conditions never fail a tick; they come back as
//! `StreamEvent::Warning` and are logged through the warning limiter.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use syncstream_core::{
    CommandPayload, ControlCommand, SampleBatch, StreamId, SyncError, SyncResult, Timestamp,
};
use syncstream_control::CommandReceiver;
use syncstream_time::{
    BatchKind, CatchUpDecision, CatchUpPolicy, ClockSource, EmissionPosition, ExecutionTarget,
    LookaheadScheduler, Reconciliation, ScheduledBatch, WallClock, GRID_EPSILON,
};
use syncstream_transport::Backoff;

use crate::metrics::{
    BEHIND_SCHEDULE, BURST_SAMPLES, DROPPED_SAMPLES, LATE_COMMANDS, STALE_COMMANDS,
};
use crate::{
    CommandExecution, CommandObserver, MetricSink, NoopMetrics, NoopObserver, SampleSink,
    SignalGenerator, StreamConfig, StreamEvent, WarningKind, WarningLimiter,
};

/// Lifecycle of a stream process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Initializing => "initializing",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessStats {
    pub ticks: u64,
    pub batches: u64,
    pub samples: u64,
    pub burst_samples: u64,
    pub dropped_samples: u64,
    pub behind_batches: u64,
    pub late_commands: u64,
    pub stale_commands: u64,
    pub commands_executed: u64,
    pub last_timestamp: Option<Timestamp>,
}

#[derive(Debug)]
struct PendingCommand {
    command: Arc<ControlCommand>,
    target: ExecutionTarget,
    reconciliation: Option<Reconciliation>,
}

/// One data stream: clock, scheduler, command handling and sink
pub struct StreamProcess {
    config: StreamConfig,
    state: ProcessState,
    scheduler: LookaheadScheduler,
    policy: CatchUpPolicy,
    generator: SignalGenerator,
    wall: Arc<dyn WallClock>,
    receiver: Option<CommandReceiver>,
    sink: Box<dyn SampleSink>,
    metrics: Arc<dyn MetricSink>,
    observer: Box<dyn CommandObserver>,
    limiter: WarningLimiter,
    backoff: Backoff,
    retry_at: Option<Timestamp>,
    pending: VecDeque<PendingCommand>,
    /// Position before this tick's realtime re-anchor, if any
    reanchored_from: Option<EmissionPosition>,
    /// Timestamp of the first emitted sample
    start_time: Option<Timestamp>,
    stats: ProcessStats,
    events: Vec<StreamEvent>,
}

impl StreamProcess {
    /// Create a process; fails with `InvalidConfiguration` on a bad config
    pub fn new(
        config: StreamConfig,
        wall: Arc<dyn WallClock>,
        sink: impl SampleSink + 'static,
    ) -> SyncResult<Self> {
        config.validate()?;
        let clock = ClockSource::new(config.mode, config.sample_rate, config.origin)?;
        let scheduler = LookaheadScheduler::new(clock, config.scheduler_config())?;
        let generator = SignalGenerator::new(
            config.stream,
            config.functions.clone(),
            config.channel_count,
            config.sample_rate,
        )?;

        Ok(StreamProcess {
            policy: CatchUpPolicy::new(config.policy_config()),
            limiter: WarningLimiter::new(config.warnings.clone()),
            backoff: Backoff::new(config.backoff.clone()),
            config,
            state: ProcessState::Initializing,
            scheduler,
            generator,
            wall,
            receiver: None,
            sink: Box::new(sink),
            metrics: Arc::new(NoopMetrics),
            observer: Box::new(NoopObserver),
            retry_at: None,
            pending: VecDeque::new(),
            reanchored_from: None,
            start_time: None,
            stats: ProcessStats::default(),
            events: Vec::new(),
        })
    }

    pub fn with_receiver(mut self, receiver: CommandReceiver) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_observer(mut self, observer: impl CommandObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn stream(&self) -> StreamId {
        self.config.stream
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn stats(&self) -> &ProcessStats {
        &self.stats
    }

    pub fn scheduler(&self) -> &LookaheadScheduler {
        &self.scheduler
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ProcessState::Stopped
    }

    /// Commands received but not yet executed
    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// Enter `Stopping`; the next tick finishes the process
    pub fn request_stop(&mut self) {
        if matches!(self.state, ProcessState::Initializing | ProcessState::Running) {
            self.set_state(ProcessState::Stopping);
        }
    }

    /// Run one tick
    pub fn tick(&mut self) -> SyncResult<Vec<StreamEvent>> {
        let now = self.wall.now();
        self.stats.ticks += 1;
        self.reanchored_from = None;

        match self.state {
            ProcessState::Stopped => return Ok(Vec::new()),
            ProcessState::Stopping => {
                self.finish();
                return Ok(std::mem::take(&mut self.events));
            }
            ProcessState::Initializing => self.enter_running(now),
            ProcessState::Running => {}
        }

        // Time-targeted commands due before anything is generated
        self.execute_reached(now)?;

        // Stage 1: emit
        if self.state == ProcessState::Running {
            if let Some(batch) = self.scheduler.poll(now, &*self.wall) {
                if let Some(behind) = batch.behind {
                    self.stats.behind_batches += 1;
                    self.metrics.publish_metric(BEHIND_SCHEDULE, 1.0);
                    self.warn(
                        SyncError::SchedulingBehind {
                            stream: self.config.stream,
                            behind,
                        },
                        now,
                    );
                }
                if let Some(reanchor) = batch.reanchor {
                    // Commands this tick are judged against what was actually emitted.
                    self.reanchored_from = Some(reanchor.from);
                    let resume_index = reanchor.from.next_index + reanchor.dropped;
                    self.record_dropped(reanchor.dropped, resume_index, now);
                }
                self.emit(batch)?;
            }
            self.execute_reached(now)?;
        }

        // Stage 2: poll
        let commands = self.poll_commands(now);

        // Stage 3: reconcile and apply
        for command in commands {
            if self.state != ProcessState::Running {
                tracing::debug!(stream = %self.config.stream, command = %command, "command ignored while {}", self.state);
                continue;
            }
            self.handle_command(command, now)?;
            self.execute_reached(now)?;
        }

        Ok(std::mem::take(&mut self.events))
    }

    /// Time until the next tick has work to do, at most one poll interval
    pub fn next_delay(&self) -> Duration {
        let poll = self.config.poll_interval;
        if self.state != ProcessState::Running {
            return Duration::ZERO;
        }
        let now = self.wall.now();
        let wake = [
            self.scheduler.wake_time(),
            self.pending.front().and_then(|p| self.time_target(p.target)),
            self.retry_at,
        ]
        .into_iter()
        .flatten()
        .reduce(Timestamp::min);

        match wake {
            Some(t) => {
                let secs = t.since(now);
                if secs <= 0.0 {
                    Duration::ZERO
                } else {
                    Duration::from_secs_f64(secs).min(poll)
                }
            }
            None => poll,
        }
    }

    fn enter_running(&mut self, now: Timestamp) {
        self.set_state(ProcessState::Running);
        if self.config.auto_start {
            let start = self.scheduler.clock().origin().unwrap_or(now);
            self.scheduler.resume_at(start, self.policy.boundary());
            tracing::info!(stream = %self.config.stream, mode = %self.config.mode, start = %start, "stream started");
        } else {
            tracing::info!(stream = %self.config.stream, mode = %self.config.mode, "waiting for start command");
        }
    }

    fn finish(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(
                stream = %self.config.stream,
                pending = self.pending.len(),
                "discarding unexecuted commands"
            );
            self.pending.clear();
        }
        self.set_state(ProcessState::Stopped);
        tracing::info!(
            stream = %self.config.stream,
            samples = self.stats.samples,
            batches = self.stats.batches,
            "stream stopped"
        );
    }

    fn set_state(&mut self, state: ProcessState) {
        if self.state != state {
            tracing::debug!(stream = %self.config.stream, from = %self.state, to = %state, "state change");
            self.state = state;
            self.events.push(StreamEvent::StateChanged(state));
        }
    }

    fn begin_stop(&mut self, reason: &str) {
        if self.state == ProcessState::Running {
            tracing::info!(stream = %self.config.stream, reason, "stopping");
            self.set_state(ProcessState::Stopping);
        }
    }

    /// Generate channel data for a scheduled batch and push it to the sink
    fn emit(&mut self, batch: ScheduledBatch) -> SyncResult<()> {
        let mut slots = batch.slots;
        let mut limit_reached = false;

        if let Some(max_samples) = self.config.max_samples {
            let room = max_samples.saturating_sub(self.stats.samples) as usize;
            if slots.len() >= room {
                slots.truncate(room);
                limit_reached = true;
            }
        }
        if self.start_time.is_none() {
            self.start_time = slots.first().map(|s| s.timestamp);
        }
        if let (Some(max_time), Some(start)) = (self.config.max_time, self.start_time) {
            let before = slots.len();
            slots.retain(|s| s.timestamp.since(start) + GRID_EPSILON < max_time);
            let next_elapsed = slots
                .last()
                .map(|s| s.timestamp.since(start) + self.scheduler.clock().period());
            if slots.len() < before || next_elapsed.is_some_and(|e| e + GRID_EPSILON >= max_time) {
                limit_reached = true;
            }
        }

        if !slots.is_empty() {
            if let (Some(first), Some(last)) = (slots.first(), self.stats.last_timestamp) {
                if first.timestamp <= last {
                    return Err(SyncError::InvalidSample(format!(
                        "{} timestamp {} does not follow {}",
                        self.config.stream, first.timestamp, last
                    )));
                }
            }

            let start = self.start_time.unwrap_or(slots[0].timestamp);
            let mut out = SampleBatch::with_capacity(self.config.stream, self.config.channel_count, slots.len());
            for slot in &slots {
                let values = self.generator.generate(slot.index, slot.timestamp.since(start));
                out.push(slot.index, slot.timestamp, values)?;
            }
            self.sink.push_batch(&out)?;

            self.stats.batches += 1;
            self.stats.samples += out.len() as u64;
            self.stats.last_timestamp = out.last_timestamp();
            if batch.kind == BatchKind::Burst {
                self.stats.burst_samples += out.len() as u64;
                self.metrics.publish_metric(BURST_SAMPLES, out.len() as f64);
            }
        }

        if limit_reached {
            self.begin_stop("sample limit reached");
        }
        Ok(())
    }

    fn poll_commands(&mut self, now: Timestamp) -> Vec<Arc<ControlCommand>> {
        if self.retry_at.is_some_and(|retry| now < retry) {
            return Vec::new();
        }
        let Some(receiver) = self.receiver.as_mut() else {
            return Vec::new();
        };
        let polled = receiver.poll();
        let rejected = receiver.drain_rejected();

        for error in rejected {
            self.stats.stale_commands += 1;
            self.metrics.publish_metric(STALE_COMMANDS, 1.0);
            self.warn(error, now);
        }

        match polled {
            Ok(commands) => {
                if self.retry_at.take().is_some() {
                    self.backoff.reset();
                    tracing::info!(stream = %self.config.stream, "command channel recovered");
                }
                commands
            }
            Err(error) => {
                let delay = self.backoff.next_delay();
                self.retry_at = Some(now + delay);
                tracing::debug!(stream = %self.config.stream, retry_in = ?delay, "command channel retry scheduled");
                self.warn(error, now);
                Vec::new()
            }
        }
    }

    fn handle_command(&mut self, command: Arc<ControlCommand>, now: Timestamp) -> SyncResult<()> {
        tracing::debug!(stream = %self.config.stream, command = %command, "command received");
        let target = self.policy.target(self.scheduler.clock(), command.issue_time);

        if command.payload == CommandPayload::Start {
            let blocked = self
                .pending
                .iter()
                .any(|p| matches!(p.command.payload, CommandPayload::Pause | CommandPayload::Stop));
            if blocked {
                self.pending.push_back(PendingCommand {
                    command,
                    target,
                    reconciliation: None,
                });
                return Ok(());
            }
            return self.execute_start(command, now);
        }

        let reconciliation = self.policy.reconcile(
            self.scheduler.clock(),
            command.issue_time,
            now,
            self.emission_position(),
        );
        if let Reconciliation::Late {
            lateness, decision, ..
        } = &reconciliation
        {
            self.catch_up(&command, *lateness, decision, now)?;
        }

        if let (CommandPayload::Pause | CommandPayload::Stop, ExecutionTarget::Index(n)) =
            (&command.payload, target)
        {
            self.scheduler.limit_at(n);
        }
        self.pending.push_back(PendingCommand {
            command,
            target,
            reconciliation: Some(reconciliation),
        });
        Ok(())
    }

    /// Begin or resume emission at the command time
    fn execute_start(&mut self, command: Arc<ControlCommand>, now: Timestamp) -> SyncResult<()> {
        let t = command.issue_time;
        if !self.scheduler.is_held() {
            // Already running
            let reconciliation = self.policy.reconcile(self.scheduler.clock(), t, now, self.emission_position());
            let target = reconciliation.target();
            self.record(command, target, reconciliation);
            return Ok(());
        }

        self.scheduler.resume_at(t, self.policy.boundary());
        for pending in &self.pending {
            if let (CommandPayload::Pause | CommandPayload::Stop, ExecutionTarget::Index(n)) =
                (&pending.command.payload, pending.target)
            {
                self.scheduler.limit_at(n);
            }
        }

        // Slots missed since `t` count from `t`, not from the last emission.
        let position = EmissionPosition {
            last_index: None,
            last_timestamp: None,
            ..self.scheduler.position()
        };
        let reconciliation = self.policy.reconcile(self.scheduler.clock(), t, now, position);
        if let Reconciliation::Late {
            lateness, decision, ..
        } = &reconciliation
        {
            self.catch_up(&command, *lateness, decision, now)?;
        }
        tracing::info!(stream = %self.config.stream, start = %t, "start command executed");
        let target = reconciliation.target();
        self.record(command, target, reconciliation);
        Ok(())
    }

    fn catch_up(
        &mut self,
        command: &ControlCommand,
        lateness: f64,
        decision: &CatchUpDecision,
        now: Timestamp,
    ) -> SyncResult<()> {
        self.stats.late_commands += 1;
        self.metrics.publish_metric(LATE_COMMANDS, 1.0);
        self.warn(
            SyncError::LateCommand {
                stream: self.config.stream,
                command: command.id,
                lateness,
            },
            now,
        );

        if self.scheduler.is_held() {
            return Ok(());
        }
        match decision {
            CatchUpDecision::Burst { missing } => {
                for batch in self.scheduler.replay(missing.clone(), &*self.wall) {
                    self.emit(batch)?;
                }
            }
            CatchUpDecision::DropResume { resume_index, .. } => {
                // A re-anchor earlier this tick may already have skipped these.
                let skipped = self.scheduler.fast_forward(*resume_index, now);
                let resume_index = self.scheduler.position().next_index;
                self.record_dropped(skipped, resume_index, now);
            }
        }
        Ok(())
    }

    fn record_dropped(&mut self, dropped: u64, resume_index: u64, now: Timestamp) {
        if dropped == 0 {
            return;
        }
        self.stats.dropped_samples += dropped;
        self.metrics.publish_metric(DROPPED_SAMPLES, dropped as f64);
        if let Some(suppressed) = self.limiter.admit(WarningKind::DroppedSamples, now) {
            tracing::warn!(
                stream = %self.config.stream,
                dropped,
                resume_index,
                suppressed,
                "dropped {dropped} samples catching up - increase latency"
            );
        }
        self.events.push(StreamEvent::SamplesDropped {
            dropped,
            resume_index,
        });
    }

    /// Emission position commands are reconciled against
    fn emission_position(&self) -> EmissionPosition {
        self.reanchored_from.unwrap_or_else(|| self.scheduler.position())
    }

    /// Execute queued commands, in order, up to the first not yet reached
    fn execute_reached(&mut self, now: Timestamp) -> SyncResult<()> {
        while self.state == ProcessState::Running {
            let Some(front) = self.pending.front() else {
                break;
            };
            let ready = front.command.payload == CommandPayload::Start || self.is_reached(front.target, now);
            if !ready {
                break;
            }
            let Some(pending) = self.pending.pop_front() else {
                break;
            };

            let reconciliation = match pending.reconciliation {
                Some(reconciliation) => reconciliation,
                None => {
                    self.execute_start(pending.command, now)?;
                    continue;
                }
            };
            match pending.command.payload {
                CommandPayload::Pause => {
                    self.scheduler.hold();
                    tracing::info!(stream = %self.config.stream, at = ?pending.target, "paused");
                }
                CommandPayload::Stop => self.begin_stop("stop command"),
                CommandPayload::Start | CommandPayload::Marker(_) => {}
            }
            self.record(pending.command, pending.target, reconciliation);
        }
        Ok(())
    }

    fn is_reached(&self, target: ExecutionTarget, now: Timestamp) -> bool {
        match target {
            ExecutionTarget::Index(n) => {
                self.scheduler.position().next_index > n
                    || (self.scheduler.is_held() && self.scheduler.clock().nominal(n).is_some_and(|t| now >= t))
            }
            ExecutionTarget::Time(t) => now >= t,
        }
    }

    /// Wall time at which a pending target becomes due, if time-driven
    fn time_target(&self, target: ExecutionTarget) -> Option<Timestamp> {
        match target {
            ExecutionTarget::Time(t) => Some(t),
            ExecutionTarget::Index(n) if self.scheduler.is_held() => self.scheduler.clock().nominal(n),
            ExecutionTarget::Index(_) => None,
        }
    }

    fn record(&mut self, command: Arc<ControlCommand>, target: ExecutionTarget, reconciliation: Reconciliation) {
        let timestamp = match target {
            ExecutionTarget::Index(n) => self.scheduler.clock().nominal(n).unwrap_or(command.issue_time),
            ExecutionTarget::Time(t) => t,
        };
        let execution = CommandExecution {
            command,
            target,
            timestamp,
            reconciliation,
        };
        tracing::debug!(
            stream = %self.config.stream,
            command = %execution.command,
            at = %execution.timestamp,
            "command executed"
        );
        self.stats.commands_executed += 1;
        self.observer.on_execute(&execution);
        self.events.push(StreamEvent::Executed(execution));
    }

    fn warn(&mut self, error: SyncError, now: Timestamp) {
        if let Some(kind) = WarningKind::of(&error) {
            if let Some(suppressed) = self.limiter.admit(kind, now) {
                tracing::warn!(stream = %self.config.stream, suppressed, "{error}");
            }
        }
        self.events.push(StreamEvent::Warning(error));
    }
}

impl fmt::Debug for StreamProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamProcess")
            .field("stream", &self.config.stream)
            .field("mode", &self.config.mode)
            .field("state", &self.state)
            .field("position", &self.scheduler.position())
            .field("pending", &self.pending.len())
            .finish()
    }
}
