//! Lookahead scheduler - generates sample slots ahead of their due time
//!
//! A slot is produced once `now >= due - latency_budget`. Synchronized
//! streams derive every timestamp arithmetically from the slot index, so a
//! delayed scheduler accumulates a backlog that drains one batch per tick
//! without drift. Realtime streams re-anchor instead: delay becomes jitter.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use syncstream_core::{ClockMode, SyncError, SyncResult, Timestamp};

use crate::{BoundaryPolicy, ClockSource, WallClock};

/// Scheduler configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How far ahead of due time samples are generated
    pub latency_budget: Duration,
    /// Samples per scheduled batch
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            latency_budget: Duration::from_millis(200),
            batch_size: 1,
        }
    }
}

impl SchedulerConfig {
    /// Batch size covering one polling interval at `sample_rate`
    pub fn for_rate(sample_rate: f64, poll_interval: Duration, latency_budget: Duration) -> Self {
        let per_poll = (sample_rate * poll_interval.as_secs_f64()).ceil();
        SchedulerConfig {
            latency_budget,
            batch_size: if per_poll >= 1.0 { per_poll as usize } else { 1 },
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.latency_budget.is_zero() {
            return Err(SyncError::InvalidConfiguration(
                "latency budget must be positive".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SyncError::InvalidConfiguration(
                "batch size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// One generated sample position
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Slot {
    pub index: u64,
    pub timestamp: Timestamp,
}

/// Why a batch was produced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchKind {
    /// Regular lookahead emission
    Scheduled,
    /// Catch-up replay of a missed range
    Burst,
}

/// A batch of slots ready for sample generation
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledBatch {
    pub kind: BatchKind,
    pub slots: Vec<Slot>,
    /// Seconds past the first slot's due time, when produced late
    pub behind: Option<f64>,
    /// Set when a realtime stream skipped slots to re-anchor at `now`
    pub reanchor: Option<Reanchor>,
}

/// Slots a realtime stream skipped instead of building a backlog
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reanchor {
    pub dropped: u64,
    /// Position before the skip
    pub from: EmissionPosition,
}

impl ScheduledBatch {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Mutable scheduling state
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LookaheadState {
    /// Due time of the next slot; `None` until started
    pub next_due_time: Option<Timestamp>,
    /// Batches produced
    pub emitted_count: u64,
    /// Slots produced
    pub sample_count: u64,
    /// Index of the next slot
    pub next_index: u64,
}

/// Where a stream's emission currently stands
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmissionPosition {
    pub next_index: u64,
    pub last_index: Option<u64>,
    pub last_timestamp: Option<Timestamp>,
}

/// Lookahead scheduler for one stream
#[derive(Debug)]
pub struct LookaheadScheduler {
    clock: ClockSource,
    config: SchedulerConfig,
    state: LookaheadState,
    /// Highest index that may be produced
    limit: Option<u64>,
    /// Emission gated until `resume_at`
    held: bool,
    last_index: Option<u64>,
    last_timestamp: Option<Timestamp>,
}

impl LookaheadScheduler {
    /// Create a held scheduler; call `resume_at` to begin emission
    pub fn new(clock: ClockSource, config: SchedulerConfig) -> SyncResult<Self> {
        config.validate()?;
        Ok(LookaheadScheduler {
            clock,
            config,
            state: LookaheadState::default(),
            limit: None,
            held: true,
            last_index: None,
            last_timestamp: None,
        })
    }

    pub fn clock(&self) -> &ClockSource {
        &self.clock
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> &LookaheadState {
        &self.state
    }

    pub fn mode(&self) -> ClockMode {
        self.clock.mode()
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn position(&self) -> EmissionPosition {
        EmissionPosition {
            next_index: self.state.next_index,
            last_index: self.last_index,
            last_timestamp: self.last_timestamp,
        }
    }

    /// Stop producing slots until the next `resume_at`
    pub fn hold(&mut self) {
        self.held = true;
    }

    /// Begin or resume emission at time `t`
    ///
    /// Synchronized: fixes the origin to `t` if none was configured, otherwise
    /// skips ahead to the grid index of `t`. Realtime: next slot is due at `t`.
    pub fn resume_at(&mut self, t: Timestamp, policy: BoundaryPolicy) {
        match self.clock.mode() {
            ClockMode::Synchronized => {
                if self.clock.origin().is_none() {
                    self.clock.set_origin(t);
                }
                if let Some(n) = self.clock.index_for(t, policy) {
                    self.state.next_index = self.state.next_index.max(n);
                }
                self.state.next_due_time = self.clock.nominal(self.state.next_index);
            }
            ClockMode::Realtime => {
                self.state.next_due_time = Some(t);
            }
        }
        self.held = false;
        self.limit = None;
    }

    /// Never produce slots beyond `index`
    pub fn limit_at(&mut self, index: u64) {
        self.limit = Some(self.limit.map_or(index, |l| l.min(index)));
    }

    pub fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|l| self.state.next_index > l)
    }

    /// Earliest time at which the next batch becomes due
    pub fn wake_time(&self) -> Option<Timestamp> {
        if self.held || self.limit_reached() {
            return None;
        }
        self.state
            .next_due_time
            .map(|due| due - self.config.latency_budget)
    }

    /// Produce the next batch if it is due at `now`
    pub fn poll(&mut self, now: Timestamp, wall: &dyn WallClock) -> Option<ScheduledBatch> {
        if self.held {
            return None;
        }
        let mut due = self.state.next_due_time?;
        if now < due - self.config.latency_budget {
            return None;
        }
        let mut count = self.remaining(self.config.batch_size as u64);
        if count == 0 {
            return None;
        }

        let lag = now.since(due);
        let behind = (lag > 0.0).then_some(lag);
        let mut reanchor = None;
        if self.clock.mode() == ClockMode::Realtime && lag > count as f64 * self.clock.period() {
            // No backlog in realtime mode: every slot due before `now` is lost.
            let from = self.position();
            let mut dropped = self.clock.slots_between(due, now) + 1;
            if let Some(limit) = self.limit {
                dropped = dropped.min(limit - self.state.next_index);
            }
            self.state.next_index += dropped;
            count = self.remaining(self.config.batch_size as u64);
            reanchor = Some(Reanchor { dropped, from });
            due = now;
        }
        let duration = count as f64 * self.clock.period();

        let slots = self.generate(count, wall);
        self.state.emitted_count += 1;
        self.state.next_due_time = match self.clock.mode() {
            ClockMode::Synchronized => self.clock.nominal(self.state.next_index),
            ClockMode::Realtime => Some(due.offset(duration)),
        };

        Some(ScheduledBatch {
            kind: BatchKind::Scheduled,
            slots,
            behind,
            reanchor,
        })
    }

    /// Produce every slot from the next index up to `range.end()` at once
    ///
    /// Only synchronized streams can replay: each slot carries its arithmetic
    /// timestamp. Slots are never skipped, so the replay always starts at the
    /// next unemitted index.
    pub fn replay(&mut self, range: RangeInclusive<u64>, wall: &dyn WallClock) -> Vec<ScheduledBatch> {
        if self.clock.mode() != ClockMode::Synchronized || self.clock.origin().is_none() {
            return Vec::new();
        }
        let mut end = *range.end();
        if let Some(limit) = self.limit {
            end = end.min(limit);
        }
        if range.is_empty() || end < self.state.next_index {
            return Vec::new();
        }

        let mut batches = Vec::new();
        let mut remaining = end - self.state.next_index + 1;
        while remaining > 0 {
            let count = remaining.min(self.config.batch_size as u64);
            let slots = self.generate(count, wall);
            self.state.emitted_count += 1;
            remaining -= count;
            batches.push(ScheduledBatch {
                kind: BatchKind::Burst,
                slots,
                behind: None,
                reanchor: None,
            });
        }
        self.state.next_due_time = self.clock.nominal(self.state.next_index);
        batches
    }

    /// Skip to `resume_index` and make the next slot due immediately
    ///
    /// Returns the number of indices skipped. An index already passed leaves
    /// the schedule untouched.
    pub fn fast_forward(&mut self, resume_index: u64, now: Timestamp) -> u64 {
        if resume_index <= self.state.next_index {
            return 0;
        }
        let skipped = resume_index - self.state.next_index;
        self.state.next_index = resume_index;
        if !self.held {
            self.state.next_due_time = Some(now);
        }
        skipped
    }

    fn remaining(&self, wanted: u64) -> u64 {
        match self.limit {
            Some(limit) if limit < self.state.next_index => 0,
            Some(limit) => wanted.min(limit - self.state.next_index + 1),
            None => wanted,
        }
    }

    fn generate(&mut self, count: u64, wall: &dyn WallClock) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = self.state.next_index;
            let timestamp = self.clock.timestamp(index, wall);
            slots.push(Slot { index, timestamp });
            self.state.next_index += 1;
        }
        self.state.sample_count += count;
        if let Some(last) = slots.last() {
            self.last_index = Some(last.index);
            self.last_timestamp = Some(last.timestamp);
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use proptest::prelude::*;

    fn synchronized(rate: f64, budget_ms: u64, batch_size: usize) -> LookaheadScheduler {
        let clock = ClockSource::synchronized(rate, Timestamp(0.0)).unwrap();
        let config = SchedulerConfig {
            latency_budget: Duration::from_millis(budget_ms),
            batch_size,
        };
        let mut scheduler = LookaheadScheduler::new(clock, config).unwrap();
        scheduler.resume_at(Timestamp(0.0), BoundaryPolicy::Nearest);
        scheduler
    }

    fn timestamps(batches: &[ScheduledBatch]) -> Vec<f64> {
        batches
            .iter()
            .flat_map(|b| b.slots.iter().map(|s| s.timestamp.0))
            .collect()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let clock = ClockSource::realtime(10.0).unwrap();
        let zero_budget = SchedulerConfig {
            latency_budget: Duration::ZERO,
            batch_size: 1,
        };
        assert!(LookaheadScheduler::new(clock.clone(), zero_budget).is_err());

        let zero_batch = SchedulerConfig {
            latency_budget: Duration::from_millis(100),
            batch_size: 0,
        };
        assert!(LookaheadScheduler::new(clock, zero_batch).is_err());
    }

    #[test]
    fn test_batch_size_covers_poll_interval() {
        let config = SchedulerConfig::for_rate(500.0, Duration::from_millis(10), Duration::from_millis(200));
        assert_eq!(config.batch_size, 5);
        let slow = SchedulerConfig::for_rate(2.0, Duration::from_millis(10), Duration::from_millis(200));
        assert_eq!(slow.batch_size, 1);
    }

    #[test]
    fn test_held_until_resumed() {
        let wall = ManualClock::new(0.0);
        let clock = ClockSource::synchronized(2.0, Timestamp(0.0)).unwrap();
        let mut scheduler = LookaheadScheduler::new(clock, SchedulerConfig::default()).unwrap();

        assert!(scheduler.is_held());
        assert!(scheduler.poll(Timestamp(10.0), &wall).is_none());
        assert_eq!(scheduler.wake_time(), None);
    }

    #[test]
    fn test_emits_latency_budget_ahead() {
        let wall = ManualClock::new(0.0);
        let mut scheduler = synchronized(2.0, 200, 1);

        // Sample 0 due at 0.0 -> produced from -0.2 onward.
        let first = scheduler.poll(Timestamp(-0.2), &wall).unwrap();
        assert_eq!(first.slots[0].timestamp, Timestamp(0.0));
        assert_eq!(first.behind, None);

        // Sample 1 due at 0.5 -> not before 0.3.
        assert!(scheduler.poll(Timestamp(0.29), &wall).is_none());
        let second = scheduler.poll(Timestamp(0.3), &wall).unwrap();
        assert_eq!(second.slots[0].timestamp, Timestamp(0.5));
        assert_eq!(scheduler.wake_time(), Some(Timestamp(1.0) - Duration::from_millis(200)));
    }

    #[test]
    fn test_five_logical_seconds_yield_ten_samples() {
        let wall = ManualClock::new(0.0);
        let mut scheduler = synchronized(2.0, 200, 1);
        scheduler.limit_at(9);

        let mut batches = Vec::new();
        let mut now = -0.2;
        while now < 6.0 {
            if let Some(batch) = scheduler.poll(Timestamp(now), &wall) {
                batches.push(batch);
            }
            now += 0.05;
        }

        assert_eq!(
            timestamps(&batches),
            vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5]
        );
        assert_eq!(scheduler.state().emitted_count, 10);
        assert!(scheduler.limit_reached());
        assert_eq!(scheduler.wake_time(), None);
    }

    #[test]
    fn test_synchronized_backlog_keeps_arithmetic_timestamps() {
        let wall = ManualClock::new(0.0);
        let mut scheduler = synchronized(2.0, 200, 4);

        // Scheduler stalled until t=3.0.
        let first = scheduler.poll(Timestamp(3.0), &wall).unwrap();
        assert_eq!(first.behind, Some(3.0));
        let second = scheduler.poll(Timestamp(3.0), &wall).unwrap();
        assert_eq!(second.behind, Some(1.0));

        assert_eq!(
            timestamps(&[first, second]),
            vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5]
        );
    }

    #[test]
    fn test_realtime_reanchors_instead_of_backlog() {
        let wall = ManualClock::new(0.0);
        let clock = ClockSource::realtime(10.0).unwrap();
        let config = SchedulerConfig {
            latency_budget: Duration::from_millis(50),
            batch_size: 1,
        };
        let mut scheduler = LookaheadScheduler::new(clock, config).unwrap();
        scheduler.resume_at(Timestamp(0.0), BoundaryPolicy::Nearest);

        scheduler.poll(Timestamp(0.0), &wall).unwrap();
        wall.set(5.0);
        let late = scheduler.poll(Timestamp(5.0), &wall).unwrap();
        assert!(late.behind.unwrap() > 4.8);
        assert_eq!(late.slots[0].timestamp, Timestamp(5.0));
        // Slots 0.1 through 4.9 were never produced.
        assert_eq!(late.slots[0].index, 50);
        let reanchor = late.reanchor.unwrap();
        assert_eq!(reanchor.dropped, 49);
        assert_eq!(reanchor.from.next_index, 1);
        assert_eq!(reanchor.from.last_timestamp, Some(Timestamp(0.0)));

        // Next slot is due one period after the re-anchor, not at 0.2.
        assert!(scheduler.poll(Timestamp(5.0), &wall).is_none());
    }

    #[test]
    fn test_limit_truncates_batch() {
        let wall = ManualClock::new(0.0);
        let mut scheduler = synchronized(10.0, 200, 4);
        scheduler.limit_at(5);

        let first = scheduler.poll(Timestamp(10.0), &wall).unwrap();
        let second = scheduler.poll(Timestamp(10.0), &wall).unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 2);
        assert!(scheduler.poll(Timestamp(10.0), &wall).is_none());
    }

    #[test]
    fn test_replay_fills_missing_range() {
        let wall = ManualClock::new(0.0);
        let mut scheduler = synchronized(2.0, 200, 1);
        let mut now = -0.2;
        while scheduler.position().next_index < 5 {
            scheduler.poll(Timestamp(now), &wall);
            now += 0.5;
        }
        assert_eq!(scheduler.position().last_timestamp, Some(Timestamp(2.0)));

        let batches = scheduler.replay(5..=6, &wall);
        assert!(batches.iter().all(|b| b.kind == BatchKind::Burst));
        assert_eq!(timestamps(&batches), vec![2.5, 3.0]);
        assert_eq!(scheduler.position().next_index, 7);
        assert_eq!(scheduler.state().next_due_time, Some(Timestamp(3.5)));
    }

    #[test]
    fn test_replay_of_passed_range_is_empty() {
        let wall = ManualClock::new(0.0);
        let mut scheduler = synchronized(2.0, 200, 1);
        scheduler.poll(Timestamp(5.0), &wall);
        scheduler.poll(Timestamp(5.0), &wall);

        assert!(scheduler.replay(2..=1, &wall).is_empty());
        assert!(scheduler.replay(0..=1, &wall).is_empty());
    }

    #[test]
    fn test_replay_on_realtime_is_refused() {
        let wall = ManualClock::new(0.0);
        let clock = ClockSource::realtime(2.0).unwrap();
        let mut scheduler = LookaheadScheduler::new(clock, SchedulerConfig::default()).unwrap();
        scheduler.resume_at(Timestamp(0.0), BoundaryPolicy::Nearest);
        assert!(scheduler.replay(0..=4, &wall).is_empty());
    }

    #[test]
    fn test_fast_forward_skips_indices() {
        let wall = ManualClock::new(2.0);
        let clock = ClockSource::realtime(2.0).unwrap();
        let mut scheduler = LookaheadScheduler::new(clock, SchedulerConfig::default()).unwrap();
        scheduler.resume_at(Timestamp(2.0), BoundaryPolicy::Nearest);
        scheduler.poll(Timestamp(2.0), &wall).unwrap();

        wall.set(4.0);
        assert_eq!(scheduler.fast_forward(4, Timestamp(4.0)), 3);
        let batch = scheduler.poll(Timestamp(4.0), &wall).unwrap();
        assert_eq!(batch.slots[0].index, 4);
        assert!(batch.slots[0].timestamp >= Timestamp(4.0));
        assert_eq!(batch.reanchor, None);
    }

    #[test]
    fn test_fast_forward_to_passed_index_keeps_schedule() {
        let wall = ManualClock::new(4.0);
        let clock = ClockSource::realtime(2.0).unwrap();
        let mut scheduler = LookaheadScheduler::new(clock, SchedulerConfig::default()).unwrap();
        scheduler.resume_at(Timestamp(4.0), BoundaryPolicy::Nearest);
        scheduler.poll(Timestamp(4.0), &wall).unwrap();
        scheduler.poll(Timestamp(4.0), &wall);
        assert_eq!(scheduler.position().next_index, 1);

        assert_eq!(scheduler.fast_forward(1, Timestamp(4.0)), 0);
        assert_eq!(scheduler.state().next_due_time, Some(Timestamp(4.5)));
        // 4.0 was already produced; the next slot still waits for 4.5.
        assert!(scheduler.poll(Timestamp(4.0), &wall).is_none());
    }

    #[test]
    fn test_realtime_reanchor_stops_at_limit() {
        let wall = ManualClock::new(0.0);
        let clock = ClockSource::realtime(2.0).unwrap();
        let mut scheduler = LookaheadScheduler::new(clock, SchedulerConfig::default()).unwrap();
        scheduler.resume_at(Timestamp(0.0), BoundaryPolicy::Nearest);
        scheduler.poll(Timestamp(0.0), &wall).unwrap();
        scheduler.limit_at(3);

        wall.set(10.0);
        let batch = scheduler.poll(Timestamp(10.0), &wall).unwrap();
        assert_eq!(batch.reanchor.unwrap().dropped, 2);
        assert_eq!(batch.slots.len(), 1);
        assert_eq!(batch.slots[0].index, 3);
        assert!(scheduler.limit_reached());
    }

    #[test]
    fn test_resume_without_origin_fixes_origin() {
        let wall = ManualClock::new(0.0);
        let clock = ClockSource::new(ClockMode::Synchronized, 4.0, None).unwrap();
        let mut scheduler = LookaheadScheduler::new(clock, SchedulerConfig::default()).unwrap();

        scheduler.resume_at(Timestamp(12.0), BoundaryPolicy::Nearest);
        assert_eq!(scheduler.clock().origin(), Some(Timestamp(12.0)));
        let batch = scheduler.poll(Timestamp(12.0), &wall).unwrap();
        assert_eq!(batch.slots[0].index, 0);
        assert_eq!(batch.slots[0].timestamp, Timestamp(12.0));
    }

    #[test]
    fn test_resume_with_origin_skips_paused_interval() {
        let wall = ManualClock::new(0.0);
        let mut scheduler = synchronized(2.0, 200, 1);
        scheduler.poll(Timestamp(0.0), &wall).unwrap();
        scheduler.hold();

        scheduler.resume_at(Timestamp(3.0), BoundaryPolicy::Nearest);
        let batch = scheduler.poll(Timestamp(3.0), &wall).unwrap();
        assert_eq!(batch.slots[0].index, 6);
        assert_eq!(batch.slots[0].timestamp, Timestamp(3.0));
    }

    proptest! {
        #[test]
        fn prop_delay_never_changes_synchronized_timestamps(
            delays in proptest::collection::vec(0.0f64..0.5, 1..100),
            batch_size in 1usize..8,
        ) {
            let wall = ManualClock::new(0.0);
            let mut scheduler = synchronized(8.0, 100, batch_size);
            let mut now = 0.0;
            let mut last: Option<(u64, Timestamp)> = None;
            for delay in delays {
                now += delay;
                while let Some(batch) = scheduler.poll(Timestamp(now), &wall) {
                    for slot in batch.slots {
                        prop_assert_eq!(slot.timestamp, Timestamp(slot.index as f64 / 8.0));
                        if let Some((index, t)) = last {
                            prop_assert_eq!(slot.index, index + 1);
                            prop_assert!(slot.timestamp > t);
                        }
                        last = Some((slot.index, slot.timestamp));
                    }
                }
            }
        }
    }
}
