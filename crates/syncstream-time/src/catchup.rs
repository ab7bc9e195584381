//! Catch-up policy - reconciles late commands with a stream's emission
//!
//! Lateness is `now - T` for a command executing at `T`. Within the latency
//! budget a command runs at its exact target. Beyond it:
//! - Synchronized streams burst-replay every missing slot up to the target,
//!   each with its arithmetic timestamp
//! - Realtime streams drop the missed interval and resume from now; the
//!   interval starts after the last emitted sample, or at `T` itself when
//!   nothing was emitted

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use syncstream_core::{ClockMode, Timestamp};

use crate::{BoundaryPolicy, ClockSource, EmissionPosition};

/// Catch-up policy configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Lateness tolerated without catch-up
    pub latency_budget: Duration,
    /// Mapping of command times onto the sample grid
    pub boundary: BoundaryPolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            latency_budget: Duration::from_millis(200),
            boundary: BoundaryPolicy::Nearest,
        }
    }
}

/// Where a command executes
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExecutionTarget {
    /// Sample index on the synchronized grid
    Index(u64),
    /// Stream time (realtime streams, or synchronized before the origin is known)
    Time(Timestamp),
}

/// Recovery for a late command
#[derive(Clone, Debug, PartialEq)]
pub enum CatchUpDecision {
    /// Replay the missing slots immediately; empty when already emitted
    Burst { missing: RangeInclusive<u64> },
    /// Skip `dropped` slots and resume at `resume_index` from now
    DropResume { resume_index: u64, dropped: u64 },
}

impl CatchUpDecision {
    /// Slots replayed by a burst
    pub fn burst_len(&self) -> u64 {
        match self {
            CatchUpDecision::Burst { missing } if !missing.is_empty() => {
                missing.end() - missing.start() + 1
            }
            _ => 0,
        }
    }

    /// Slots abandoned by a drop-resume
    pub fn dropped(&self) -> u64 {
        match self {
            CatchUpDecision::DropResume { dropped, .. } => *dropped,
            CatchUpDecision::Burst { .. } => 0,
        }
    }
}

/// Result of reconciling one command
#[derive(Clone, Debug, PartialEq)]
pub enum Reconciliation {
    OnTime {
        target: ExecutionTarget,
    },
    Late {
        /// Seconds past the command time at processing
        lateness: f64,
        target: ExecutionTarget,
        decision: CatchUpDecision,
    },
}

impl Reconciliation {
    pub fn target(&self) -> ExecutionTarget {
        match self {
            Reconciliation::OnTime { target } | Reconciliation::Late { target, .. } => *target,
        }
    }

    pub fn is_late(&self) -> bool {
        matches!(self, Reconciliation::Late { .. })
    }

    pub fn decision(&self) -> Option<&CatchUpDecision> {
        match self {
            Reconciliation::Late { decision, .. } => Some(decision),
            Reconciliation::OnTime { .. } => None,
        }
    }
}

/// Catch-up policy for one stream
#[derive(Clone, Debug, Default)]
pub struct CatchUpPolicy {
    config: PolicyConfig,
}

impl CatchUpPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        CatchUpPolicy { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn boundary(&self) -> BoundaryPolicy {
        self.config.boundary
    }

    /// Execution target of a command at `command_time`
    pub fn target(&self, clock: &ClockSource, command_time: Timestamp) -> ExecutionTarget {
        match clock.index_for(command_time, self.config.boundary) {
            Some(index) => ExecutionTarget::Index(index),
            None => ExecutionTarget::Time(command_time),
        }
    }

    /// Reconcile a command executing at `command_time`, processed at `now`
    pub fn reconcile(
        &self,
        clock: &ClockSource,
        command_time: Timestamp,
        now: Timestamp,
        position: EmissionPosition,
    ) -> Reconciliation {
        let target = self.target(clock, command_time);
        let lateness = now.since(command_time);
        if lateness <= self.config.latency_budget.as_secs_f64() {
            return Reconciliation::OnTime { target };
        }

        let decision = match clock.mode() {
            ClockMode::Synchronized => {
                let missing = match target {
                    ExecutionTarget::Index(n) => position.next_index..=n,
                    // No origin yet: nothing was emitted, nothing to replay.
                    ExecutionTarget::Time(_) => RangeInclusive::new(1, 0),
                };
                CatchUpDecision::Burst { missing }
            }
            ClockMode::Realtime => {
                let dropped = match position.last_timestamp {
                    Some(last) => clock.slots_between(last, now),
                    // Nothing emitted: the slot at `T` itself was missed too.
                    None => clock.slots_between(command_time, now) + 1,
                };
                CatchUpDecision::DropResume {
                    resume_index: position.next_index + dropped,
                    dropped,
                }
            }
        };

        Reconciliation::Late {
            lateness,
            target,
            decision,
        }
    }
}
