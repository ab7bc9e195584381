//! End-to-end scenarios and emission checks
//!
//! Emission invariants checked on every scenario:
//! - Timestamps strictly increase within a stream
//! - Synchronized streams never skip an index and every timestamp equals
//!   `origin + n / rate`
//! - Realtime streams only skip indices through drop-resume

use syncstream_core::{ClockMode, CommandPayload, StreamId, SyncResult, Timestamp};
use syncstream_runtime::StreamConfig;

use crate::scenario::{Scenario, ScenarioConfig, ScenarioStream};

/// Check the emission invariants of one finished stream
pub fn verify_emission(stream: &ScenarioStream) -> Result<(), String> {
    let timestamps = stream.sink.timestamps();
    let indices = stream.sink.indices();
    let id = stream.process.stream();

    if let Some(w) = timestamps.windows(2).find(|w| w[1] <= w[0]) {
        return Err(format!("{id}: timestamp {} after {}", w[1], w[0]));
    }
    if let Some(w) = indices.windows(2).find(|w| w[1] <= w[0]) {
        return Err(format!("{id}: index {} after {}", w[1], w[0]));
    }

    let clock = stream.process.scheduler().clock();
    match clock.mode() {
        ClockMode::Synchronized => {
            if let Some(w) = indices.windows(2).find(|w| w[1] != w[0] + 1) {
                // Pauses skip ahead on the grid; nothing else may.
                if stream.process.stats().commands_executed == 0 {
                    return Err(format!("{id}: gap between {} and {}", w[0], w[1]));
                }
            }
            for (&n, &t) in indices.iter().zip(&timestamps) {
                if clock.nominal(n) != Some(t) {
                    return Err(format!("{id}: sample {n} at {t}, not on the grid"));
                }
            }
        }
        ClockMode::Realtime => {
            let leading = indices.first().copied().unwrap_or(0);
            let skipped: u64 = leading + indices.windows(2).map(|w| w[1] - w[0] - 1).sum::<u64>();
            if skipped != stream.process.stats().dropped_samples {
                return Err(format!(
                    "{id}: {skipped} indices skipped, {} reported dropped",
                    stream.process.stats().dropped_samples
                ));
            }
        }
    }
    Ok(())
}

/// One synchronized and one realtime stream, both waiting for `Start`
pub fn mixed_group(rate: f64) -> Vec<StreamConfig> {
    vec![
        StreamConfig {
            stream: StreamId::new(0),
            batch_size: Some(1),
            ..StreamConfig::synchronized(rate, 1)
        },
        StreamConfig {
            stream: StreamId::new(1),
            batch_size: Some(1),
            ..StreamConfig::realtime(rate, 1)
        },
    ]
}

/// `Start` for `start` delivered at `arrival`, after the streams stalled
pub fn late_start(rate: f64, start: f64, arrival: f64) -> SyncResult<Scenario> {
    let mut scenario = Scenario::new(ScenarioConfig::new(mixed_group(rate)))?;
    scenario.tick()?;
    scenario.issue_at(CommandPayload::Start, start)?;
    let now = scenario.now().0;
    scenario.stall(arrival - now);
    scenario.tick()?;
    Ok(scenario)
}

/// Synchronized stream running from 0, stalled after `stall_at` until
/// `resume_at`, with a marker for `marker_at` arriving on resume
pub fn late_marker(rate: f64, stall_at: f64, resume_at: f64, marker_at: f64) -> SyncResult<Scenario> {
    let config = StreamConfig {
        origin: Some(Timestamp(0.0)),
        auto_start: true,
        batch_size: Some(1),
        ..StreamConfig::synchronized(rate, 1)
    };
    let mut scenario = Scenario::new(ScenarioConfig::new(vec![config]))?;
    scenario.run_until(stall_at)?;
    scenario.issue_at(CommandPayload::Marker("late".into()), marker_at)?;
    let now = scenario.now().0;
    scenario.stall(resume_at - now);
    scenario.tick()?;
    Ok(scenario)
}
