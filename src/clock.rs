//! Playback clock.
//!
//! Owns the per-item progress (0..=100) and the identity of the single tick
//! interval driving it. The interval itself lives in the runtime; the clock
//! only hands out handles and rejects ticks from any handle but the current one.

use crate::error::EngineError;

/// Identity of one tick interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockHandle(u64);

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// The tick came from an interval that has been torn down.
    Stale,
    /// Paused, buffering, or already completed.
    Held,
    Advanced { progress: f64 },
    /// Progress reached 100. Emitted once per run.
    Completed,
}

/// Handles torn down and created by a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restart {
    pub stopped: Option<ClockHandle>,
    pub started: ClockHandle,
}

#[derive(Debug, Clone)]
pub struct PlaybackClock {
    interval_ms: u64,
    progress: f64,
    handle: Option<ClockHandle>,
    next_id: u64,
    fired: bool,
}

impl PlaybackClock {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            progress: 0.0,
            handle: None,
            next_id: 1,
            fired: false,
        }
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn handle(&self) -> Option<ClockHandle> {
        self.handle
    }

    /// Number of live intervals. Never more than one.
    pub fn active_handles(&self) -> usize {
        usize::from(self.handle.is_some())
    }

    /// Tear down the current interval (if any) and start a fresh one at 0.
    pub fn restart(&mut self) -> Restart {
        let stopped = self.stop();
        let started = ClockHandle(self.next_id);
        self.next_id += 1;
        self.handle = Some(started);
        self.progress = 0.0;
        self.fired = false;
        Restart { stopped, started }
    }

    pub fn stop(&mut self) -> Option<ClockHandle> {
        self.handle.take()
    }

    /// Advance by one interval if the gate is open.
    pub fn tick(
        &mut self,
        handle: ClockHandle,
        gate_open: bool,
        duration_ms: u64,
    ) -> Result<Tick, EngineError> {
        if self.handle != Some(handle) {
            return Ok(Tick::Stale);
        }
        if self.fired || !gate_open {
            return Ok(Tick::Held);
        }
        if duration_ms == 0 {
            return Err(EngineError::InvalidDuration { duration_ms });
        }

        let step = (self.interval_ms * 100) as f64 / duration_ms as f64;
        self.progress = (self.progress + step).min(100.0);
        if self.progress >= 100.0 {
            self.fired = true;
            self.progress = 0.0;
            return Ok(Tick::Completed);
        }
        Ok(Tick::Advanced {
            progress: self.progress,
        })
    }

    /// Keep the elapsed milliseconds when the item's duration changes.
    pub fn rescale(&mut self, old_duration_ms: u64, new_duration_ms: u64) {
        if self.fired || old_duration_ms == 0 || new_duration_ms == 0 {
            return;
        }
        let elapsed_ms = self.progress * old_duration_ms as f64 / 100.0;
        self.progress = (elapsed_ms * 100.0 / new_duration_ms as f64).clamp(0.0, 100.0);
    }
}
