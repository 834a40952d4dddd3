//! Gapless playback scheduling.
//!
//! The scheduler decides *when* each decoded buffer starts on the output
//! device's clock; it never touches samples. The rule is
//!
//! ```text
//! start  = max(cursor, now)
//! cursor = start + duration
//! ```
//!
//! so buffers play back-to-back once the first one starts, a late buffer
//! starts immediately instead of in the past, and playback order is receipt
//! order.
//!
//! # Example
//!
//! ```rust
//! use extruder_voice::audio::PlaybackScheduler;
//!
//! let mut sched = PlaybackScheduler::new();
//! let a = sched.schedule(0.5, 2.0);
//! let b = sched.schedule(0.5, 2.1);
//! assert_eq!(a.start, 2.0);
//! assert_eq!(b.start, 2.5);
//!
//! sched.interrupt();
//! let c = sched.schedule(0.5, 2.2);
//! assert_eq!(c.start, 2.2);
//! ```

use std::collections::BTreeMap;

/// Identifier of a scheduled buffer, unique within one scheduler.
pub type HandleId = u64;

/// One scheduled, playing or queued output buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackHandle {
    pub id: HandleId,
    /// Start time in seconds on the output device clock.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

impl PlaybackHandle {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Owns the schedule cursor and the set of live handles.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    /// Earliest time the next buffer may start.
    cursor: f64,
    live: BTreeMap<HandleId, PlaybackHandle>,
    next_id: HandleId,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a buffer of `duration` seconds given the device clock `now`.
    pub fn schedule(&mut self, duration: f64, now: f64) -> PlaybackHandle {
        let start = self.cursor.max(now);
        let handle = PlaybackHandle {
            id: self.next_id,
            start,
            duration,
        };
        self.next_id += 1;
        self.cursor = handle.end();
        self.live.insert(handle.id, handle);
        handle
    }

    /// Remove a handle that finished playing naturally.
    ///
    /// Returns `None` for handles that are no longer live, e.g. a late
    /// completion notice for a buffer already stopped by an interruption.
    pub fn complete(&mut self, id: HandleId) -> Option<PlaybackHandle> {
        self.live.remove(&id)
    }

    /// Drop every live handle and reset the cursor so the next buffer is
    /// scheduled relative to "now".
    ///
    /// Returns the handles that must be stopped on the device.
    pub fn interrupt(&mut self) -> Vec<PlaybackHandle> {
        self.cursor = 0.0;
        std::mem::take(&mut self.live).into_values().collect()
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: HandleId) -> bool {
        self.live.contains_key(&id)
    }

    /// Live handles in scheduling order.
    pub fn live_handles(&self) -> impl Iterator<Item = &PlaybackHandle> {
        self.live.values()
    }
}
