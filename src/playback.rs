//! Frame playback over an ordered frame sequence.
//!
//! The render loop calls [`PlaybackController::tick`] once per display tick; the
//! controller advances at most one frame per tick, and only when the frame
//! interval has elapsed on its [`Clock`]. Scrubbing sets the index directly and
//! leaves both the play state and the pending tick alone.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::data::histogram::HistogramFrame;
use crate::data::normalize::NormalizedSet;

pub const MIN_SPEED_MS: u64 = 1;
pub const MAX_SPEED_MS: u64 = 1000;
pub const DEFAULT_SPEED_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not playing.
    Idle,
    /// Playing, but the next frame is not due yet.
    Waiting,
    /// Moved to the given index.
    Advanced(usize),
    /// Was on the last frame: playback stopped and rewound to 0.
    Finished,
}

/// Clamp a speed in ms/frame into the supported range.
pub fn clamp_speed(ms: u64) -> u64 {
    ms.clamp(MIN_SPEED_MS, MAX_SPEED_MS)
}

#[derive(Debug)]
pub struct PlaybackController<C: Clock = SystemClock> {
    clock: C,
    state: PlaybackState,
    index: usize,
    frame_count: usize,
    speed_ms: u64,
    // Some(_) while a frame advance is pending
    last_advance: Option<Instant>,
}

impl PlaybackController<SystemClock> {
    pub fn new(frame_count: usize) -> Self {
        Self::with_clock(frame_count, SystemClock)
    }
}

impl<C: Clock> PlaybackController<C> {
    pub fn with_clock(frame_count: usize, clock: C) -> Self {
        Self {
            clock,
            state: PlaybackState::Stopped,
            index: 0,
            frame_count,
            speed_ms: DEFAULT_SPEED_MS,
            last_advance: None,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn max_index(&self) -> usize {
        self.frame_count.saturating_sub(1)
    }

    pub fn speed_ms(&self) -> u64 {
        self.speed_ms
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.speed_ms)
    }

    /// Whether a frame advance is scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.last_advance.is_some()
    }

    /// When the next frame becomes due, if playing.
    pub fn next_due(&self) -> Option<Instant> {
        self.last_advance.map(|t| t + self.frame_interval())
    }

    /// Fraction of the sequence played, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.max_index() == 0 {
            return 0.0;
        }
        self.index as f64 / self.max_index() as f64
    }

    /// Start (or resume) playing from the current index. No-op without frames.
    pub fn play(&mut self) {
        if self.frame_count == 0 || self.state == PlaybackState::Playing {
            return;
        }
        log::debug!("playback: {:?} -> Playing at {}", self.state, self.index);
        self.state = PlaybackState::Playing;
        self.last_advance = Some(self.clock.now());
    }

    /// Pause in place and cancel the pending advance.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            log::debug!("playback: Playing -> Paused at {}", self.index);
            self.state = PlaybackState::Paused;
        }
        self.last_advance = None;
    }

    /// Stop and cancel the pending advance. The index is kept.
    pub fn stop(&mut self) {
        if self.state != PlaybackState::Stopped {
            log::debug!("playback: {:?} -> Stopped at {}", self.state, self.index);
        }
        self.state = PlaybackState::Stopped;
        self.last_advance = None;
    }

    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Jump to `index` (clamped). Works in every state and cancels nothing.
    pub fn seek(&mut self, index: usize) {
        self.index = index.min(self.max_index());
    }

    pub fn step_forward(&mut self) {
        self.seek(self.index.saturating_add(1));
    }

    pub fn step_back(&mut self) {
        self.seek(self.index.saturating_sub(1));
    }

    /// Set the speed in ms/frame, clamped to `[1, 1000]`.
    pub fn set_speed(&mut self, ms: u64) {
        self.speed_ms = clamp_speed(ms);
    }

    /// Point the controller at a sequence of a different length.
    pub fn set_frame_count(&mut self, frame_count: usize) {
        self.frame_count = frame_count;
        if frame_count == 0 {
            self.stop();
            self.index = 0;
        } else {
            self.index = self.index.min(self.max_index());
        }
    }

    /// Advance by one frame if playing and the interval has elapsed.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != PlaybackState::Playing {
            return TickOutcome::Idle;
        }
        let now = self.clock.now();
        if let Some(last) = self.last_advance {
            if now.saturating_duration_since(last) < self.frame_interval() {
                return TickOutcome::Waiting;
            }
        }
        if self.index >= self.max_index() {
            log::debug!("playback: finished, rewinding");
            self.state = PlaybackState::Stopped;
            self.index = 0;
            self.last_advance = None;
            return TickOutcome::Finished;
        }
        self.index += 1;
        self.last_advance = Some(now);
        TickOutcome::Advanced(self.index)
    }

    /// The frame at the current index.
    pub fn current_frame<'a>(&self, set: &'a NormalizedSet) -> Option<&'a HistogramFrame> {
        set.frame(self.index)
    }
}
