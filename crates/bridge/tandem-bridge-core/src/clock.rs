//! Virtual clock: simulation time advanced in fixed frame-duration steps.
//!
//! Simulation time never follows the wall clock. Each [`VirtualClock::advance`]
//! adds exactly one frame duration, so the timeline depends only on the number
//! of steps taken and the frame rates in effect while they were taken.

use serde::{Deserialize, Serialize};

/// Frame rate used when none is configured.
pub const DEFAULT_FPS: f64 = 60.0;
/// Lowest accepted frame rate; malformed input clamps here.
pub const MIN_FPS: f64 = 1.0;

/// Clamp a requested frame rate to a usable value.
///
/// Non-finite or non-positive input becomes [`MIN_FPS`]; anything else is
/// raised to at least [`MIN_FPS`].
pub fn sanitize_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps.max(MIN_FPS)
    } else {
        MIN_FPS
    }
}

/// Snapshot of one simulated frame, handed to every hook.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    /// Frame index after the step (the first step yields 1).
    pub frame: u64,
    /// Simulation time in milliseconds after the step.
    pub time_ms: f64,
    /// Duration of this step in milliseconds.
    pub delta_ms: f64,
}

impl FrameInfo {
    /// `delta_ms` expressed in frames of `baseline_fps`.
    pub fn normalized_delta(&self, baseline_fps: f64) -> f64 {
        self.delta_ms / (1000.0 / sanitize_fps(baseline_fps))
    }
}

/// Monotonic simulation clock.
///
/// Time is stored as a segment origin plus a frame count inside the segment.
/// A new segment starts whenever the frame rate changes, which keeps
/// `n` steps at one rate exactly equal to `n * frame_duration` instead of a
/// sum of `n` rounded additions.
#[derive(Clone, Debug)]
pub struct VirtualClock {
    fps: f64,
    frame_ms: f64,
    segment_origin_ms: f64,
    segment_frames: u64,
    frame: u64,
    time_ms: f64,
}

impl VirtualClock {
    /// Create a clock at time zero running at `fps` (clamped).
    pub fn new(fps: f64) -> Self {
        let fps = sanitize_fps(fps);
        Self {
            fps,
            frame_ms: 1000.0 / fps,
            segment_origin_ms: 0.0,
            segment_frames: 0,
            frame: 0,
            time_ms: 0.0,
        }
    }

    /// Change the frame rate for all later steps. Past time is untouched.
    /// Returns the effective (clamped) rate.
    pub fn set_frame_rate(&mut self, fps: f64) -> f64 {
        let fps = sanitize_fps(fps);
        self.segment_origin_ms = self.time_ms;
        self.segment_frames = 0;
        self.fps = fps;
        self.frame_ms = 1000.0 / fps;
        fps
    }

    /// Advance by exactly one frame duration.
    pub fn advance(&mut self) -> FrameInfo {
        self.segment_frames += 1;
        self.frame += 1;
        self.time_ms = self.segment_origin_ms + self.segment_frames as f64 * self.frame_ms;
        FrameInfo {
            frame: self.frame,
            time_ms: self.time_ms,
            delta_ms: self.frame_ms,
        }
    }

    /// Current simulation time in milliseconds.
    pub fn now(&self) -> f64 {
        self.time_ms
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Duration of one step in milliseconds.
    pub fn frame_duration(&self) -> f64 {
        self.frame_ms
    }

    /// Frame duration expressed in frames of `baseline_fps`
    /// (1.0 when running at the baseline rate).
    pub fn normalized_delta(&self, baseline_fps: f64) -> f64 {
        self.frame_ms / (1000.0 / sanitize_fps(baseline_fps))
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(DEFAULT_FPS)
    }
}
