// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback clock feeding the per-frame uniforms.

use chrono::{Datelike, Local, Timelike};
use shaderloom_graph::backend::FrameUniforms;
use std::time::Instant;

use crate::settings::TimeStep;

/// Playback time, frame counter and pause state
#[derive(Debug, Clone)]
pub struct Clock {
    step: TimeStep,
    start: Instant,
    paused_at: Option<Instant>,
    time: f32,
    time_delta: f32,
    frame: i32,
}

impl Clock {
    /// Create a running clock at time zero
    pub fn new(step: TimeStep) -> Self {
        Self {
            step,
            start: Instant::now(),
            paused_at: None,
            time: 0.0,
            time_delta: 0.0,
            frame: 0,
        }
    }

    /// Advance to the next frame. Does nothing while paused.
    pub fn tick(&mut self) {
        if self.paused_at.is_some() {
            return;
        }
        let time = match self.step {
            TimeStep::Realtime => self.start.elapsed().as_secs_f32(),
            TimeStep::Fixed(step) => self.time + step,
        };
        self.time_delta = time - self.time;
        self.time = time;
        self.frame += 1;
    }

    /// Uniforms for the current frame
    pub fn uniforms(&self, resolution: [f32; 3], mouse: [f32; 4]) -> FrameUniforms {
        let frame_rate = if self.time_delta > 0.0 {
            1.0 / self.time_delta
        } else {
            0.0
        };
        FrameUniforms {
            resolution,
            time: self.time,
            time_delta: self.time_delta,
            frame_rate,
            frame: self.frame,
            mouse,
            date: current_date(),
        }
    }

    /// Back to time zero and frame zero, keeping the pause state
    pub fn reset(&mut self) {
        self.start = Instant::now();
        if self.paused_at.is_some() {
            self.paused_at = Some(self.start);
        }
        self.time = 0.0;
        self.time_delta = 0.0;
        self.frame = 0;
    }
}

#[allow(dead_code)] // Intentionally kept for API completeness
impl Clock {
    /// Stop the clock
    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
            self.time_delta = 0.0;
        }
    }

    /// Continue from where the clock was paused
    pub fn resume(&mut self) {
        let Some(paused_at) = self.paused_at.take() else {
            return;
        };
        if self.time == 0.0 {
            self.start = Instant::now();
        } else {
            self.start += paused_at.elapsed();
        }
    }

    /// Whether the clock is running
    pub fn is_running(&self) -> bool {
        self.paused_at.is_none()
    }

    /// Seconds since the last reset, excluding pauses
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Seconds between the last two ticks
    pub fn time_delta(&self) -> f32 {
        self.time_delta
    }

    /// Frames ticked since the last reset
    pub fn frame(&self) -> i32 {
        self.frame
    }
}

/// `iDate`: year, zero-based month, day of month, seconds since midnight
fn current_date() -> [f32; 4] {
    let now = Local::now();
    let seconds = now.num_seconds_from_midnight() as f32 + now.nanosecond() as f32 * 1e-9;
    [
        now.year() as f32,
        now.month0() as f32,
        now.day() as f32,
        seconds,
    ]
}
