//! Frame clock: fixed-timestep accumulation and dt history.
//!
//! The clock decides, per host frame, how many fixed steps fit the
//! accumulator. Oversized inputs clamp to `max_dt` so a long stall cannot
//! trigger a spiral of death. A bounded ring of recent dt values feeds the
//! stats snapshot.

/// Ring size of the dt history exposed to observers
pub const DT_HISTORY_LEN: usize = 60;

/// Default fixed timestep (60 Hz)
pub const DEFAULT_FIXED_DT: f32 = 1.0 / 60.0;

/// Default input clamp (10 Hz floor)
pub const DEFAULT_MAX_DT: f32 = 1.0 / 10.0;

/// Bounded ring of recent frame dt values
pub struct DtHistory {
    samples: Vec<f32>,
    capacity: usize,
    index: usize,
}

impl DtHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            index: 0,
        }
    }

    pub fn push(&mut self, sample: f32) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.index] = sample;
        }
        self.index = (self.index + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples oldest-first
    pub fn snapshot(&self) -> Vec<f32> {
        if self.samples.len() < self.capacity {
            return self.samples.clone();
        }
        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&self.samples[self.index..]);
        out.extend_from_slice(&self.samples[..self.index]);
        out
    }

    pub fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }
}

/// What one host frame should run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    /// Clamped wall dt handed to Variable-phase systems
    pub dt: f32,
    /// Fixed-phase iterations to run this frame
    pub fixed_steps: u32,
}

/// Fixed-timestep accumulator with pause and single-step control
pub struct FrameClock {
    fixed_dt: f32,
    max_dt: f32,
    /// f64 so tiny remainders survive long sessions without drift
    accumulator: f64,
    paused: bool,
    step_pending: bool,
    history: DtHistory,
    frame_count: u64,
}

impl FrameClock {
    pub fn new(fixed_dt: f32, max_dt: f32) -> Self {
        Self {
            fixed_dt,
            max_dt,
            accumulator: 0.0,
            paused: false,
            step_pending: false,
            history: DtHistory::new(DT_HISTORY_LEN),
            frame_count: 0,
        }
    }

    /// Clamp the input, record it, and decide the fixed-step count.
    ///
    /// While paused the accumulator does not advance; a pending single step
    /// runs exactly one fixed iteration regardless of the accumulator.
    pub fn begin_frame(&mut self, dt_in: f32) -> FramePlan {
        let dt = dt_in.clamp(0.0, self.max_dt);
        self.history.push(dt);
        self.frame_count += 1;

        if self.step_pending {
            self.step_pending = false;
            return FramePlan { dt, fixed_steps: 1 };
        }
        if self.paused {
            return FramePlan { dt, fixed_steps: 0 };
        }

        self.accumulator += f64::from(dt);
        let mut fixed_steps = 0;
        while self.accumulator >= f64::from(self.fixed_dt) {
            self.accumulator -= f64::from(self.fixed_dt);
            fixed_steps += 1;
        }
        FramePlan { dt, fixed_steps }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Schedule exactly one fixed iteration on the next frame
    pub fn step(&mut self) {
        self.step_pending = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    pub fn max_dt(&self) -> f32 {
        self.max_dt
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn history(&self) -> &DtHistory {
        &self.history
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(DEFAULT_FIXED_DT, DEFAULT_MAX_DT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_whole_steps() {
        let mut clock = FrameClock::new(1.0 / 60.0, 1.0 / 10.0);

        // 1.9 fixed steps of input: exactly one step, 0.9 remains
        let plan = clock.begin_frame(1.9 / 60.0);
        assert_eq!(plan.fixed_steps, 1);
        let remainder = clock.accumulator() / f64::from(clock.fixed_dt());
        assert!((remainder - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_clamps_to_max_dt() {
        let mut clock = FrameClock::new(0.02, 0.1);
        let plan = clock.begin_frame(5.0);
        assert_eq!(plan.dt, 0.1);
        // The accumulator advanced by max_dt, not by the 5 s input
        assert_eq!(plan.fixed_steps, 5);
        assert!(clock.accumulator() < f64::from(clock.fixed_dt()));
    }

    #[test]
    fn test_pause_halts_accumulation() {
        let mut clock = FrameClock::default();
        clock.pause();
        let plan = clock.begin_frame(1.0 / 30.0);
        assert_eq!(plan.fixed_steps, 0);
        assert_eq!(clock.accumulator(), 0.0);
    }

    #[test]
    fn test_step_runs_exactly_one_iteration() {
        let mut clock = FrameClock::default();
        clock.pause();
        clock.step();

        let plan = clock.begin_frame(0.0);
        assert_eq!(plan.fixed_steps, 1);

        // Step flag clears after one frame
        let plan = clock.begin_frame(0.0);
        assert_eq!(plan.fixed_steps, 0);
    }

    #[test]
    fn test_history_ring_wraps() {
        let mut clock = FrameClock::default();
        for i in 0..(DT_HISTORY_LEN + 5) {
            clock.begin_frame(i as f32 * 1e-4);
        }
        let history = clock.history().snapshot();
        assert_eq!(history.len(), DT_HISTORY_LEN);
        // Oldest surviving sample is frame 5
        assert!((history[0] - 5e-4).abs() < 1e-9);
    }
}
