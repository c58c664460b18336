use crate::reflector::{ReflectorConfig, ReflectorRuntime};

/// Owns every live mirror runtime and amortizes their off-screen re-renders.
///
/// Mirror content changes slowly relative to frame rate, so re-rendering all
/// targets every frame buys little fidelity for a lot of GPU time. Instead a
/// scheduler-owned counter wraps modulo the throttle period; only on the wrap
/// are all mirrors marked dirty and re-rendered that tick.
pub struct ReflectionScheduler {
    period: u32,
    default_resolution: u32,
    frame_counter: u32,
    runtimes: Vec<ReflectorRuntime>,
}

impl ReflectionScheduler {
    pub fn new(period: u32, default_resolution: u32) -> Self {
        Self { period: period.max(1), default_resolution, frame_counter: 0, runtimes: Vec::new() }
    }

    /// Replaces the whole mirror set. Every previous runtime is disposed
    /// (render target and overlay freed) before the replacements exist, so a
    /// stale runtime can never be rendered or sampled afterwards.
    pub fn rebuild(&mut self, configs: &[ReflectorConfig]) {
        for runtime in &mut self.runtimes {
            runtime.dispose();
        }
        self.runtimes.clear();
        self.runtimes
            .extend(configs.iter().filter_map(|config| {
                ReflectorRuntime::new(config.clone(), self.default_resolution)
            }));
        self.frame_counter = 0;
        eprintln!("[reflector] scheduler rebuilt with {} mirror(s)", self.runtimes.len());
    }

    /// Advances the frame counter. Returns true when the counter wrapped this
    /// tick, in which case every runtime has been marked dirty and should be
    /// re-rendered before the main pass. Cooperative skipping only — no
    /// blocking, no deferred work.
    pub fn tick(&mut self) -> bool {
        if self.runtimes.is_empty() {
            return false;
        }
        self.frame_counter = (self.frame_counter + 1) % self.period;
        if self.frame_counter != 0 {
            return false;
        }
        for runtime in &mut self.runtimes {
            runtime.dirty = true;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    pub fn runtimes(&self) -> &[ReflectorRuntime] {
        &self.runtimes
    }

    pub fn runtimes_mut(&mut self) -> &mut [ReflectorRuntime] {
        &mut self.runtimes
    }

    /// Disposes everything. Called on unmount; idempotent.
    pub fn clear(&mut self) {
        for runtime in &mut self.runtimes {
            runtime.dispose();
        }
        self.runtimes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror(width: f32, height: f32) -> ReflectorConfig {
        ReflectorConfig {
            position: [0.0, 1.0, 1.75],
            rotation: [-std::f32::consts::PI, 0.0, 0.0],
            width,
            height,
            color: [0.63, 0.63, 0.63],
            clip_bias: 0.003,
            overlay_opacity: 0.5,
            overlay_offset: [0.0, 0.0, -0.01],
            resolution: None,
        }
    }

    #[test]
    fn ticks_fire_on_period_boundaries_only() {
        let mut scheduler = ReflectionScheduler::new(6, 64);
        scheduler.rebuild(&[mirror(1.0, 1.0)]);
        let mut fired = Vec::new();
        for frame in 1..=20 {
            if scheduler.tick() {
                fired.push(frame);
            }
        }
        assert_eq!(fired, vec![6, 12, 18]);
    }

    #[test]
    fn tick_without_mirrors_is_a_no_op() {
        let mut scheduler = ReflectionScheduler::new(6, 64);
        for _ in 0..24 {
            assert!(!scheduler.tick());
        }
    }

    #[test]
    fn rebuild_drops_degenerate_configs() {
        let mut scheduler = ReflectionScheduler::new(6, 64);
        scheduler.rebuild(&[mirror(1.0, 1.0), mirror(0.0, 1.0), mirror(2.0, 2.0)]);
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn rebuild_replaces_previous_runtimes() {
        let mut scheduler = ReflectionScheduler::new(6, 64);
        scheduler.rebuild(&[mirror(1.0, 1.0), mirror(2.0, 2.0), mirror(3.0, 3.0)]);
        assert_eq!(scheduler.len(), 3);

        scheduler.rebuild(&[mirror(4.0, 4.0)]);
        assert_eq!(scheduler.len(), 1);
        assert!((scheduler.runtimes()[0].config.width - 4.0).abs() < f32::EPSILON);
        // Counter restarts so the new set is not immediately dirty.
        assert!(scheduler.runtimes().iter().all(|runtime| !runtime.dirty));
    }

    #[test]
    fn clear_disposes_all() {
        let mut scheduler = ReflectionScheduler::new(6, 64);
        scheduler.rebuild(&[mirror(1.0, 1.0)]);
        scheduler.clear();
        assert!(scheduler.is_empty());
        assert!(!scheduler.tick());
    }
}
