use vitrine::reflection_scheduler::ReflectionScheduler;
use vitrine::reflector::ReflectorConfig;

fn mirror(width: f32) -> ReflectorConfig {
    ReflectorConfig {
        position: [0.0, 1.0, 1.75],
        rotation: [-std::f32::consts::PI, 0.0, 0.0],
        width,
        height: 1.96,
        color: [0.627, 0.627, 0.627],
        clip_bias: 0.003,
        overlay_opacity: 0.0,
        overlay_offset: [0.0, 0.0, -0.01],
        resolution: None,
    }
}

#[test]
fn throttle_marks_mirrors_every_sixth_frame() {
    let mut scheduler = ReflectionScheduler::new(6, 256);
    scheduler.rebuild(&[mirror(1.0), mirror(2.0)]);

    let mut dirty_frames = Vec::new();
    for frame in 1..=20 {
        if scheduler.tick() {
            dirty_frames.push(frame);
            assert!(scheduler.runtimes().iter().all(|runtime| runtime.dirty));
            for runtime in scheduler.runtimes_mut() {
                runtime.dirty = false;
            }
        } else {
            assert!(scheduler.runtimes().iter().all(|runtime| !runtime.dirty));
        }
    }
    assert_eq!(dirty_frames, vec![6, 12, 18]);
}

#[test]
fn period_of_one_fires_every_frame() {
    let mut scheduler = ReflectionScheduler::new(1, 256);
    scheduler.rebuild(&[mirror(1.0)]);
    for _ in 0..5 {
        assert!(scheduler.tick());
    }
}

#[test]
fn zero_period_is_clamped() {
    let mut scheduler = ReflectionScheduler::new(0, 256);
    scheduler.rebuild(&[mirror(1.0)]);
    // A period of zero would divide by zero; it degrades to every frame.
    assert!(scheduler.tick());
}

#[test]
fn rebuild_swaps_the_mirror_set() {
    let mut scheduler = ReflectionScheduler::new(6, 256);
    scheduler.rebuild(&[mirror(1.0), mirror(2.0), mirror(3.0)]);
    assert_eq!(scheduler.len(), 3);

    scheduler.rebuild(&[mirror(4.0), mirror(5.0)]);
    assert_eq!(scheduler.len(), 2);
    let widths: Vec<f32> = scheduler.runtimes().iter().map(|r| r.config.width).collect();
    assert_eq!(widths, vec![4.0, 5.0]);
    // Old runtimes were disposed with their GPU bundles released.
    assert!(scheduler.runtimes().iter().all(|runtime| runtime.gpu.is_none()));
}

#[test]
fn clear_is_idempotent() {
    let mut scheduler = ReflectionScheduler::new(6, 256);
    scheduler.rebuild(&[mirror(1.0)]);
    scheduler.clear();
    scheduler.clear();
    assert!(scheduler.is_empty());
    assert!(!scheduler.tick());
}

#[test]
fn resolution_defaults_flow_from_the_scheduler() {
    let mut scheduler = ReflectionScheduler::new(6, 512);
    let mut overridden = mirror(1.0);
    overridden.resolution = Some(128);
    scheduler.rebuild(&[mirror(1.0), overridden]);
    let resolutions: Vec<u32> = scheduler.runtimes().iter().map(|r| r.resolution).collect();
    assert_eq!(resolutions, vec![512, 128]);
}
