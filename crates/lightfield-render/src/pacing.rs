//! Frame pacing toward a target frame rate

use std::time::{Duration, Instant};

/// Slack left for the platform's own vsync wait
const VSYNC_SLACK: Duration = Duration::from_nanos(1_000_000_000 / 120);

/// Extra wait after a frame that took `render_time` to reach `target_fps`.
///
/// Zero or negative targets disable pacing.
pub fn frame_delay(target_fps: f32, render_time: Duration) -> Duration {
    if !(target_fps > 0.0) || !target_fps.is_finite() {
        return Duration::ZERO;
    }
    Duration::from_secs_f32(1.0 / target_fps)
        .saturating_sub(render_time)
        .saturating_sub(VSYNC_SLACK)
}

/// When the next frame should start, for a frame that started at `frame_start`
pub fn next_frame_deadline(target_fps: f32, frame_start: Instant, now: Instant) -> Instant {
    now + frame_delay(target_fps, now.saturating_duration_since(frame_start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_frame_waits_for_remaining_budget() {
        let d = frame_delay(30.0, Duration::from_millis(10));
        // 33.3 - 10 - 8.3
        assert!((d.as_secs_f32() - 0.015).abs() < 1e-3, "{:?}", d);
    }

    #[test]
    fn slow_frame_does_not_wait() {
        assert_eq!(frame_delay(60.0, Duration::from_millis(20)), Duration::ZERO);
    }

    #[test]
    fn disabled_target() {
        assert_eq!(frame_delay(0.0, Duration::ZERO), Duration::ZERO);
        assert_eq!(frame_delay(-5.0, Duration::ZERO), Duration::ZERO);
        assert_eq!(frame_delay(f32::NAN, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn deadline_is_never_in_the_past() {
        let start = Instant::now();
        let now = start + Duration::from_millis(50);
        assert!(next_frame_deadline(60.0, start, now) >= now);
    }
}
