use super::handle::AudioTrackHandle;

/// Play-head animation state, refreshed once per display frame while playing.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    running: bool,
    position: f64,
    duration: f64,
    frames: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// No further frames are requested after this
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// One redraw. Returns whether another frame should be scheduled.
    pub fn frame(&mut self, canonical: &AudioTrackHandle) -> bool {
        if !self.running {
            return false;
        }
        self.sync(canonical);
        self.frames += 1;
        true
    }

    /// Read the clock without counting a frame (after a seek while paused)
    pub fn sync(&mut self, canonical: &AudioTrackHandle) {
        self.position = canonical.position();
        self.duration = canonical.duration();
    }

    pub fn fraction(&self) -> f64 {
        if self.duration > 0.0 {
            (self.position / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn position_secs(&self) -> f64 {
        self.position
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Map a click on the progress bar to a 0..=1 seek target
    pub fn fraction_from_click(click_x: f64, bar_left: f64, bar_width: f64) -> Option<f64> {
        if !(bar_width > 0.0) || !click_x.is_finite() {
            return None;
        }
        Some(((click_x - bar_left) / bar_width).clamp(0.0, 1.0))
    }
}

/// `m:ss` like the now-playing bar shows it
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::ScriptedBackend;
    use crate::audio::track::TrackRole;

    #[tokio::test]
    async fn test_frames_only_while_running() {
        let backend = ScriptedBackend::auto_resolving();
        backend.set_duration("p.wav", 200.0);
        let handle = AudioTrackHandle::new(TrackRole::Before);
        handle.load(&backend, "p.wav", 1).await.unwrap();
        handle.seek_to(50.0);

        let mut tracker = ProgressTracker::new();
        assert!(!tracker.frame(&handle));
        assert_eq!(tracker.frames(), 0);

        tracker.start();
        assert!(tracker.frame(&handle));
        assert_eq!(tracker.fraction(), 0.25);
        assert_eq!(tracker.position_secs(), 50.0);

        tracker.stop();
        handle.seek_to(100.0);
        assert!(!tracker.frame(&handle));
        assert_eq!(tracker.fraction(), 0.25);
        assert_eq!(tracker.frames(), 1);

        tracker.sync(&handle);
        assert_eq!(tracker.fraction(), 0.5);
    }

    #[test]
    fn test_click_fraction() {
        assert_eq!(ProgressTracker::fraction_from_click(60.0, 10.0, 200.0), Some(0.25));
        assert_eq!(ProgressTracker::fraction_from_click(5.0, 10.0, 200.0), Some(0.0));
        assert_eq!(ProgressTracker::fraction_from_click(900.0, 10.0, 200.0), Some(1.0));
        assert_eq!(ProgressTracker::fraction_from_click(50.0, 10.0, 0.0), None);
    }

    #[test]
    fn test_empty_duration_fraction() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.fraction(), 0.0);
        assert_eq!(format_clock(0.0), "0:00");
        assert_eq!(format_clock(125.9), "2:05");
        assert_eq!(format_clock(f64::NAN), "0:00");
    }
}
