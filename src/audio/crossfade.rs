use super::handle::AudioTrackHandle;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_CROSSFADE_MS: u64 = 100;
pub const DEFAULT_CROSSFADE_STEPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfadeSettings {
    pub duration: Duration,
    pub steps: u32,
}

impl Default for CrossfadeSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(DEFAULT_CROSSFADE_MS),
            steps: DEFAULT_CROSSFADE_STEPS,
        }
    }
}

struct Ramp {
    fade_out: AudioTrackHandle,
    fade_in: AudioTrackHandle,
    from_out: f32,
    from_in: f32,
    started_at: Instant,
    step_interval: Duration,
    steps_applied: u32,
}

impl Ramp {
    fn apply(&self, step: u32, steps: u32) {
        if step >= steps {
            // land exactly on the 0/1 split whatever the float drift
            self.fade_out.set_volume(0.0);
            self.fade_in.set_volume(1.0);
            return;
        }
        let t = step as f32 / steps as f32;
        self.fade_out.set_volume(self.from_out * (1.0 - t));
        self.fade_in.set_volume(self.from_in + (1.0 - self.from_in) * t);
    }
}

/// Linear, stepped volume ramp between the two handles of a dual song.
///
/// Playback is never touched, only volumes. One ramp at a time: a new
/// request replaces the running one and starts from the volumes it left.
pub struct CrossfadeEngine {
    settings: CrossfadeSettings,
    ramp: Option<Ramp>,
}

impl CrossfadeEngine {
    pub fn new(settings: CrossfadeSettings) -> Self {
        Self {
            settings,
            ramp: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ramp.is_some()
    }

    pub fn steps_applied(&self) -> Option<u32> {
        self.ramp.as_ref().map(|ramp| ramp.steps_applied)
    }

    fn steps(&self) -> u32 {
        self.settings.steps.max(1)
    }

    /// Ramp `fade_out` to 0 and `fade_in` to 1 over the configured duration.
    pub fn crossfade(&mut self, fade_out: &AudioTrackHandle, fade_in: &AudioTrackHandle, now: Instant) {
        if self.ramp.take().is_some() {
            debug!("Crossfade interrupted, restarting from current volumes");
        }

        if self.settings.duration.is_zero() {
            fade_out.set_volume(0.0);
            fade_in.set_volume(1.0);
            return;
        }

        self.ramp = Some(Ramp {
            fade_out: fade_out.clone(),
            fade_in: fade_in.clone(),
            from_out: fade_out.volume(),
            from_in: fade_in.volume(),
            started_at: now,
            step_interval: self.settings.duration / self.steps(),
            steps_applied: 0,
        });
    }

    /// Apply every step that is due by `now`. True while the ramp is still running.
    pub fn advance(&mut self, now: Instant) -> bool {
        let steps = self.steps();
        let Some(ramp) = self.ramp.as_mut() else {
            return false;
        };

        let elapsed = now.saturating_duration_since(ramp.started_at);
        let due = if ramp.step_interval.is_zero() {
            steps
        } else {
            (elapsed.as_nanos() / ramp.step_interval.as_nanos()).min(steps as u128) as u32
        };

        while ramp.steps_applied < due {
            ramp.steps_applied += 1;
            ramp.apply(ramp.steps_applied, steps);
        }

        if ramp.steps_applied >= steps {
            self.ramp = None;
            false
        } else {
            true
        }
    }

    /// Jump a running ramp straight to its end state
    pub fn finish(&mut self) {
        let steps = self.steps();
        if let Some(ramp) = self.ramp.take() {
            ramp.apply(steps, steps);
        }
    }

    /// Drop the ramp where it stands
    pub fn cancel(&mut self) {
        self.ramp = None;
    }
}

impl Default for CrossfadeEngine {
    fn default() -> Self {
        Self::new(CrossfadeSettings::default())
    }
}
