use super::clip::AnimationClip;

/// Maps the wall-clock playback cursor into a clip's tick domain.
///
/// The cursor may exceed the clip duration, in which case it either
/// wraps (looping) or clamps to the final position. Clamped clocks
/// report `at_end()` so callers can switch to end-position evaluation
/// instead of trusting the modulo right at the seam.
pub struct AnimationClock {
    ticks_per_second: f64,
    duration_in_ticks: f64,
    playback_speed: f64,
    cursor: f64,
    looping: bool,
    at_end: bool,
}

impl AnimationClock {
    pub fn new(clip: &AnimationClip) -> Self {
        Self {
            ticks_per_second: clip.effective_ticks_per_second(),
            duration_in_ticks: clip.duration_in_ticks,
            playback_speed: 1.0,
            cursor: 0.0,
            looping: true,
            at_end: false,
        }
    }

    /// 1.0 plays at authored speed, 0.0 pauses.
    pub fn set_playback_speed(&mut self, speed: f64) {
        debug_assert!(speed >= 0.0);
        self.playback_speed = speed;
    }

    pub fn playback_speed(&self) -> f64 {
        self.playback_speed
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        // re-clamp the cursor under the new mode
        self.seek(self.cursor);
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn cursor_seconds(&self) -> f64 {
        self.cursor
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_in_ticks / self.ticks_per_second
    }

    /// Advance by a real-time delta scaled by playback speed.
    pub fn advance(&mut self, dt: f64) {
        self.seek(self.cursor + dt * self.playback_speed);
    }

    pub fn seek(&mut self, seconds: f64) {
        debug_assert!(seconds >= 0.0);
        self.cursor = seconds;
        if !self.looping && self.cursor > self.duration_seconds() {
            self.cursor = self.duration_seconds();
            self.at_end = true;
        } else {
            self.at_end = false;
        }
    }

    /// True when a non-looping clock has been clamped to the clip end.
    pub fn at_end(&self) -> bool {
        self.at_end
    }

    /// Current cursor position in ticks, wrapped into
    /// `[0, duration_in_ticks)`.
    pub fn ticks(&self) -> f64 {
        self.ticks_at(self.cursor)
    }

    /// Convert an arbitrary query time in seconds into wrapped ticks.
    pub fn ticks_at(&self, seconds: f64) -> f64 {
        let t = seconds * self.ticks_per_second;
        if self.duration_in_ticks > 0.0 {
            t % self.duration_in_ticks
        } else {
            0.0
        }
    }
}
