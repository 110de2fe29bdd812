use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use super::clip::{AnimationClip, QuatKey, VectorKey};

/// Key indices from the previous evaluation, one triple per channel.
/// Valid only while playback moves forward; reset to the track start
/// whenever the query time runs backwards (rewind, loop wrap).
#[derive(Clone, Copy, Default)]
struct FrameHint {
    position: usize,
    rotation: usize,
    scaling: usize,
}

/// Evaluates one clip's node channels at a given time in ticks,
/// producing a local transform per channel. Translation and rotation
/// interpolate (lerp/slerp); scaling snaps to the nearest key, matching
/// the source data most exporters produce for it.
pub struct ClipEvaluator {
    clip: Arc<AnimationClip>,
    hints: Vec<FrameHint>,
    transforms: Vec<Mat4>,
    last_time: f64,
}

impl ClipEvaluator {
    pub fn new(clip: Arc<AnimationClip>) -> Self {
        let channel_count = clip.channels.len();
        Self {
            clip,
            hints: vec![FrameHint::default(); channel_count],
            transforms: vec![Mat4::IDENTITY; channel_count],
            last_time: 0.0,
        }
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    /// Evaluated local transforms, in channel order.
    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    /// Evaluate all channels. `time` is in ticks, already wrapped into
    /// the clip's duration by the caller.
    pub fn evaluate(&mut self, time: f64) {
        let clip = Arc::clone(&self.clip);
        let duration = clip.duration_in_ticks;
        let forward = time >= self.last_time;
        for (i, channel) in clip.channels.iter().enumerate() {
            let hint = &mut self.hints[i];
            let (position, frame) = sample_position(
                &channel.position_keys,
                time,
                duration,
                if forward { hint.position } else { 0 },
            );
            hint.position = frame;
            let (rotation, frame) = sample_rotation(
                &channel.rotation_keys,
                time,
                duration,
                if forward { hint.rotation } else { 0 },
            );
            hint.rotation = frame;
            let (scaling, frame) = sample_scaling(
                &channel.scaling_keys,
                time,
                if forward { hint.scaling } else { 0 },
            );
            hint.scaling = frame;
            self.transforms[i] = Mat4::from_scale_rotation_translation(scaling, rotation, position);
        }
        self.last_time = time;
    }

    /// Evaluate using the last key of every track, bypassing the time
    /// lookup. Used when a non-looping clock is clamped to the clip end,
    /// where float noise in the tick modulo could wrap back to key 0.
    pub fn evaluate_end_position(&mut self) {
        let clip = Arc::clone(&self.clip);
        for (i, channel) in clip.channels.iter().enumerate() {
            let position = channel.position_keys.last().map_or(Vec3::ZERO, |k| k.value);
            let rotation = channel.rotation_keys.last().map_or(Quat::IDENTITY, |k| k.value);
            let scaling = channel.scaling_keys.last().map_or(Vec3::ONE, |k| k.value);
            let hint = &mut self.hints[i];
            hint.position = channel.position_keys.len().saturating_sub(1);
            hint.rotation = channel.rotation_keys.len().saturating_sub(1);
            hint.scaling = channel.scaling_keys.len().saturating_sub(1);
            self.transforms[i] = Mat4::from_scale_rotation_translation(scaling, rotation, position);
        }
        self.last_time = clip.duration_in_ticks;
    }
}

/// Largest `frame` with `keys[frame].time <= time`, searching forward
/// from `start`.
fn find_frame<K>(keys: &[K], time_of: fn(&K) -> f64, time: f64, start: usize) -> usize {
    let mut frame = start;
    while frame + 1 < keys.len() {
        if time < time_of(&keys[frame + 1]) {
            break;
        }
        frame += 1;
    }
    frame
}

fn sample_position(keys: &[VectorKey], time: f64, duration: f64, start: usize) -> (Vec3, usize) {
    if keys.is_empty() {
        return (Vec3::ZERO, 0);
    }
    let frame = find_frame(keys, |k| k.time, time, start);
    let key = keys[frame];
    let next_key = keys[(frame + 1) % keys.len()];
    let mut diff = next_key.time - key.time;
    if diff < 0.0 {
        // wrapped around to the first key
        diff += duration;
    }
    let value = if diff > 0.0 {
        let factor = ((time - key.time) / diff) as f32;
        key.value.lerp(next_key.value, factor)
    } else {
        key.value
    };
    (value, frame)
}

fn sample_rotation(keys: &[QuatKey], time: f64, duration: f64, start: usize) -> (Quat, usize) {
    if keys.is_empty() {
        return (Quat::IDENTITY, 0);
    }
    let frame = find_frame(keys, |k| k.time, time, start);
    let key = keys[frame];
    let next_key = keys[(frame + 1) % keys.len()];
    let mut diff = next_key.time - key.time;
    if diff < 0.0 {
        diff += duration;
    }
    let value = if diff > 0.0 {
        let factor = ((time - key.time) / diff) as f32;
        key.value.slerp(next_key.value, factor)
    } else {
        key.value
    };
    (value, frame)
}

fn sample_scaling(keys: &[VectorKey], time: f64, start: usize) -> (Vec3, usize) {
    if keys.is_empty() {
        return (Vec3::ONE, 0);
    }
    let frame = find_frame(keys, |k| k.time, time, start);
    (keys[frame].value, frame)
}
