use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::scene::SceneError;

/// Assumed playback rate for clips that do not specify one.
pub const DEFAULT_TICKS_PER_SECOND: f64 = 25.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VectorKey {
    pub time: f64,
    pub value: Vec3,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct QuatKey {
    pub time: f64,
    pub value: Quat,
}

/// Key tracks animating a single node. Any track may be empty, in which
/// case the channel's default applies (zero translation, identity
/// rotation, unit scale).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeChannel {
    pub node_name: String,
    pub position_keys: Vec<VectorKey>,
    pub rotation_keys: Vec<QuatKey>,
    pub scaling_keys: Vec<VectorKey>,
}

/// One animation, immutable once loaded. Key times are in ticks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    pub duration_in_ticks: f64,
    /// As exported; importers commonly leave this at 0 for "unspecified".
    pub ticks_per_second: f64,
    pub channels: Vec<NodeChannel>,
}

impl AnimationClip {
    pub fn effective_ticks_per_second(&self) -> f64 {
        if self.ticks_per_second > 0.0 {
            self.ticks_per_second
        } else {
            DEFAULT_TICKS_PER_SECOND
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_in_ticks / self.effective_ticks_per_second()
    }

    /// Key times must be non-decreasing within each track.
    pub fn validate(&self) -> Result<(), SceneError> {
        for channel in &self.channels {
            let sorted = times_sorted(&channel.position_keys, |k| k.time)
                && times_sorted(&channel.rotation_keys, |k| k.time)
                && times_sorted(&channel.scaling_keys, |k| k.time);
            if !sorted {
                return Err(SceneError::UnsortedKeys {
                    clip: self.name.clone(),
                    channel: channel.node_name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn times_sorted<K>(keys: &[K], time_of: fn(&K) -> f64) -> bool {
    keys.windows(2).all(|w| time_of(&w[0]) <= time_of(&w[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_per_second_defaults() {
        let mut clip = AnimationClip {
            name: "a".to_owned(),
            duration_in_ticks: 50.0,
            ticks_per_second: 0.0,
            channels: vec![],
        };
        assert_eq!(clip.effective_ticks_per_second(), 25.0);
        assert_eq!(clip.duration_seconds(), 2.0);
        clip.ticks_per_second = -1.0;
        assert_eq!(clip.effective_ticks_per_second(), 25.0);
        clip.ticks_per_second = 30.0;
        assert_eq!(clip.effective_ticks_per_second(), 30.0);
    }

    #[test]
    fn rejects_decreasing_key_times() {
        let clip = AnimationClip {
            name: "a".to_owned(),
            duration_in_ticks: 10.0,
            ticks_per_second: 25.0,
            channels: vec![NodeChannel {
                node_name: "n".to_owned(),
                position_keys: vec![
                    VectorKey { time: 5.0, value: Vec3::ZERO },
                    VectorKey { time: 1.0, value: Vec3::ZERO },
                ],
                rotation_keys: vec![],
                scaling_keys: vec![],
            }],
        };
        assert!(matches!(clip.validate(), Err(SceneError::UnsortedKeys { .. })));
    }
}
