//! Keyframe animation of stage parameters.
//!
//! An [`AnimTrack`] binds one parameter of one stage to a list of keys over
//! integer frames. Frames are kept strictly increasing; sampling interpolates
//! between the bracketing keys and clamps outside the key range.

use crate::param::{ParamType, ParamValue};
use crate::stage::StageId;

/// Result of a bracket lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPointer {
    /// Key at or before the frame. `None` before the first key when
    /// setting, and on an empty track. Equal to the key count when setting
    /// past the last key (insert after last).
    pub previous_index: Option<usize>,
    /// Frame of the previous key, 0 when there is none.
    pub previous_frame: i32,
    /// Key after the frame.
    pub next_index: usize,
    /// Frame of the next key, 0 when there is none.
    pub next_frame: i32,
    /// Position between the two keys, `0..=1`.
    pub ratio: f32,
}

/// Keyframes for one (stage, parameter) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimTrack {
    /// Animated stage.
    pub stage: StageId,
    /// Parameter index in the stage's schema.
    pub param_index: usize,
    /// Parameter type, fixes the interpolation curve.
    pub value_type: ParamType,
    frames: Vec<i32>,
    values: Vec<ParamValue>,
}

impl AnimTrack {
    /// Creates an empty track.
    pub fn new(stage: StageId, param_index: usize, value_type: ParamType) -> Self {
        Self {
            stage,
            param_index,
            value_type,
            frames: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Key frames in ascending order.
    pub fn frames(&self) -> &[i32] {
        &self.frames
    }

    /// Key values, parallel to [`frames`](Self::frames).
    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Finds the keys bracketing `frame`.
    ///
    /// With `setting == false` the lookup clamps: before the first key it
    /// points at key 0, past the last key at the last key, both with ratio 0.
    /// With `setting == true` a frame before the first key yields no previous
    /// key and a frame past the last key yields the insert-after-last index.
    pub fn pointer(&self, frame: i32, setting: bool) -> KeyPointer {
        let empty = KeyPointer {
            previous_index: if setting { None } else { Some(0) },
            previous_frame: 0,
            next_index: 0,
            next_frame: 0,
            ratio: 0.0,
        };
        let (Some(&first), Some(&last)) = (self.frames.first(), self.frames.last()) else {
            return KeyPointer {
                previous_index: None,
                ..empty
            };
        };

        if frame < first || (frame == first && !setting) {
            return KeyPointer {
                previous_index: if setting { None } else { Some(0) },
                previous_frame: first,
                next_index: 0,
                next_frame: first,
                ratio: 0.0,
            };
        }

        if frame >= last {
            let len = self.frames.len();
            let index = if setting && frame > last { len } else { len - 1 };
            return KeyPointer {
                previous_index: Some(index),
                previous_frame: last,
                next_index: index,
                next_frame: last,
                ratio: 0.0,
            };
        }

        // first <= frame < last: frames[i] <= frame < frames[i + 1]
        let i = self.frames.partition_point(|&f| f <= frame) - 1;
        let (f0, f1) = (self.frames[i], self.frames[i + 1]);
        KeyPointer {
            previous_index: Some(i),
            previous_frame: f0,
            next_index: i + 1,
            next_frame: f1,
            // Widened: keys may span the whole i32 range.
            ratio: (i64::from(frame) - i64::from(f0)) as f32
                / (i64::from(f1) - i64::from(f0)) as f32,
        }
    }

    /// Sets the key at `frame`, overwriting an existing key or inserting a
    /// new one in order. Values of the wrong type are ignored.
    pub fn set_value(&mut self, frame: i32, value: ParamValue) -> bool {
        if !value.fits(self.value_type) {
            return false;
        }
        let pointer = self.pointer(frame, true);
        match pointer.previous_index {
            Some(i) if i < self.frames.len() && self.frames[i] == frame => {
                self.values[i] = value;
            }
            Some(i) if i >= self.frames.len() => {
                self.frames.push(frame);
                self.values.push(value);
            }
            Some(i) => {
                self.frames.insert(i + 1, frame);
                self.values.insert(i + 1, value);
            }
            None => {
                self.frames.insert(0, frame);
                self.values.insert(0, value);
            }
        }
        true
    }

    /// Removes the key at exactly `frame`.
    pub fn remove_key(&mut self, frame: i32) -> Option<ParamValue> {
        let i = self.frames.binary_search(&frame).ok()?;
        self.frames.remove(i);
        Some(self.values.remove(i))
    }

    /// Samples the track. `None` on an empty track.
    pub fn value_at(&self, frame: i32) -> Option<ParamValue> {
        if self.is_empty() {
            return None;
        }
        let p = self.pointer(frame, false);
        let prev = p.previous_index.unwrap_or(0).min(self.values.len() - 1);
        let next = p.next_index.min(self.values.len() - 1);
        Some(self.values[prev].interpolate(&self.values[next], p.ratio, self.value_type))
    }
}
