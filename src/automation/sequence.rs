use std::sync::Arc;

use crate::automation::keyframe::KeyFrame;
use crate::automation::parameter::{Parameter, ValueAccessor};
use crate::automation::value::{AutomationValue, DataType};
use crate::foundation::error::{ReelError, ReelResult};
use crate::persist::data::{DataDict, DataValue};
use crate::timeline::props::VideoProps;

/// Key frames to sample for a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyFrameIndices {
    /// Exact hit, or flat extrapolation before the first / after the last key frame.
    Single(usize),
    /// Bracketing pair `(before, after)`.
    Pair(usize, usize),
}

/// Key frames and override state of one parameter on one owner.
///
/// The key frame list is always sorted ascending by frame. Several key frames may share a
/// frame; the one inserted last sits after the others and wins exact-hit lookups.
#[derive(Clone, Debug)]
pub struct AutomationSequence {
    parameter: Arc<Parameter>,
    key_frames: Vec<KeyFrame>,
    default_key_frame: KeyFrame,
    override_enabled: bool,
    current: AutomationValue,
}

impl AutomationSequence {
    pub fn new(parameter: Arc<Parameter>) -> Self {
        let default = parameter.descriptor().default_value();
        Self {
            parameter,
            key_frames: Vec::new(),
            default_key_frame: KeyFrame::new(0, default),
            override_enabled: false,
            current: default,
        }
    }

    pub fn parameter(&self) -> &Arc<Parameter> {
        &self.parameter
    }

    pub fn data_type(&self) -> DataType {
        self.parameter.data_type()
    }

    pub fn key_frames(&self) -> &[KeyFrame] {
        &self.key_frames
    }

    pub fn len(&self) -> usize {
        self.key_frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_frames.is_empty()
    }

    pub fn has_key_frames(&self) -> bool {
        !self.key_frames.is_empty()
    }

    /// The override key frame: used when overriding or when there are no key frames.
    pub fn default_key_frame(&self) -> &KeyFrame {
        &self.default_key_frame
    }

    pub fn is_override_enabled(&self) -> bool {
        self.override_enabled
    }

    /// Automated (rather than overridden): not overriding and at least one key frame.
    pub fn can_automate(&self) -> bool {
        !self.override_enabled && !self.key_frames.is_empty()
    }

    /// Last value written by [`AutomationSequence::update_value`].
    pub fn current_value(&self) -> AutomationValue {
        self.current
    }

    /// Key frames to sample at `frame`. `None` for negative frames or an empty list.
    pub fn indices_for_frame(&self, frame: i64) -> Option<KeyFrameIndices> {
        if frame < 0 || self.key_frames.is_empty() {
            return None;
        }
        // first key frame strictly after `frame`; its predecessor is the last one at or before
        let after = self.key_frames.partition_point(|k| k.frame() <= frame);
        if after == 0 {
            return Some(KeyFrameIndices::Single(0));
        }
        let before = after - 1;
        if self.key_frames[before].frame() == frame || after == self.key_frames.len() {
            return Some(KeyFrameIndices::Single(before));
        }
        Some(KeyFrameIndices::Pair(before, after))
    }

    /// Effective value at `frame`, honouring the override unless `ignore_override`.
    pub fn value_at(&self, frame: i64, ignore_override: bool) -> AutomationValue {
        if self.override_enabled && !ignore_override {
            return self.default_key_frame.value();
        }
        match self.indices_for_frame(frame) {
            None => self.default_key_frame.value(),
            Some(KeyFrameIndices::Single(i)) => self.key_frames[i].value(),
            Some(KeyFrameIndices::Pair(a, b)) => {
                let rounding = self.parameter.descriptor().rounding();
                self.key_frames[a].interpolate(frame, &self.key_frames[b], rounding)
            }
        }
    }

    pub fn get_float_value(&self, frame: i64, ignore_override: bool) -> ReelResult<f32> {
        let v = self.value_at(frame, ignore_override);
        v.as_f32().ok_or_else(|| self.kind_error(DataType::Float))
    }

    pub fn get_double_value(&self, frame: i64, ignore_override: bool) -> ReelResult<f64> {
        let v = self.value_at(frame, ignore_override);
        v.as_f64().ok_or_else(|| self.kind_error(DataType::Double))
    }

    pub fn get_long_value(&self, frame: i64, ignore_override: bool) -> ReelResult<i64> {
        let v = self.value_at(frame, ignore_override);
        v.as_i64().ok_or_else(|| self.kind_error(DataType::Long))
    }

    pub fn get_bool_value(&self, frame: i64, ignore_override: bool) -> ReelResult<bool> {
        let v = self.value_at(frame, ignore_override);
        v.as_bool().ok_or_else(|| self.kind_error(DataType::Bool))
    }

    pub fn get_vector2_value(&self, frame: i64, ignore_override: bool) -> ReelResult<kurbo::Vec2> {
        let v = self.value_at(frame, ignore_override);
        v.as_vec2().ok_or_else(|| self.kind_error(DataType::Vector2))
    }

    fn kind_error(&self, asked: DataType) -> ReelError {
        ReelError::automation(format!(
            "parameter '{}' is {:?}, not {:?}",
            self.parameter.key(),
            self.data_type(),
            asked
        ))
    }

    fn check(&self, kf: &KeyFrame) -> ReelResult<()> {
        if kf.frame() < 0 {
            return Err(ReelError::automation(format!(
                "key frame frame must be >= 0, got {}",
                kf.frame()
            )));
        }
        if kf.data_type() != self.data_type() {
            return Err(ReelError::automation(format!(
                "key frame of type {:?} cannot join a {:?} sequence for '{}'",
                kf.data_type(),
                self.data_type(),
                self.parameter.key()
            )));
        }
        Ok(())
    }

    /// Insert keeping the list sorted; scans from the tail. Returns the insertion index.
    pub fn add_key_frame(&mut self, mut kf: KeyFrame) -> ReelResult<usize> {
        self.check(&kf)?;
        kf.set_value(self.parameter.descriptor().clamp(kf.value()))?;
        let index = self
            .key_frames
            .iter()
            .rposition(|k| kf.frame() >= k.frame())
            .map_or(0, |i| i + 1);
        self.key_frames.insert(index, kf);
        Ok(index)
    }

    pub fn add_new_key_frame(&mut self, frame: i64, value: AutomationValue) -> ReelResult<usize> {
        self.add_key_frame(KeyFrame::new(frame, value))
    }

    pub fn remove_key_frame_at(&mut self, index: usize) -> ReelResult<KeyFrame> {
        if index >= self.key_frames.len() {
            return Err(ReelError::automation(format!(
                "key frame index {index} out of range ({} key frames)",
                self.key_frames.len()
            )));
        }
        Ok(self.key_frames.remove(index))
    }

    /// Remove the first key frame value-equal to `kf`.
    pub fn remove_key_frame(&mut self, kf: &KeyFrame) -> bool {
        match self.index_of(kf) {
            Some(i) => {
                self.key_frames.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn index_of(&self, kf: &KeyFrame) -> Option<usize> {
        self.key_frames.iter().position(|k| k.is_equal_to(kf))
    }

    /// Index of the last key frame exactly at `frame`.
    pub fn last_frame_exactly_at(&self, frame: i64) -> Option<usize> {
        match self.indices_for_frame(frame) {
            Some(KeyFrameIndices::Single(i)) if self.key_frames[i].frame() == frame => Some(i),
            _ => None,
        }
    }

    /// Existing key frame at `frame`, or a new one holding either the value currently
    /// sampled there (`assign_current`) or the parameter default.
    pub fn get_or_create_key_frame_at(
        &mut self,
        frame: i64,
        assign_current: bool,
    ) -> ReelResult<usize> {
        if let Some(i) = self.last_frame_exactly_at(frame) {
            return Ok(i);
        }
        let value = if assign_current {
            self.value_at(frame, true)
        } else {
            self.parameter.descriptor().default_value()
        };
        self.add_new_key_frame(frame, value)
    }

    pub fn set_key_frame_value(&mut self, index: usize, value: AutomationValue) -> ReelResult<()> {
        let value = self.parameter.descriptor().clamp(value);
        let len = self.key_frames.len();
        let kf = self.key_frames.get_mut(index).ok_or_else(|| {
            ReelError::automation(format!("key frame index {index} out of range ({len})"))
        })?;
        kf.set_value(value)
    }

    pub fn set_key_frame_curve_bend(&mut self, index: usize, bend: f64) -> ReelResult<()> {
        let len = self.key_frames.len();
        let kf = self.key_frames.get_mut(index).ok_or_else(|| {
            ReelError::automation(format!("key frame index {index} out of range ({len})"))
        })?;
        kf.set_curve_bend(bend);
        Ok(())
    }

    /// Move a key frame in time; returns its new index.
    pub fn move_key_frame(&mut self, index: usize, frame: i64) -> ReelResult<usize> {
        if frame < 0 {
            return Err(ReelError::automation(format!(
                "key frame frame must be >= 0, got {frame}"
            )));
        }
        let mut kf = self.remove_key_frame_at(index)?;
        kf.set_frame(frame);
        self.add_key_frame(kf)
    }

    pub fn clear(&mut self) {
        self.key_frames.clear();
    }

    pub fn set_default_value(&mut self, value: AutomationValue) -> ReelResult<()> {
        self.default_key_frame
            .set_value(self.parameter.descriptor().clamp(value))
    }

    /// Toggle the override. Enabling with a playhead captures the automated value sampled
    /// there into the override key frame so the visible value does not jump.
    pub fn set_override_enabled(&mut self, enabled: bool, capture_at: Option<i64>) {
        if enabled == self.override_enabled {
            return;
        }
        if enabled && let Some(frame) = capture_at {
            let v = self.value_at(frame, true);
            self.default_key_frame = KeyFrame::new(0, v);
        }
        self.override_enabled = enabled;
    }

    /// Evaluate at `frame` and write the result through the parameter accessor.
    ///
    /// Returns `true` only if the written value differs from the previous one.
    pub fn update_value(&mut self, frame: i64, props: &mut VideoProps) -> bool {
        let value = self.value_at(frame, false);
        let changed = match self.parameter.accessor() {
            ValueAccessor::Props { .. } => self.parameter.write_props(props, value),
            ValueAccessor::Stored => self.current != value,
        };
        self.current = value;
        changed
    }

    pub fn write(&self, d: &mut DataDict) {
        d.set("DataType", self.data_type().to_byte());
        d.set("IsOverrideEnabled", self.override_enabled);
        let mut default = DataDict::new();
        self.default_key_frame.write(&mut default);
        d.set("DefaultKeyFrame", default);
        let list: Vec<DataValue> = self
            .key_frames
            .iter()
            .map(|kf| {
                let mut kd = DataDict::new();
                kf.write(&mut kd);
                DataValue::Dict(kd)
            })
            .collect();
        d.set("KeyFrames", list);
    }

    /// Rebuild a sequence for `parameter`; the key frames are re-sorted by frame.
    pub fn read(d: &DataDict, parameter: Arc<Parameter>) -> ReelResult<Self> {
        let ty = DataType::from_byte(d.get_u8("DataType")?)?;
        if ty != parameter.data_type() {
            return Err(ReelError::serde(format!(
                "saved sequence for '{}' is {:?}, parameter is {:?}",
                parameter.key(),
                ty,
                parameter.data_type()
            )));
        }
        let mut seq = Self::new(parameter);
        seq.override_enabled = d.get_bool("IsOverrideEnabled")?;
        seq.default_key_frame = KeyFrame::read(d.get_dict("DefaultKeyFrame")?, ty)?;
        let list = d.get_list("KeyFrames")?;
        let mut key_frames = Vec::with_capacity(list.len());
        for item in list {
            key_frames.push(KeyFrame::read(item.as_dict()?, ty)?);
        }
        key_frames.sort_by_key(KeyFrame::frame);
        seq.key_frames = key_frames;
        Ok(seq)
    }

    /// Same key frames and override state.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.parameter == other.parameter
            && self.override_enabled == other.override_enabled
            && self.default_key_frame.is_equal_to(&other.default_key_frame)
            && self.key_frames.len() == other.key_frames.len()
            && self
                .key_frames
                .iter()
                .zip(&other.key_frames)
                .all(|(a, b)| a == b)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/automation/sequence.rs"]
mod tests;
