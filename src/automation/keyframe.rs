use crate::automation::value::{AutomationValue, DataType, LongRounding};
use crate::foundation::error::{ReelError, ReelResult};
use crate::persist::data::DataDict;

/// A `(frame, value)` anchor with an optional curve bend towards the next key frame.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KeyFrame {
    frame: i64,
    value: AutomationValue,
    curve_bend: f64,
}

impl KeyFrame {
    pub fn new(frame: i64, value: AutomationValue) -> Self {
        Self {
            frame,
            value,
            curve_bend: 0.0,
        }
    }

    pub fn with_curve_bend(mut self, bend: f64) -> Self {
        self.set_curve_bend(bend);
        self
    }

    pub fn frame(&self) -> i64 {
        self.frame
    }

    pub fn value(&self) -> AutomationValue {
        self.value
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }

    pub fn curve_bend(&self) -> f64 {
        self.curve_bend
    }

    /// Bend in `[-1, 1]`; non-finite values reset to a straight blend.
    pub fn set_curve_bend(&mut self, bend: f64) {
        self.curve_bend = if bend.is_finite() { bend.clamp(-1.0, 1.0) } else { 0.0 };
    }

    pub(crate) fn set_frame(&mut self, frame: i64) {
        self.frame = frame;
    }

    /// Replace the value; the kind must not change.
    pub fn set_value(&mut self, value: AutomationValue) -> ReelResult<()> {
        if value.data_type() != self.value.data_type() {
            return Err(ReelError::automation(format!(
                "key frame holds {:?}, cannot assign {:?}",
                self.value.data_type(),
                value.data_type()
            )));
        }
        self.value = value;
        Ok(())
    }

    /// Same frame and same value; curve bend is not compared.
    pub fn is_equal_to(&self, other: &Self) -> bool {
        self.frame == other.frame && self.value == other.value
    }

    /// Position of `frame` between this key frame and `next`, shaped by this key's bend.
    pub fn blend_factor(&self, frame: i64, next: &Self) -> f64 {
        let range = next.frame - self.frame;
        if range == 0 {
            return 1.0;
        }
        let t = ((frame - self.frame) as f64 / range as f64).clamp(0.0, 1.0);
        if self.curve_bend == 0.0 {
            t
        } else {
            t.powf(1.0 / self.curve_bend.abs())
        }
    }

    pub fn interpolate(&self, frame: i64, next: &Self, rounding: LongRounding) -> AutomationValue {
        let t = self.blend_factor(frame, next);
        self.value.interpolate(&next.value, t, rounding)
    }

    pub fn write(&self, d: &mut DataDict) {
        d.set("Time", self.frame);
        self.value.write_into(d, "Value");
        if self.curve_bend != 0.0 {
            d.set("CurveBend", self.curve_bend);
        }
    }

    pub fn read(d: &DataDict, ty: DataType) -> ReelResult<Self> {
        let frame = d.get_i64("Time")?;
        if frame < 0 {
            return Err(ReelError::serde(format!("key frame time {frame} is negative")));
        }
        let value = AutomationValue::read_from(d, "Value", ty)?;
        let mut kf = Self::new(frame, value);
        if d.contains("CurveBend") {
            kf.set_curve_bend(d.get_f64("CurveBend")?);
        }
        Ok(kf)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/automation/keyframe.rs"]
mod tests;
