use kurbo::Vec2;

use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::{lerp_f32, lerp_f64};
use crate::persist::data::DataDict;

/// Kind of value a parameter animates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DataType {
    Float,
    Double,
    Long,
    Bool,
    Vector2,
}

impl DataType {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Self::Float => 0,
            Self::Double => 1,
            Self::Long => 2,
            Self::Bool => 3,
            Self::Vector2 => 4,
        }
    }

    pub(crate) fn from_byte(b: u8) -> ReelResult<Self> {
        Ok(match b {
            0 => Self::Float,
            1 => Self::Double,
            2 => Self::Long,
            3 => Self::Bool,
            4 => Self::Vector2,
            other => return Err(ReelError::serde(format!("unknown data type id {other}"))),
        })
    }
}

/// How an interpolated integer is brought back to a whole number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LongRounding {
    Truncate,
    Floor,
    Ceil,
    #[default]
    Round,
}

impl LongRounding {
    fn apply(self, v: f64) -> f64 {
        match self {
            Self::Truncate => v.trunc(),
            Self::Floor => v.floor(),
            Self::Ceil => v.ceil(),
            Self::Round => v.round(),
        }
    }
}

/// A value of one of the animatable data kinds.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AutomationValue {
    Float(f32),
    Double(f64),
    Long(i64),
    Bool(bool),
    Vector2(Vec2),
}

impl AutomationValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Long(_) => DataType::Long,
            Self::Bool(_) => DataType::Bool,
            Self::Vector2(_) => DataType::Vector2,
        }
    }

    /// Zero value of a kind.
    pub fn zero(ty: DataType) -> Self {
        match ty {
            DataType::Float => Self::Float(0.0),
            DataType::Double => Self::Double(0.0),
            DataType::Long => Self::Long(0),
            DataType::Bool => Self::Bool(false),
            DataType::Vector2 => Self::Vector2(Vec2::ZERO),
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match *self {
            Self::Vector2(v) => Some(v),
            _ => None,
        }
    }

    /// Blend from `self` towards `to` by `t` in `[0, 1]`.
    ///
    /// Booleans step at `t >= 0.5`; integers blend as `f64` and are rounded per `rounding`.
    /// Mismatched kinds keep `self`.
    pub fn interpolate(&self, to: &Self, t: f64, rounding: LongRounding) -> Self {
        match (*self, *to) {
            (Self::Float(a), Self::Float(b)) => Self::Float(lerp_f32(a, b, t)),
            (Self::Double(a), Self::Double(b)) => Self::Double(lerp_f64(a, b, t)),
            (Self::Long(a), Self::Long(b)) => {
                let v = rounding.apply(lerp_f64(a as f64, b as f64, t));
                Self::Long(v as i64)
            }
            (Self::Bool(a), Self::Bool(b)) => {
                if a == b || t < 0.5 {
                    Self::Bool(a)
                } else {
                    Self::Bool(b)
                }
            }
            (Self::Vector2(a), Self::Vector2(b)) => {
                Self::Vector2(Vec2::new(lerp_f64(a.x, b.x, t), lerp_f64(a.y, b.y, t)))
            }
            _ => *self,
        }
    }

    pub(crate) fn write_into(&self, d: &mut DataDict, key: &str) {
        match *self {
            Self::Float(v) => d.set(key, v),
            Self::Double(v) => d.set(key, v),
            Self::Long(v) => d.set(key, v),
            Self::Bool(v) => d.set(key, v),
            Self::Vector2(v) => d.set_vec2(key, v),
        }
    }

    pub(crate) fn read_from(d: &DataDict, key: &str, ty: DataType) -> ReelResult<Self> {
        Ok(match ty {
            DataType::Float => Self::Float(d.get_f32(key)?),
            DataType::Double => Self::Double(d.get_f64(key)?),
            DataType::Long => Self::Long(d.get_i64(key)?),
            DataType::Bool => Self::Bool(d.get_bool(key)?),
            DataType::Vector2 => Self::Vector2(d.get_vec2(key)?),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/automation/value.rs"]
mod tests;
