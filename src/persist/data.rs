use std::collections::BTreeMap;

use kurbo::Vec2;

use crate::foundation::error::{ReelError, ReelResult};

/// One typed value in a persisted data tree.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum DataValue {
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(String),
    ByteArray(Vec<u8>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    List(Vec<DataValue>),
    Dict(DataDict),
}

impl DataValue {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::ByteArray(_) => "byte array",
            Self::IntArray(_) => "int array",
            Self::LongArray(_) => "long array",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
        }
    }

    pub fn as_dict(&self) -> ReelResult<&DataDict> {
        match self {
            Self::Dict(d) => Ok(d),
            other => Err(mismatch("dict", other)),
        }
    }
}

fn mismatch(expected: &str, got: &DataValue) -> ReelError {
    ReelError::serde(format!("expected {expected}, found {}", got.type_name()))
}

macro_rules! impl_from {
    ($($t:ty => $v:ident),* $(,)?) => {
        $(impl From<$t> for DataValue {
            fn from(v: $t) -> Self {
                Self::$v(v)
            }
        })*
    };
}

impl_from! {
    u8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    bool => Bool,
    String => String,
    Vec<u8> => ByteArray,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
    Vec<DataValue> => List,
    DataDict => Dict,
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

/// String-keyed dictionary of typed values; the unit every entity persists itself into.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct DataDict {
    entries: BTreeMap<String, DataValue>,
}

impl DataDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn set_vec2(&mut self, key: impl Into<String>, v: Vec2) {
        let mut d = DataDict::new();
        d.set("X", v.x);
        d.set("Y", v.y);
        self.set(key, d);
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.entries.get(key)
    }

    fn require(&self, key: &str) -> ReelResult<&DataValue> {
        self.entries
            .get(key)
            .ok_or_else(|| ReelError::serde(format!("missing key '{key}'")))
    }

    pub fn get_u8(&self, key: &str) -> ReelResult<u8> {
        match self.require(key)? {
            DataValue::Byte(v) => Ok(*v),
            other => Err(keyed(key, mismatch("byte", other))),
        }
    }

    pub fn get_i32(&self, key: &str) -> ReelResult<i32> {
        match self.require(key)? {
            DataValue::Byte(v) => Ok(i32::from(*v)),
            DataValue::Short(v) => Ok(i32::from(*v)),
            DataValue::Int(v) => Ok(*v),
            other => Err(keyed(key, mismatch("int", other))),
        }
    }

    /// Integer of any width, widened to `i64`.
    pub fn get_i64(&self, key: &str) -> ReelResult<i64> {
        match self.require(key)? {
            DataValue::Byte(v) => Ok(i64::from(*v)),
            DataValue::Short(v) => Ok(i64::from(*v)),
            DataValue::Int(v) => Ok(i64::from(*v)),
            DataValue::Long(v) => Ok(*v),
            other => Err(keyed(key, mismatch("long", other))),
        }
    }

    pub fn get_f32(&self, key: &str) -> ReelResult<f32> {
        match self.require(key)? {
            DataValue::Float(v) => Ok(*v),
            other => Err(keyed(key, mismatch("float", other))),
        }
    }

    /// Float or double, widened to `f64`.
    pub fn get_f64(&self, key: &str) -> ReelResult<f64> {
        match self.require(key)? {
            DataValue::Float(v) => Ok(f64::from(*v)),
            DataValue::Double(v) => Ok(*v),
            other => Err(keyed(key, mismatch("double", other))),
        }
    }

    pub fn get_bool(&self, key: &str) -> ReelResult<bool> {
        match self.require(key)? {
            DataValue::Bool(v) => Ok(*v),
            DataValue::Byte(v) => Ok(*v != 0),
            other => Err(keyed(key, mismatch("bool", other))),
        }
    }

    pub fn get_str(&self, key: &str) -> ReelResult<&str> {
        match self.require(key)? {
            DataValue::String(v) => Ok(v),
            other => Err(keyed(key, mismatch("string", other))),
        }
    }

    pub fn get_dict(&self, key: &str) -> ReelResult<&DataDict> {
        self.require(key)?.as_dict().map_err(|e| keyed(key, e))
    }

    pub fn get_list(&self, key: &str) -> ReelResult<&[DataValue]> {
        match self.require(key)? {
            DataValue::List(v) => Ok(v),
            other => Err(keyed(key, mismatch("list", other))),
        }
    }

    pub fn get_vec2(&self, key: &str) -> ReelResult<Vec2> {
        let d = self.get_dict(key)?;
        Ok(Vec2::new(d.get_f64("X")?, d.get_f64("Y")?))
    }

    /// Pretty JSON rendering for debugging and diffing saved projects.
    pub fn to_json_pretty(&self) -> ReelResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ReelError::serde(e.to_string()))
    }
}

fn keyed(key: &str, e: ReelError) -> ReelError {
    match e {
        ReelError::Serde(msg) => ReelError::serde(format!("key '{key}': {msg}")),
        other => other,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/persist/data.rs"]
mod tests;
