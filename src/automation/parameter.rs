//! Animatable parameter definitions.
//!
//! Parameters are registered once through a [`ParameterRegistry`] and frozen into an immutable
//! [`ParameterTable`]; lookups never take a lock. Identity is the process-wide [`ParameterId`]
//! handed out at registration, persistence uses the [`ParameterKey`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use bitflags::bitflags;
use kurbo::Vec2;

use crate::automation::value::{AutomationValue, DataType, LongRounding};
use crate::foundation::error::{ReelError, ReelResult};
use crate::timeline::props::VideoProps;

bitflags! {
    /// Side effects of a parameter's value changing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParameterFlags: u8 {
        /// The owner must be re-rendered.
        const AFFECTS_RENDER = 0b0001;
        /// Changing the parameter's key frames marks the project as modified.
        const MODIFIES_PROJECT = 0b0010;
        /// The owner's cached transform matrices are stale.
        const INVALIDATES_TRANSFORM = 0b0100;
        const STANDARD_PROJECT_VISUAL = Self::AFFECTS_RENDER.bits() | Self::MODIFIES_PROJECT.bits();
    }
}

/// Kind of object a parameter belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OwnerKind {
    Track,
    Clip,
}

/// Stable, serializable parameter identity: `domain::name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterKey {
    pub domain: String,
    pub name: String,
}

impl ParameterKey {
    pub fn new(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
        }
    }

    pub fn full_id(&self) -> String {
        format!("{}::{}", self.domain, self.name)
    }

    pub fn parse(full_id: &str) -> ReelResult<Self> {
        match full_id.split_once("::") {
            Some((domain, name)) if !domain.is_empty() && !name.is_empty() => {
                Ok(Self::new(domain, name))
            }
            _ => Err(ReelError::serde(format!(
                "malformed parameter key '{full_id}'"
            ))),
        }
    }
}

impl std::fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.domain, self.name)
    }
}

/// Process-wide parameter index. Not stable across versions; never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterId(pub u32);

static NEXT_PARAMETER_ID: AtomicU32 = AtomicU32::new(1);

/// Default value and legal range of a parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Descriptor {
    Float { default: f32, min: f32, max: f32 },
    Double { default: f64, min: f64, max: f64 },
    Long { default: i64, min: i64, max: i64, rounding: LongRounding },
    Bool { default: bool },
    Vector2 { default: Vec2, min: Vec2, max: Vec2 },
}

impl Descriptor {
    pub fn float(default: f32) -> Self {
        Self::Float {
            default,
            min: f32::NEG_INFINITY,
            max: f32::INFINITY,
        }
    }

    pub fn double(default: f64) -> Self {
        Self::Double {
            default,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn double_range(default: f64, min: f64, max: f64) -> Self {
        Self::Double { default, min, max }
    }

    pub fn long(default: i64) -> Self {
        Self::Long {
            default,
            min: i64::MIN,
            max: i64::MAX,
            rounding: LongRounding::Round,
        }
    }

    pub fn bool(default: bool) -> Self {
        Self::Bool { default }
    }

    pub fn vector2(default: Vec2) -> Self {
        Self::Vector2 {
            default,
            min: Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            max: Vec2::new(f64::INFINITY, f64::INFINITY),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float { .. } => DataType::Float,
            Self::Double { .. } => DataType::Double,
            Self::Long { .. } => DataType::Long,
            Self::Bool { .. } => DataType::Bool,
            Self::Vector2 { .. } => DataType::Vector2,
        }
    }

    pub fn default_value(&self) -> AutomationValue {
        match *self {
            Self::Float { default, .. } => AutomationValue::Float(default),
            Self::Double { default, .. } => AutomationValue::Double(default),
            Self::Long { default, .. } => AutomationValue::Long(default),
            Self::Bool { default } => AutomationValue::Bool(default),
            Self::Vector2 { default, .. } => AutomationValue::Vector2(default),
        }
    }

    pub fn rounding(&self) -> LongRounding {
        match *self {
            Self::Long { rounding, .. } => rounding,
            _ => LongRounding::default(),
        }
    }

    /// Clamp `value` into the legal range. Values of another kind are returned unchanged.
    pub fn clamp(&self, value: AutomationValue) -> AutomationValue {
        match (*self, value) {
            (Self::Float { min, max, .. }, AutomationValue::Float(v)) => {
                AutomationValue::Float(v.clamp(min, max))
            }
            (Self::Double { min, max, .. }, AutomationValue::Double(v)) => {
                AutomationValue::Double(v.clamp(min, max))
            }
            (Self::Long { min, max, .. }, AutomationValue::Long(v)) => {
                AutomationValue::Long(v.clamp(min, max))
            }
            (Self::Vector2 { min, max, .. }, AutomationValue::Vector2(v)) => {
                AutomationValue::Vector2(Vec2::new(v.x.clamp(min.x, max.x), v.y.clamp(min.y, max.y)))
            }
            (_, other) => other,
        }
    }
}

/// Where an evaluated value is written.
#[derive(Clone, Copy)]
pub enum ValueAccessor {
    /// A field of the owner's [`VideoProps`].
    Props {
        get: fn(&VideoProps) -> AutomationValue,
        set: fn(&mut VideoProps, AutomationValue),
    },
    /// The sequence keeps the effective value itself ([`crate::AutomationSequence::current_value`]).
    Stored,
}

impl std::fmt::Debug for ValueAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Props { .. } => f.write_str("Props"),
            Self::Stored => f.write_str("Stored"),
        }
    }
}

/// One animatable property of an owner kind.
#[derive(Debug)]
pub struct Parameter {
    id: ParameterId,
    key: ParameterKey,
    owner: OwnerKind,
    descriptor: Descriptor,
    accessor: ValueAccessor,
    flags: ParameterFlags,
}

impl Parameter {
    pub fn id(&self) -> ParameterId {
        self.id
    }

    pub fn key(&self) -> &ParameterKey {
        &self.key
    }

    pub fn owner(&self) -> OwnerKind {
        self.owner
    }

    pub fn data_type(&self) -> DataType {
        self.descriptor.data_type()
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn accessor(&self) -> ValueAccessor {
        self.accessor
    }

    pub fn flags(&self) -> ParameterFlags {
        self.flags
    }

    /// Write `value` into `props`; `true` if the stored field changed.
    ///
    /// [`ValueAccessor::Stored`] parameters never touch `props` and report `false`.
    pub(crate) fn write_props(&self, props: &mut VideoProps, value: AutomationValue) -> bool {
        match self.accessor {
            ValueAccessor::Props { get, set } => {
                if get(props) == value {
                    return false;
                }
                set(props, value);
                true
            }
            ValueAccessor::Stored => false,
        }
    }

    pub(crate) fn read_props(&self, props: &VideoProps) -> Option<AutomationValue> {
        match self.accessor {
            ValueAccessor::Props { get, .. } => Some(get(props)),
            ValueAccessor::Stored => None,
        }
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Parameter {}

impl std::hash::Hash for Parameter {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Parameters shared by every visual object kind.
#[derive(Clone, Debug)]
pub struct VisualParameters {
    pub opacity: Arc<Parameter>,
    pub visible: Arc<Parameter>,
    pub position: Arc<Parameter>,
    pub scale: Arc<Parameter>,
    pub scale_origin: Arc<Parameter>,
    pub absolute_scale_origin: Arc<Parameter>,
    pub rotation: Arc<Parameter>,
    pub rotation_origin: Arc<Parameter>,
    pub absolute_rotation_origin: Arc<Parameter>,
}

/// The built-in track and clip parameters every table carries.
#[derive(Clone, Debug)]
pub struct BuiltinParameters {
    pub track: VisualParameters,
    pub clip: VisualParameters,
}

/// Startup registration phase. [`ParameterRegistry::build`] freezes it.
pub struct ParameterRegistry {
    params: Vec<Arc<Parameter>>,
    builtins: BuiltinParameters,
}

impl ParameterRegistry {
    /// A registry pre-populated with the built-in track and clip parameters.
    pub fn new() -> Self {
        let mut params = Vec::new();
        let track = register_visual(&mut params, "VideoTrack", OwnerKind::Track);
        let clip = register_visual(&mut params, "VideoClip", OwnerKind::Clip);
        Self {
            params,
            builtins: BuiltinParameters { track, clip },
        }
    }

    /// Register an extra parameter. Fails if the key is already taken.
    pub fn register(
        &mut self,
        key: ParameterKey,
        owner: OwnerKind,
        descriptor: Descriptor,
        accessor: ValueAccessor,
        flags: ParameterFlags,
    ) -> ReelResult<Arc<Parameter>> {
        if self.params.iter().any(|p| p.key == key) {
            return Err(ReelError::automation(format!(
                "parameter '{key}' is already registered"
            )));
        }
        if let ValueAccessor::Props { get, .. } = accessor {
            let probe = get(&VideoProps::default());
            if probe.data_type() != descriptor.data_type() {
                return Err(ReelError::automation(format!(
                    "accessor of '{key}' yields {:?} but descriptor is {:?}",
                    probe.data_type(),
                    descriptor.data_type()
                )));
            }
        }
        let p = new_parameter(key, owner, descriptor, accessor, flags);
        self.params.push(Arc::clone(&p));
        Ok(p)
    }

    pub fn build(self) -> ParameterTable {
        let mut by_id = HashMap::with_capacity(self.params.len());
        let mut by_full_id = HashMap::with_capacity(self.params.len());
        for p in &self.params {
            by_id.insert(p.id, Arc::clone(p));
            by_full_id.insert(p.key.full_id(), Arc::clone(p));
        }
        tracing::debug!(parameters = self.params.len(), "parameter table built");
        ParameterTable {
            ordered: self.params,
            by_id,
            by_full_id,
            builtins: self.builtins,
        }
    }
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable parameter lookup table.
#[derive(Debug)]
pub struct ParameterTable {
    ordered: Vec<Arc<Parameter>>,
    by_id: HashMap<ParameterId, Arc<Parameter>>,
    by_full_id: HashMap<String, Arc<Parameter>>,
    builtins: BuiltinParameters,
}

impl ParameterTable {
    /// Shared table holding only the built-in parameters, built on first use.
    pub fn global() -> &'static Arc<ParameterTable> {
        static GLOBAL: OnceLock<Arc<ParameterTable>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ParameterRegistry::new().build()))
    }

    pub fn builtins(&self) -> &BuiltinParameters {
        &self.builtins
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.ordered.iter()
    }

    pub fn get(&self, key: &ParameterKey) -> Option<&Arc<Parameter>> {
        self.by_full_id.get(&key.full_id())
    }

    pub fn get_by_full_id(&self, full_id: &str) -> Option<&Arc<Parameter>> {
        self.by_full_id.get(full_id)
    }

    pub fn get_by_id(&self, id: ParameterId) -> Option<&Arc<Parameter>> {
        self.by_id.get(&id)
    }

    /// Like [`ParameterTable::get_by_full_id`] but an unknown key is an error.
    pub fn require(&self, full_id: &str) -> ReelResult<&Arc<Parameter>> {
        self.get_by_full_id(full_id)
            .ok_or_else(|| ReelError::serde(format!("unknown parameter key '{full_id}'")))
    }

    /// Parameters applicable to an owner kind, in registration order.
    pub fn applicable(&self, owner: OwnerKind) -> impl Iterator<Item = &Arc<Parameter>> {
        self.ordered.iter().filter(move |p| p.owner == owner)
    }
}

fn new_parameter(
    key: ParameterKey,
    owner: OwnerKind,
    descriptor: Descriptor,
    accessor: ValueAccessor,
    flags: ParameterFlags,
) -> Arc<Parameter> {
    let id = ParameterId(NEXT_PARAMETER_ID.fetch_add(1, Ordering::Relaxed));
    Arc::new(Parameter {
        id,
        key,
        owner,
        descriptor,
        accessor,
        flags,
    })
}

fn register_visual(
    params: &mut Vec<Arc<Parameter>>,
    domain: &str,
    owner: OwnerKind,
) -> VisualParameters {
    let visual = ParameterFlags::STANDARD_PROJECT_VISUAL;
    let transform = visual | ParameterFlags::INVALIDATES_TRANSFORM;
    let mut add = |name: &str,
                   descriptor: Descriptor,
                   get: fn(&VideoProps) -> AutomationValue,
                   set: fn(&mut VideoProps, AutomationValue),
                   flags: ParameterFlags| {
        let p = new_parameter(
            ParameterKey::new(domain, name),
            owner,
            descriptor,
            ValueAccessor::Props { get, set },
            flags,
        );
        params.push(Arc::clone(&p));
        p
    };

    VisualParameters {
        opacity: add(
            "Opacity",
            Descriptor::double_range(1.0, 0.0, 1.0),
            |p| AutomationValue::Double(p.opacity),
            |p, v| p.opacity = v.as_f64().unwrap_or(p.opacity),
            visual,
        ),
        visible: add(
            "IsVisible",
            Descriptor::bool(true),
            |p| AutomationValue::Bool(p.visible),
            |p, v| p.visible = v.as_bool().unwrap_or(p.visible),
            visual,
        ),
        position: add(
            "MediaPosition",
            Descriptor::vector2(Vec2::ZERO),
            |p| AutomationValue::Vector2(p.position),
            |p, v| p.position = v.as_vec2().unwrap_or(p.position),
            transform,
        ),
        scale: add(
            "MediaScale",
            Descriptor::vector2(Vec2::new(1.0, 1.0)),
            |p| AutomationValue::Vector2(p.scale),
            |p, v| p.scale = v.as_vec2().unwrap_or(p.scale),
            transform,
        ),
        scale_origin: add(
            "MediaScaleOrigin",
            Descriptor::vector2(Vec2::new(0.5, 0.5)),
            |p| AutomationValue::Vector2(p.scale_origin),
            |p, v| p.scale_origin = v.as_vec2().unwrap_or(p.scale_origin),
            transform,
        ),
        absolute_scale_origin: add(
            "UseAbsoluteScaleOrigin",
            Descriptor::bool(false),
            |p| AutomationValue::Bool(p.absolute_scale_origin),
            |p, v| p.absolute_scale_origin = v.as_bool().unwrap_or(p.absolute_scale_origin),
            transform,
        ),
        rotation: add(
            "MediaRotation",
            Descriptor::double(0.0),
            |p| AutomationValue::Double(p.rotation),
            |p, v| p.rotation = v.as_f64().unwrap_or(p.rotation),
            transform,
        ),
        rotation_origin: add(
            "MediaRotationOrigin",
            Descriptor::vector2(Vec2::new(0.5, 0.5)),
            |p| AutomationValue::Vector2(p.rotation_origin),
            |p, v| p.rotation_origin = v.as_vec2().unwrap_or(p.rotation_origin),
            transform,
        ),
        absolute_rotation_origin: add(
            "UseAbsoluteRotationOrigin",
            Descriptor::bool(false),
            |p| AutomationValue::Bool(p.absolute_rotation_origin),
            |p, v| {
                p.absolute_rotation_origin = v.as_bool().unwrap_or(p.absolute_rotation_origin)
            },
            transform,
        ),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/automation/parameter.rs"]
mod tests;
