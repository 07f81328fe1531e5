use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::automation::parameter::{
    OwnerKind, Parameter, ParameterFlags, ParameterId, ParameterKey, ParameterTable,
};
use crate::automation::sequence::AutomationSequence;
use crate::foundation::error::{ReelError, ReelResult};
use crate::persist::data::{DataDict, DataValue};
use crate::timeline::props::VideoProps;

/// Parameters whose effective value changed during one update pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changed: SmallVec<[ParameterId; 4]>,
    pub flags: ParameterFlags,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    fn record(&mut self, p: &Parameter) {
        self.changed.push(p.id());
        self.flags |= p.flags();
    }

    pub fn merge(&mut self, other: ChangeSet) {
        self.changed.extend(other.changed);
        self.flags |= other.flags;
    }
}

/// All automation sequences of one track or clip, created lazily per parameter.
#[derive(Clone, Debug)]
pub struct AutomationData {
    owner: OwnerKind,
    sequences: BTreeMap<ParameterId, AutomationSequence>,
    active: Option<ParameterKey>,
}

impl AutomationData {
    pub fn new(owner: OwnerKind) -> Self {
        Self {
            owner,
            sequences: BTreeMap::new(),
            active: None,
        }
    }

    pub fn owner(&self) -> OwnerKind {
        self.owner
    }

    pub fn sequence(&self, parameter: &Parameter) -> Option<&AutomationSequence> {
        self.sequences.get(&parameter.id())
    }

    pub fn sequences(&self) -> impl Iterator<Item = &AutomationSequence> {
        self.sequences.values()
    }

    /// The sequence for `parameter`, created on first use.
    pub fn sequence_mut(&mut self, parameter: &Arc<Parameter>) -> ReelResult<&mut AutomationSequence> {
        if parameter.owner() != self.owner {
            return Err(ReelError::automation(format!(
                "parameter '{}' belongs to {:?}, not {:?}",
                parameter.key(),
                parameter.owner(),
                self.owner
            )));
        }
        Ok(self
            .sequences
            .entry(parameter.id())
            .or_insert_with(|| AutomationSequence::new(Arc::clone(parameter))))
    }

    /// `true` if the parameter has at least one key frame.
    pub fn is_automated(&self, parameter: &Parameter) -> bool {
        self.sequence(parameter).is_some_and(|s| !s.is_empty())
    }

    /// Parameter selected for key frame editing.
    pub fn active_parameter(&self) -> Option<&ParameterKey> {
        self.active.as_ref()
    }

    pub fn set_active_parameter(&mut self, key: Option<ParameterKey>) {
        self.active = key;
    }

    /// Re-evaluate every sequence that can automate at `frame`.
    pub fn update(&mut self, frame: i64, props: &mut VideoProps) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for seq in self.sequences.values_mut() {
            if seq.can_automate() && seq.update_value(frame, props) {
                changes.record(seq.parameter());
            }
        }
        finish(changes, props)
    }

    /// Re-evaluate one parameter at `frame`, automated or not.
    pub fn update_one(&mut self, parameter: &Parameter, frame: i64, props: &mut VideoProps) -> ChangeSet {
        let mut changes = ChangeSet::default();
        if let Some(seq) = self.sequences.get_mut(&parameter.id())
            && seq.update_value(frame, props)
        {
            changes.record(seq.parameter());
        }
        finish(changes, props)
    }

    /// Write every sequence's override/default value; used when the owner leaves the playhead.
    pub fn update_backing_storage(&mut self, props: &mut VideoProps) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for seq in self.sequences.values_mut() {
            if seq.update_value(-1, props) {
                changes.record(seq.parameter());
            }
        }
        finish(changes, props)
    }

    pub fn write(&self, d: &mut DataDict) {
        let list: Vec<DataValue> = self
            .sequences
            .values()
            .map(|seq| {
                let mut sd = DataDict::new();
                sd.set("KeyId", seq.parameter().key().full_id());
                let mut body = DataDict::new();
                seq.write(&mut body);
                sd.set("Sequence", body);
                DataValue::Dict(sd)
            })
            .collect();
        d.set("Sequences", list);
        if let Some(key) = &self.active {
            d.set("ActiveKeyId", key.full_id());
        }
    }

    pub fn read(d: &DataDict, owner: OwnerKind, table: &ParameterTable) -> ReelResult<Self> {
        let mut data = Self::new(owner);
        for item in d.get_list("Sequences")? {
            let sd = item.as_dict()?;
            let parameter = table.require(sd.get_str("KeyId")?)?;
            if parameter.owner() != owner {
                return Err(ReelError::serde(format!(
                    "parameter '{}' cannot be automated on a {owner:?}",
                    parameter.key()
                )));
            }
            let seq = AutomationSequence::read(sd.get_dict("Sequence")?, Arc::clone(parameter))?;
            data.sequences.insert(parameter.id(), seq);
        }
        if d.contains("ActiveKeyId") {
            data.active = Some(ParameterKey::parse(d.get_str("ActiveKeyId")?)?);
        }
        Ok(data)
    }
}

fn finish(changes: ChangeSet, props: &mut VideoProps) -> ChangeSet {
    if changes.flags.contains(ParameterFlags::INVALIDATES_TRANSFORM) {
        props.invalidate_transform();
    }
    changes
}

#[cfg(test)]
#[path = "../../tests/unit/automation/data.rs"]
mod tests;
