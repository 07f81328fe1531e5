use std::ops::Range;
use std::sync::Arc;

use kurbo::Affine;

use crate::automation::data::{AutomationData, ChangeSet};
use crate::automation::parameter::{Parameter, ParameterFlags, ParameterTable};
use crate::automation::sequence::AutomationSequence;
use crate::automation::value::AutomationValue;
use crate::foundation::core::{FrameSpan, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};
use crate::persist::data::{DataDict, DataValue};
use crate::render::content::{ClipContent, ContentRegistry};
use crate::timeline::clip::{Clip, ClipId};
use crate::timeline::events::{AutomationTarget, EventBus, SubscriptionId, TimelineEvent};
use crate::timeline::props::VideoProps;
use crate::timeline::track::{Track, TrackId, remove_selected};

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 200.0;
/// Growth applied by [`Timeline::try_expand_for_frame`].
pub const EXPAND_STEP: i64 = 1000;

/// Project-level timeline configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    /// Output frame size in pixels.
    pub resolution: (u32, u32),
    /// `max_duration` of an empty timeline.
    pub initial_max_duration: i64,
    /// Frames added past the largest used frame when `max_duration` grows.
    pub headroom: i64,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            resolution: (1920, 1080),
            initial_max_duration: 5000,
            headroom: 100,
        }
    }
}

/// How many items a selection currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionType {
    None,
    Single,
    Multi,
}

impl SelectionType {
    fn from_count(n: usize) -> Self {
        match n {
            0 => Self::None,
            1 => Self::Single,
            _ => Self::Multi,
        }
    }
}

/// Ordered tracks plus playhead, duration and selection bookkeeping.
///
/// All mutation goes through the timeline so the cached aggregates (selected tracks, selected
/// clip count, range anchor, max duration) stay consistent and change events fire.
pub struct Timeline {
    settings: TimelineSettings,
    table: Arc<ParameterTable>,
    tracks: Vec<Track>,
    playhead: i64,
    stophead: i64,
    max_duration: i64,
    zoom: f64,
    selected_tracks: Vec<TrackId>,
    selected_clip_count: usize,
    range_anchor: Option<usize>,
    modified: bool,
    events: EventBus<TimelineEvent>,
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("tracks", &self.tracks.len())
            .field("playhead", &self.playhead)
            .field("max_duration", &self.max_duration)
            .finish_non_exhaustive()
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(TimelineSettings::default())
    }
}

impl Timeline {
    /// Empty timeline using the process-wide built-in parameter table.
    pub fn new(settings: TimelineSettings) -> Self {
        Self::with_table(settings, Arc::clone(ParameterTable::global()))
    }

    pub fn with_table(settings: TimelineSettings, table: Arc<ParameterTable>) -> Self {
        Self {
            settings,
            table,
            tracks: Vec::new(),
            playhead: 0,
            stophead: 0,
            max_duration: settings.initial_max_duration.max(1),
            zoom: 1.0,
            selected_tracks: Vec::new(),
            selected_clip_count: 0,
            range_anchor: None,
            modified: false,
            events: EventBus::new(),
        }
    }

    pub fn settings(&self) -> &TimelineSettings {
        &self.settings
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.settings.resolution
    }

    pub fn table(&self) -> &Arc<ParameterTable> {
        &self.table
    }

    /// Register a synchronous change handler.
    pub fn subscribe(
        &mut self,
        handler: impl FnMut(&TimelineEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn emit(&mut self, event: TimelineEvent) {
        self.events.emit(&event);
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id() == id)
    }

    fn require_track_index(&self, id: TrackId) -> ReelResult<usize> {
        self.track_index_of(id)
            .ok_or_else(|| ReelError::validation(format!("{id} is not on this timeline")))
    }

    fn track_mut(&mut self, id: TrackId) -> ReelResult<&mut Track> {
        let index = self.require_track_index(id)?;
        Ok(&mut self.tracks[index])
    }

    pub fn add_track(&mut self, track: Track) -> ReelResult<usize> {
        let index = self.tracks.len();
        self.insert_track(index, track)?;
        Ok(index)
    }

    /// Insert a track. Its selection state and clips join the timeline's caches.
    pub fn insert_track(&mut self, index: usize, mut track: Track) -> ReelResult<()> {
        if self.track(track.id()).is_some() {
            return Err(ReelError::validation(format!(
                "{} is already on this timeline",
                track.id()
            )));
        }
        if index > self.tracks.len() {
            return Err(ReelError::validation(format!(
                "track index {index} out of range ({})",
                self.tracks.len()
            )));
        }

        let id = track.id();
        if track.is_selected() {
            self.selected_tracks.push(id);
        }
        self.selected_clip_count += track.selected_clip_count();
        if let Some(anchor) = self.range_anchor
            && index <= anchor
        {
            self.range_anchor = Some(anchor + 1);
        }

        let mut changes = Vec::new();
        evaluate_track(&mut track, self.playhead, None, &mut changes);
        self.tracks.insert(index, track);
        self.modified = true;
        self.emit(TimelineEvent::TrackAdded { track: id, index });
        self.dispatch_changes(changes);
        self.update_largest_frame();
        self.emit(TimelineEvent::RenderInvalidated);
        Ok(())
    }

    pub fn remove_track_at(&mut self, index: usize) -> ReelResult<Track> {
        if index >= self.tracks.len() {
            return Err(ReelError::validation(format!(
                "track index {index} out of range ({})",
                self.tracks.len()
            )));
        }
        let track = self.tracks.remove(index);
        if track.is_selected() {
            remove_selected(&mut self.selected_tracks, track.id());
        }
        self.selected_clip_count -= track.selected_clip_count();
        if let Some(anchor) = self.range_anchor {
            self.range_anchor = if self.tracks.is_empty() {
                None
            } else if index <= anchor {
                anchor.checked_sub(1)
            } else {
                Some(anchor)
            };
        }
        self.modified = true;
        self.emit(TimelineEvent::TrackRemoved {
            track: track.id(),
            index,
        });
        self.update_largest_frame();
        self.emit(TimelineEvent::RenderInvalidated);
        Ok(track)
    }

    pub fn remove_track(&mut self, id: TrackId) -> ReelResult<(usize, Track)> {
        let index = self.require_track_index(id)?;
        Ok((index, self.remove_track_at(index)?))
    }

    pub fn move_track(&mut self, from: usize, to: usize) -> ReelResult<()> {
        let len = self.tracks.len();
        if from >= len || to >= len {
            return Err(ReelError::validation(format!(
                "track move {from} -> {to} out of range ({len})"
            )));
        }
        if from == to {
            return Ok(());
        }
        let track = self.tracks.remove(from);
        let id = track.id();
        self.tracks.insert(to, track);
        if self.range_anchor == Some(from) {
            self.range_anchor = Some(to);
        }
        self.modified = true;
        self.emit(TimelineEvent::TrackMoved {
            track: id,
            from,
            to,
        });
        self.emit(TimelineEvent::RenderInvalidated);
        Ok(())
    }

    pub fn set_track_name(&mut self, id: TrackId, name: impl Into<String>) -> ReelResult<()> {
        self.track_mut(id)?.set_name(name);
        self.modified = true;
        Ok(())
    }

    pub fn set_track_colour(&mut self, id: TrackId, colour: Rgba8) -> ReelResult<()> {
        self.track_mut(id)?.set_colour(colour);
        self.modified = true;
        Ok(())
    }

    pub fn set_track_height(&mut self, id: TrackId, height: u32) -> ReelResult<()> {
        self.track_mut(id)?.set_height(height);
        Ok(())
    }

    pub fn clip(&self, track: TrackId, clip: ClipId) -> Option<&Clip> {
        self.track(track)?.clip(clip)
    }

    /// Track holding `clip`.
    pub fn find_clip(&self, clip: ClipId) -> Option<(TrackId, &Clip)> {
        self.tracks
            .iter()
            .find_map(|t| t.clip(clip).map(|c| (t.id(), c)))
    }

    fn clip_mut(&mut self, track: TrackId, clip: ClipId) -> ReelResult<&mut Clip> {
        self.track_mut(track)?
            .clip_mut(clip)
            .ok_or_else(|| ReelError::validation(format!("{clip} is not on {track}")))
    }

    pub fn add_clip(&mut self, track: TrackId, clip: Clip) -> ReelResult<usize> {
        let index = self.track_mut(track)?.clips().len();
        self.insert_clip(track, index, clip)?;
        Ok(index)
    }

    pub fn insert_clip(&mut self, track: TrackId, index: usize, mut clip: Clip) -> ReelResult<()> {
        let playhead = self.playhead;
        let mut changes = Vec::new();
        evaluate_clip(track, &mut clip, playhead, None, &mut changes);
        let id = clip.id();
        let selected = clip.is_selected();
        let visible_now = clip.intersects_frame(playhead);
        self.track_mut(track)?.insert_clip(index, clip)?;

        if selected {
            self.selected_clip_count += 1;
        }
        self.modified = true;
        self.emit(TimelineEvent::ClipAdded {
            track,
            clip: id,
            index,
        });
        self.dispatch_changes(changes);
        self.update_largest_frame();
        if visible_now {
            self.emit(TimelineEvent::RenderInvalidated);
        }
        Ok(())
    }

    pub fn remove_clip(&mut self, track: TrackId, clip: ClipId) -> ReelResult<Clip> {
        let (index, removed) = self.track_mut(track)?.remove_clip(clip)?;
        if removed.is_selected() {
            self.selected_clip_count -= 1;
        }
        self.modified = true;
        self.emit(TimelineEvent::ClipRemoved {
            track,
            clip,
            index,
        });
        self.update_largest_frame();
        if removed.intersects_frame(self.playhead) {
            self.emit(TimelineEvent::RenderInvalidated);
        }
        Ok(removed)
    }

    /// Move a clip to another track, appending unless `index` is given. Selection is kept.
    pub fn move_clip_to_track(
        &mut self,
        clip: ClipId,
        from: TrackId,
        to: TrackId,
        index: Option<usize>,
    ) -> ReelResult<()> {
        let src = self.require_track_index(from)?;
        let dest = self.require_track_index(to)?;
        let (old_index, mut moved) = self.tracks[src].remove_clip(clip)?;
        let dest_len = self.tracks[dest].clips().len();
        let index = index.unwrap_or(dest_len);
        if index > dest_len {
            self.tracks[src].insert_clip(old_index, moved)?;
            return Err(ReelError::validation(format!(
                "clip index {index} out of range ({dest_len})"
            )));
        }
        moved.invalidate_absolute_transform();
        self.tracks[dest].insert_clip(index, moved)?;
        self.modified = true;
        self.emit(TimelineEvent::ClipMoved {
            clip,
            from_track: from,
            to_track: to,
        });
        self.update_largest_frame();
        self.emit(TimelineEvent::RenderInvalidated);
        Ok(())
    }

    /// Move a placed clip in time; automation is re-evaluated at the new relative playhead.
    pub fn set_clip_span(&mut self, track: TrackId, clip: ClipId, span: FrameSpan) -> ReelResult<()> {
        let playhead = self.playhead;
        let ti = self.require_track_index(track)?;
        let old = self.tracks[ti].set_clip_span(clip, span)?;
        if old == span {
            return Ok(());
        }

        let mut changes = Vec::new();
        if let Some(c) = self.tracks[ti].clip_mut(clip) {
            evaluate_clip(track, c, playhead, None, &mut changes);
        }
        self.modified = true;
        self.emit(TimelineEvent::ClipSpanChanged {
            track,
            clip,
            old,
            new: span,
        });
        self.dispatch_changes(changes);
        self.update_largest_frame();
        if old.intersects_frame(playhead) || span.intersects_frame(playhead) {
            self.emit(TimelineEvent::RenderInvalidated);
        }
        Ok(())
    }

    pub fn set_clip_name(
        &mut self,
        track: TrackId,
        clip: ClipId,
        name: impl Into<String>,
    ) -> ReelResult<()> {
        self.clip_mut(track, clip)?.set_name(name);
        self.modified = true;
        Ok(())
    }

    pub fn set_clip_media_frame_offset(
        &mut self,
        track: TrackId,
        clip: ClipId,
        offset: i64,
    ) -> ReelResult<()> {
        let playhead = self.playhead;
        let c = self.clip_mut(track, clip)?;
        c.set_media_frame_offset(offset);
        let visible_now = c.intersects_frame(playhead);
        self.modified = true;
        if visible_now {
            self.emit(TimelineEvent::RenderInvalidated);
        }
        Ok(())
    }

    /// Edit a clip's content in place. Counts as a visible project change.
    pub fn with_clip_content<R>(
        &mut self,
        track: TrackId,
        clip: ClipId,
        f: impl FnOnce(&mut dyn ClipContent) -> R,
    ) -> ReelResult<R> {
        let c = self.clip_mut(track, clip)?;
        let out = f(c.content_mut());
        c.invalidate_absolute_transform();
        self.modified = true;
        self.emit(TimelineEvent::RenderInvalidated);
        Ok(out)
    }

    /// Remove every clip from a track.
    pub fn clear_track(&mut self, track: TrackId) -> ReelResult<Vec<Clip>> {
        let t = self.track_mut(track)?;
        let deselected = t.selected_clip_count();
        let clips = t.clear();
        self.selected_clip_count -= deselected;
        self.modified = true;
        for (index, clip) in clips.iter().enumerate().rev() {
            self.emit(TimelineEvent::ClipRemoved {
                track,
                clip: clip.id(),
                index,
            });
        }
        if deselected > 0 {
            self.emit(TimelineEvent::SelectionChanged);
        }
        self.update_largest_frame();
        self.emit(TimelineEvent::RenderInvalidated);
        Ok(clips)
    }

    /// Absolute (track composed with clip) matrices for the configured resolution.
    pub fn clip_transform(&mut self, track: TrackId, clip: ClipId) -> ReelResult<(Affine, Affine)> {
        let (w, h) = self.settings.resolution;
        self.track_mut(track)?.clip_transform(clip, w, h)
    }

    pub fn playhead(&self) -> i64 {
        self.playhead
    }

    pub fn stophead(&self) -> i64 {
        self.stophead
    }

    pub fn max_duration(&self) -> i64 {
        self.max_duration
    }

    fn check_head(&self, what: &str, frame: i64) -> ReelResult<()> {
        if frame < 0 {
            return Err(ReelError::validation(format!(
                "{what} cannot be negative, got {frame}"
            )));
        }
        if frame >= self.max_duration {
            return Err(ReelError::validation(format!(
                "{what} {frame} exceeds the timeline range 0..{}",
                self.max_duration
            )));
        }
        Ok(())
    }

    /// Move the playhead and re-evaluate automation for the new frame.
    pub fn set_playhead(&mut self, frame: i64) -> ReelResult<()> {
        if frame == self.playhead {
            return Ok(());
        }
        self.check_head("playhead", frame)?;
        let old = std::mem::replace(&mut self.playhead, frame);
        self.emit(TimelineEvent::PlayheadChanged { old, new: frame });
        // Parameter values must reflect the new frame before anyone re-renders.
        self.evaluate_automation(Some(old));
        self.emit(TimelineEvent::RenderInvalidated);
        Ok(())
    }

    pub fn set_stophead(&mut self, frame: i64) -> ReelResult<()> {
        if frame == self.stophead {
            return Ok(());
        }
        self.check_head("stophead", frame)?;
        let old = std::mem::replace(&mut self.stophead, frame);
        self.emit(TimelineEvent::StopheadChanged { old, new: frame });
        Ok(())
    }

    /// Set the timeline length. Heads beyond the new end are pulled back onto its last frame.
    pub fn set_max_duration(&mut self, frames: i64) -> ReelResult<()> {
        if frames < 1 {
            return Err(ReelError::validation(format!(
                "max duration must be at least 1, got {frames}"
            )));
        }
        if frames == self.max_duration {
            return Ok(());
        }
        let old = std::mem::replace(&mut self.max_duration, frames);
        self.emit(TimelineEvent::MaxDurationChanged { old, new: frames });
        if self.stophead >= frames {
            self.set_stophead(frames - 1)?;
        }
        if self.playhead >= frames {
            self.set_playhead(frames - 1)?;
        }
        Ok(())
    }

    /// Grow `max_duration` so `frame` fits, with a generous margin.
    pub fn try_expand_for_frame(&mut self, frame: i64) {
        if frame > self.max_duration {
            let old = std::mem::replace(&mut self.max_duration, frame + EXPAND_STEP);
            self.emit(TimelineEvent::MaxDurationChanged {
                old,
                new: self.max_duration,
            });
        }
    }

    /// End frame of the furthest clip on any track.
    pub fn largest_frame_in_use(&self) -> i64 {
        self.tracks
            .iter()
            .map(Track::largest_frame_in_use)
            .max()
            .unwrap_or(0)
    }

    fn update_largest_frame(&mut self) {
        let largest = self.largest_frame_in_use();
        if largest > self.max_duration {
            let old = std::mem::replace(&mut self.max_duration, largest + self.settings.headroom);
            tracing::debug!(old, new = self.max_duration, "max duration grown");
            self.emit(TimelineEvent::MaxDurationChanged {
                old,
                new: self.max_duration,
            });
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Returns the applied (clamped) zoom.
    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
        self.zoom
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Re-evaluate every sequence for the current playhead: track sequences at the playhead,
    /// clip sequences at the clip-relative frame, and clips not under the playhead at their
    /// default/override value.
    pub fn update_automation(&mut self) {
        if self.evaluate_automation(None) {
            self.emit(TimelineEvent::RenderInvalidated);
        }
    }

    /// Evaluate every sequence at the playhead and report parameter changes. Returns whether a
    /// render-affecting value changed; invalidation is left to the caller.
    fn evaluate_automation(&mut self, previous: Option<i64>) -> bool {
        let frame = self.playhead;
        let mut changes = Vec::new();
        for track in &mut self.tracks {
            evaluate_track(track, frame, previous, &mut changes);
        }
        self.emit_parameter_changes(changes)
            .contains(ParameterFlags::AFFECTS_RENDER)
    }

    fn dispatch_changes(&mut self, changes: Vec<(AutomationTarget, ChangeSet)>) {
        let flags = self.emit_parameter_changes(changes);
        if flags.contains(ParameterFlags::AFFECTS_RENDER) {
            self.emit(TimelineEvent::RenderInvalidated);
        }
    }

    fn emit_parameter_changes(
        &mut self,
        changes: Vec<(AutomationTarget, ChangeSet)>,
    ) -> ParameterFlags {
        let mut flags = ParameterFlags::empty();
        for (target, set) in changes {
            flags |= set.flags;
            for parameter in set.changed {
                self.emit(TimelineEvent::ParameterChanged { target, parameter });
            }
        }
        flags
    }

    /// Run `f` against a target's automation data and properties, with the frame it is
    /// evaluated at (`None` when a clip is not under the playhead). Changes are dispatched
    /// and transform invalidation cascades from tracks to their clips.
    fn with_target<R>(
        &mut self,
        target: AutomationTarget,
        f: impl FnOnce(&mut AutomationData, &mut VideoProps, Option<i64>) -> ReelResult<(R, ChangeSet)>,
    ) -> ReelResult<R> {
        let playhead = self.playhead;
        let ti = self.require_track_index(target.track())?;
        let track = &mut self.tracks[ti];
        let (out, changes) = match target {
            AutomationTarget::Track(_) => {
                let (out, changes) = f(&mut track.automation, &mut track.props, Some(playhead))?;
                if changes.flags.contains(ParameterFlags::INVALIDATES_TRANSFORM) {
                    track.invalidate_clip_transforms();
                }
                (out, changes)
            }
            AutomationTarget::Clip { track: tid, clip } => {
                let c = track
                    .clip_mut(clip)
                    .ok_or_else(|| ReelError::validation(format!("{clip} is not on {tid}")))?;
                let rel = c.relative_frame(playhead);
                f(&mut c.automation, &mut c.props, rel)?
            }
        };
        self.dispatch_changes(vec![(target, changes)]);
        Ok(out)
    }

    fn check_owner(target: AutomationTarget, parameter: &Parameter) -> ReelResult<()> {
        use crate::automation::parameter::OwnerKind;
        let owner = match target {
            AutomationTarget::Track(_) => OwnerKind::Track,
            AutomationTarget::Clip { .. } => OwnerKind::Clip,
        };
        if parameter.owner() != owner {
            return Err(ReelError::automation(format!(
                "parameter '{}' does not apply to a {owner:?}",
                parameter.key()
            )));
        }
        Ok(())
    }

    /// Edit one sequence, then re-evaluate it so the owner reflects the edit immediately.
    pub fn with_sequence<R>(
        &mut self,
        target: AutomationTarget,
        parameter: &Arc<Parameter>,
        f: impl FnOnce(&mut AutomationSequence) -> ReelResult<R>,
    ) -> ReelResult<R> {
        Self::check_owner(target, parameter)?;
        let out = self.with_target(target, |automation, props, frame| {
            let out = f(automation.sequence_mut(parameter)?)?;
            let changes = automation.update_one(parameter, frame.unwrap_or(-1), props);
            Ok((out, changes))
        })?;
        if parameter.flags().contains(ParameterFlags::MODIFIES_PROJECT) {
            self.modified = true;
        }
        Ok(out)
    }

    /// Set a parameter the way an inspector edit does: the static value when the sequence is
    /// not automated (empty or overridden), otherwise the key frame at the playhead, created on
    /// demand.
    pub fn set_parameter_value(
        &mut self,
        target: AutomationTarget,
        parameter: &Arc<Parameter>,
        value: AutomationValue,
    ) -> ReelResult<()> {
        Self::check_owner(target, parameter)?;
        if value.data_type() != parameter.data_type() {
            return Err(ReelError::automation(format!(
                "parameter '{}' holds {:?}, got {:?}",
                parameter.key(),
                parameter.data_type(),
                value.data_type()
            )));
        }
        self.with_target(target, |automation, props, frame| {
            let seq = automation.sequence_mut(parameter)?;
            if seq.is_empty() || seq.is_override_enabled() {
                seq.set_default_value(value)?;
            } else {
                let frame = frame.ok_or_else(|| {
                    ReelError::validation("cannot key an automated clip outside the playhead")
                })?;
                let index = seq.get_or_create_key_frame_at(frame, false)?;
                seq.set_key_frame_value(index, value)?;
            }
            let changes = automation.update_one(parameter, frame.unwrap_or(-1), props);
            Ok(((), changes))
        })?;
        if parameter.flags().contains(ParameterFlags::MODIFIES_PROJECT) {
            self.modified = true;
        }
        Ok(())
    }

    /// Toggle a sequence's override, capturing the value at the playhead when enabling.
    pub fn set_override_enabled(
        &mut self,
        target: AutomationTarget,
        parameter: &Arc<Parameter>,
        enabled: bool,
    ) -> ReelResult<()> {
        Self::check_owner(target, parameter)?;
        self.with_target(target, |automation, props, frame| {
            automation
                .sequence_mut(parameter)?
                .set_override_enabled(enabled, frame);
            let changes = automation.update_one(parameter, frame.unwrap_or(-1), props);
            Ok(((), changes))
        })?;
        self.modified = true;
        Ok(())
    }

    /// Effective value of a parameter on a target, as last evaluated.
    pub fn parameter_value(
        &self,
        target: AutomationTarget,
        parameter: &Parameter,
    ) -> ReelResult<AutomationValue> {
        let track = self
            .track(target.track())
            .ok_or_else(|| ReelError::validation(format!("{} is not on this timeline", target.track())))?;
        let (automation, props) = match target {
            AutomationTarget::Track(_) => (track.automation(), track.props()),
            AutomationTarget::Clip { track: tid, clip } => {
                let c = track
                    .clip(clip)
                    .ok_or_else(|| ReelError::validation(format!("{clip} is not on {tid}")))?;
                (c.automation(), c.props())
            }
        };
        if let Some(v) = parameter.read_props(props) {
            return Ok(v);
        }
        Ok(automation
            .sequence(parameter)
            .map_or_else(|| parameter.descriptor().default_value(), AutomationSequence::current_value))
    }

    pub fn selected_tracks(&self) -> &[TrackId] {
        &self.selected_tracks
    }

    pub fn track_selection_type(&self) -> SelectionType {
        SelectionType::from_count(self.selected_tracks.len())
    }

    /// Returns `true` if the flag changed.
    pub fn set_track_selected(&mut self, id: TrackId, selected: bool) -> ReelResult<bool> {
        let track = self.track_mut(id)?;
        if track.selected == selected {
            return Ok(false);
        }
        track.selected = selected;
        if selected {
            self.selected_tracks.push(id);
        } else {
            remove_selected(&mut self.selected_tracks, id);
        }
        self.emit(TimelineEvent::SelectionChanged);
        Ok(true)
    }

    pub fn clear_track_selection(&mut self) -> usize {
        let ids = std::mem::take(&mut self.selected_tracks);
        for id in &ids {
            if let Some(i) = self.track_index_of(*id) {
                self.tracks[i].selected = false;
            }
        }
        if !ids.is_empty() {
            self.emit(TimelineEvent::SelectionChanged);
        }
        ids.len()
    }

    pub fn range_anchor(&self) -> Option<usize> {
        self.range_anchor
    }

    pub fn set_range_anchor(&mut self, anchor: Option<usize>) -> ReelResult<()> {
        if let Some(i) = anchor
            && i >= self.tracks.len()
        {
            return Err(ReelError::validation(format!(
                "range anchor {i} out of range ({})",
                self.tracks.len()
            )));
        }
        self.range_anchor = anchor;
        Ok(())
    }

    pub fn selected_clip_count(&self) -> usize {
        self.selected_clip_count
    }

    pub fn clip_selection_type(&self) -> SelectionType {
        SelectionType::from_count(self.selected_clip_count)
    }

    /// Selected clips across all tracks, track order first.
    pub fn selected_clips(&self) -> impl Iterator<Item = (TrackId, ClipId)> + '_ {
        self.tracks
            .iter()
            .flat_map(|t| t.selected_clips().iter().map(move |c| (t.id(), *c)))
    }

    pub fn set_clip_selected(
        &mut self,
        track: TrackId,
        clip: ClipId,
        selected: bool,
    ) -> ReelResult<bool> {
        let changed = self.track_mut(track)?.set_clip_selected(clip, selected)?;
        if changed {
            if selected {
                self.selected_clip_count += 1;
            } else {
                self.selected_clip_count -= 1;
            }
            self.emit(TimelineEvent::SelectionChanged);
        }
        Ok(changed)
    }

    pub fn select_all_clips(&mut self, track: TrackId) -> ReelResult<usize> {
        let n = self.track_mut(track)?.select_all_clips();
        self.selected_clip_count += n;
        if n > 0 {
            self.emit(TimelineEvent::SelectionChanged);
        }
        Ok(n)
    }

    /// Deselect every clip except `keep`. Returns how many were deselected.
    pub fn clear_clip_selection(&mut self, keep: Option<(TrackId, ClipId)>) -> usize {
        let mut n = 0;
        for track in &mut self.tracks {
            if track.selected_clip_count() == 0 {
                continue;
            }
            let keep_here = keep.and_then(|(t, c)| (t == track.id()).then_some(c));
            n += track.clear_clip_selection(keep_here);
        }
        self.selected_clip_count -= n;
        if n > 0 {
            self.emit(TimelineEvent::SelectionChanged);
        }
        n
    }

    /// Make `clip` the only selected clip.
    pub fn make_single_selection(&mut self, track: TrackId, clip: ClipId) -> ReelResult<()> {
        if self.clip(track, clip).is_none() {
            return Err(ReelError::validation(format!("{clip} is not on {track}")));
        }
        self.clear_clip_selection(Some((track, clip)));
        self.set_clip_selected(track, clip, true)?;
        Ok(())
    }

    /// Replace the clip selection with every clip intersecting `span` on the given track
    /// indices. Returns the number of selected clips.
    pub fn make_frame_range_selection(
        &mut self,
        span: FrameSpan,
        tracks: Range<usize>,
    ) -> ReelResult<usize> {
        if tracks.end > self.tracks.len() || tracks.start > tracks.end {
            return Err(ReelError::validation(format!(
                "track range {tracks:?} out of range ({})",
                self.tracks.len()
            )));
        }
        let before = self.selected_clip_count;
        let mut cleared = 0;
        for track in &mut self.tracks {
            cleared += track.clear_clip_selection(None);
        }
        self.selected_clip_count -= cleared;

        let mut n = 0;
        for track in &mut self.tracks[tracks] {
            let hits: Vec<ClipId> = track.clips_in_span(span).map(Clip::id).collect();
            for id in hits {
                if track.set_clip_selected(id, true)? {
                    n += 1;
                }
            }
        }
        self.selected_clip_count += n;
        if cleared > 0 || n > 0 || before != self.selected_clip_count {
            self.emit(TimelineEvent::SelectionChanged);
        }
        Ok(n)
    }

    /// Recount selection from scratch and compare with the incremental caches.
    pub fn validate_selection_caches(&self) -> ReelResult<()> {
        let mut tracks: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|t| t.is_selected())
            .map(Track::id)
            .collect();
        let mut cached = self.selected_tracks.clone();
        tracks.sort();
        cached.sort();
        if tracks != cached {
            return Err(ReelError::validation(format!(
                "selected track cache {cached:?} disagrees with flags {tracks:?}"
            )));
        }

        let mut total = 0;
        for track in &self.tracks {
            let flagged = track.clips().iter().filter(|c| c.is_selected()).count();
            if flagged != track.selected_clip_count() {
                return Err(ReelError::validation(format!(
                    "{}: {} clips flagged selected, cache holds {}",
                    track.id(),
                    flagged,
                    track.selected_clip_count()
                )));
            }
            total += flagged;
        }
        if total != self.selected_clip_count {
            return Err(ReelError::validation(format!(
                "selected clip count cache {} disagrees with {total} flagged clips",
                self.selected_clip_count
            )));
        }
        Ok(())
    }

    pub fn write(&self, d: &mut DataDict) {
        d.set("MaxDuration", self.max_duration);
        d.set("Playhead", self.playhead);
        d.set("Stophead", self.stophead);
        let tracks: Vec<DataValue> = self
            .tracks
            .iter()
            .map(|t| {
                let mut td = DataDict::new();
                t.write(&mut td);
                DataValue::Dict(td)
            })
            .collect();
        d.set("Tracks", tracks);
    }

    /// Rebuild a timeline. Parameters resolve through `table`, clip content through `registry`.
    pub fn read(
        d: &DataDict,
        settings: TimelineSettings,
        table: Arc<ParameterTable>,
        registry: &ContentRegistry,
    ) -> ReelResult<Self> {
        let mut timeline = Self::with_table(settings, table);
        let max = d.get_i64("MaxDuration")?;
        if max < 1 {
            return Err(ReelError::serde(format!("invalid max duration {max}")));
        }
        timeline.max_duration = max;
        for item in d.get_list("Tracks")? {
            let track = Track::read(item.as_dict()?, &timeline.table, registry)?;
            timeline.add_track(track)?;
        }
        let playhead = d.get_i64("Playhead")?;
        let stophead = d.get_i64("Stophead")?;
        for (what, v) in [("playhead", playhead), ("stophead", stophead)] {
            timeline
                .check_head(what, v)
                .map_err(|e| ReelError::serde(e.to_string()))?;
        }
        timeline.playhead = playhead;
        timeline.stophead = stophead;
        timeline.update_automation();
        timeline.modified = false;
        Ok(timeline)
    }
}

/// Evaluate a track and its clips at `frame`. Clips that covered `previous` but not `frame` fall
/// back to their static values; with no `previous`, every clip off the playhead does.
fn evaluate_track(
    track: &mut Track,
    frame: i64,
    previous: Option<i64>,
    out: &mut Vec<(AutomationTarget, ChangeSet)>,
) {
    let tid = track.id();
    let changes = track.automation.update(frame, &mut track.props);
    if changes.flags.contains(ParameterFlags::INVALIDATES_TRANSFORM) {
        track.invalidate_clip_transforms();
    }
    if !changes.is_empty() {
        out.push((AutomationTarget::Track(tid), changes));
    }
    for clip in track.clips_mut() {
        evaluate_clip(tid, clip, frame, previous, out);
    }
}

fn evaluate_clip(
    track: TrackId,
    clip: &mut Clip,
    playhead: i64,
    previous: Option<i64>,
    out: &mut Vec<(AutomationTarget, ChangeSet)>,
) {
    let changes = match clip.relative_frame(playhead) {
        Some(rel) => clip.automation.update(rel, &mut clip.props),
        None if previous.is_none_or(|p| clip.intersects_frame(p)) => {
            clip.automation.update_backing_storage(&mut clip.props)
        }
        None => return,
    };
    if !changes.is_empty() {
        out.push((
            AutomationTarget::Clip {
                track,
                clip: clip.id(),
            },
            changes,
        ));
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/timeline.rs"]
mod tests;
