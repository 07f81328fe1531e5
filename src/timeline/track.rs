use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kurbo::{Affine, Vec2};

use crate::automation::data::AutomationData;
use crate::automation::parameter::{OwnerKind, ParameterTable};
use crate::foundation::core::{FrameSpan, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};
use crate::persist::data::{DataDict, DataValue};
use crate::render::content::{ContentRegistry, PrepareContext, RenderQuality};
use crate::render::surface::TrackRenderData;
use crate::timeline::clip::{Clip, ClipId, check_placement};
use crate::timeline::props::VideoProps;

pub const DEFAULT_TRACK_HEIGHT: u32 = 56;
pub const MIN_TRACK_HEIGHT: u32 = 20;
pub const MAX_TRACK_HEIGHT: u32 = 250;

/// Default length of a span filling empty space on a track.
pub const DEFAULT_FILL_DURATION: i64 = 300;
/// Upper bound for a span filling the gap before the next clip.
pub const MAX_FILL_DURATION: i64 = 100_000_000;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Runtime identity of a track. Not persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// Snapshot taken by [`Track::prepare_render`] for the render worker.
///
/// Opacity is captured here so the worker never reads live automation state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PendingRender {
    pub(crate) frame: i64,
    pub(crate) clip_index: usize,
    pub(crate) clip_id: ClipId,
    pub(crate) track_matrix: Affine,
    pub(crate) clip_matrix: Affine,
    pub(crate) track_opacity: f64,
    pub(crate) clip_opacity: f64,
    pub(crate) custom_opacity: bool,
}

/// A video lane: an ordered clip list plus track-level transform and opacity.
///
/// Clips may overlap; at a given frame the clip with the highest index wins.
#[derive(Debug)]
pub struct Track {
    id: TrackId,
    name: String,
    colour: Rgba8,
    height: u32,
    pub(crate) props: VideoProps,
    pub(crate) automation: AutomationData,
    clips: Vec<Clip>,
    selected_clips: Vec<ClipId>,
    pub(crate) selected: bool,
    largest_frame: i64,
    render: Arc<TrackRenderData>,
    pending: Option<PendingRender>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TrackId::next(),
            name: name.into(),
            colour: Rgba8::opaque(0x3a, 0x6e, 0xa5),
            height: DEFAULT_TRACK_HEIGHT,
            props: VideoProps::default(),
            automation: AutomationData::new(OwnerKind::Track),
            clips: Vec::new(),
            selected_clips: Vec::new(),
            selected: false,
            largest_frame: 0,
            render: Arc::new(TrackRenderData::new()),
            pending: None,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn colour(&self) -> Rgba8 {
        self.colour
    }

    pub fn set_colour(&mut self, colour: Rgba8) {
        self.colour = colour;
    }

    /// Display height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_height(&mut self, height: u32) {
        self.height = height.clamp(MIN_TRACK_HEIGHT, MAX_TRACK_HEIGHT);
    }

    pub fn props(&self) -> &VideoProps {
        &self.props
    }

    pub fn automation(&self) -> &AutomationData {
        &self.automation
    }

    /// Direct automation access for tracks not yet on a timeline.
    pub fn automation_mut(&mut self) -> &mut AutomationData {
        &mut self.automation
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id() == id)
    }

    pub(crate) fn clips_mut(&mut self) -> &mut [Clip] {
        &mut self.clips
    }

    pub(crate) fn clip_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id() == id)
    }

    pub fn clip_index(&self, id: ClipId) -> Option<usize> {
        self.clips.iter().position(|c| c.id() == id)
    }

    /// Selected clips, in selection order.
    pub fn selected_clips(&self) -> &[ClipId] {
        &self.selected_clips
    }

    pub fn selected_clip_count(&self) -> usize {
        self.selected_clips.len()
    }

    /// End frame of the furthest clip, 0 when empty.
    pub fn largest_frame_in_use(&self) -> i64 {
        self.largest_frame
    }

    pub fn render_data(&self) -> &Arc<TrackRenderData> {
        &self.render
    }

    pub fn add_clip(&mut self, clip: Clip) -> ReelResult<usize> {
        let index = self.clips.len();
        self.insert_clip(index, clip)?;
        Ok(index)
    }

    pub fn insert_clip(&mut self, index: usize, clip: Clip) -> ReelResult<()> {
        if index > self.clips.len() {
            return Err(ReelError::validation(format!(
                "clip index {index} out of range ({})",
                self.clips.len()
            )));
        }
        if self.clip(clip.id()).is_some() {
            return Err(ReelError::validation(format!(
                "{} is already on {}",
                clip.id(),
                self.id
            )));
        }
        check_placement(clip.span())?;
        if clip.is_selected() {
            self.selected_clips.push(clip.id());
        }
        self.largest_frame = self.largest_frame.max(clip.span().end_index());
        self.clips.insert(index, clip);
        Ok(())
    }

    pub fn remove_clip_at(&mut self, index: usize) -> ReelResult<Clip> {
        if index >= self.clips.len() {
            return Err(ReelError::validation(format!(
                "clip index {index} out of range ({})",
                self.clips.len()
            )));
        }
        let clip = self.clips.remove(index);
        if clip.is_selected() {
            remove_selected(&mut self.selected_clips, clip.id());
        }
        if self.pending.is_some_and(|p| p.clip_index >= index) {
            self.pending = None;
        }
        self.recompute_largest_frame();
        Ok(clip)
    }

    pub fn remove_clip(&mut self, id: ClipId) -> ReelResult<(usize, Clip)> {
        let index = self
            .clip_index(id)
            .ok_or_else(|| ReelError::validation(format!("{id} is not on {}", self.id)))?;
        Ok((index, self.remove_clip_at(index)?))
    }

    /// Move a clip in time. Returns the previous span.
    pub fn set_clip_span(&mut self, id: ClipId, span: FrameSpan) -> ReelResult<FrameSpan> {
        let track = self.id;
        let clip = self
            .clip_mut(id)
            .ok_or_else(|| ReelError::validation(format!("{id} is not on {track}")))?;
        let old = clip.set_span(span)?;
        self.recompute_largest_frame();
        Ok(old)
    }

    /// Returns `true` if the flag changed.
    pub fn set_clip_selected(&mut self, id: ClipId, selected: bool) -> ReelResult<bool> {
        let track = self.id;
        let clip = self
            .clip_mut(id)
            .ok_or_else(|| ReelError::validation(format!("{id} is not on {track}")))?;
        if clip.selected == selected {
            return Ok(false);
        }
        clip.selected = selected;
        if selected {
            self.selected_clips.push(id);
        } else {
            remove_selected(&mut self.selected_clips, id);
        }
        Ok(true)
    }

    /// Select every clip; returns how many became selected.
    pub fn select_all_clips(&mut self) -> usize {
        let mut count = 0;
        for clip in &mut self.clips {
            if !clip.selected {
                clip.selected = true;
                self.selected_clips.push(clip.id());
                count += 1;
            }
        }
        count
    }

    /// Deselect every clip except `keep`; returns how many were deselected.
    pub fn clear_clip_selection(&mut self, keep: Option<ClipId>) -> usize {
        let mut count = 0;
        for clip in &mut self.clips {
            if clip.selected && Some(clip.id()) != keep {
                clip.selected = false;
                count += 1;
            }
        }
        self.selected_clips.retain(|id| Some(*id) == keep);
        count
    }

    /// Remove every clip.
    pub fn clear(&mut self) -> Vec<Clip> {
        self.selected_clips.clear();
        self.pending = None;
        self.largest_frame = 0;
        std::mem::take(&mut self.clips)
    }

    /// Topmost clip covering `frame`, visible or not.
    pub fn clip_at_frame(&self, frame: i64) -> Option<&Clip> {
        self.clips.iter().rev().find(|c| c.intersects_frame(frame))
    }

    pub fn clips_at_frame(&self, frame: i64) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(move |c| c.intersects_frame(frame))
    }

    /// Index of the clip that renders at `frame`: the last in list order that covers the frame
    /// and is visible. A fully transparent clip still wins and draws nothing.
    pub fn active_clip_index(&self, frame: i64) -> Option<usize> {
        self.clips
            .iter()
            .rposition(|c| c.intersects_frame(frame) && c.props().is_visible())
    }

    pub fn clips_in_span(&self, span: FrameSpan) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(move |c| c.span().intersects(span))
    }

    pub fn is_region_empty(&self, span: FrameSpan) -> bool {
        self.clips_in_span(span).next().is_none()
    }

    /// Span from `frame` up to the next clip, `default_duration` long if nothing follows.
    ///
    /// `None` if a clip covers `frame`.
    pub fn try_span_until_clip(
        &self,
        frame: i64,
        default_duration: i64,
        max_duration: i64,
    ) -> Option<FrameSpan> {
        if self.clips.iter().any(|c| c.intersects_frame(frame)) {
            return None;
        }
        let next = self
            .clips
            .iter()
            .map(|c| c.span().begin)
            .filter(|&b| b > frame)
            .min();
        Some(match next {
            Some(begin) => FrameSpan::new(frame, (begin - frame).min(max_duration)),
            None => FrameSpan::new(frame, default_duration),
        })
    }

    /// [`Track::try_span_until_clip`] falling back to `default_duration` when a clip is in the
    /// way.
    pub fn span_until_clip(&self, frame: i64, default_duration: i64, max_duration: i64) -> FrameSpan {
        self.try_span_until_clip(frame, default_duration, max_duration)
            .unwrap_or(FrameSpan::new(frame, default_duration))
    }

    /// Deep copy with fresh track and clip ids. Selection is dropped.
    pub fn duplicate(&self) -> Self {
        let mut copy = Self::new(self.name.clone());
        copy.colour = self.colour;
        copy.height = self.height;
        copy.props = self.props.clone();
        copy.automation = self.automation.clone();
        copy.clips = self.clips.iter().map(Clip::duplicate).collect();
        copy.largest_frame = self.largest_frame;
        copy
    }

    /// Drop cached matrices here and in every clip's track-composed matrix.
    pub fn invalidate_transform(&mut self) {
        self.props.invalidate_transform();
        self.invalidate_clip_transforms();
    }

    pub(crate) fn invalidate_clip_transforms(&mut self) {
        for clip in &mut self.clips {
            clip.invalidate_absolute_transform();
        }
    }

    /// Forward and inverse track matrices for a frame size.
    pub fn transform(&mut self, width: u32, height: u32) -> (Affine, Affine) {
        self.props
            .transform(Vec2::new(f64::from(width), f64::from(height)))
    }

    /// Absolute matrices of a clip on this track.
    pub fn clip_transform(
        &mut self,
        id: ClipId,
        width: u32,
        height: u32,
    ) -> ReelResult<(Affine, Affine)> {
        let (fwd, inv) = self.transform(width, height);
        let track = self.id;
        let clip = self
            .clip_mut(id)
            .ok_or_else(|| ReelError::validation(format!("{id} is not on {track}")))?;
        let size = clip.reference_size(width, height);
        Ok(clip.absolute_transform(fwd, inv, size))
    }

    pub(crate) fn pending(&self) -> Option<PendingRender> {
        self.pending
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending = None;
    }

    /// Control-thread half of a render: pick the active clip, let its content prepare, and
    /// snapshot matrices and opacity. Returns `true` if a draw is pending.
    pub fn prepare_render(
        &mut self,
        frame: i64,
        quality: RenderQuality,
        width: u32,
        height: u32,
    ) -> ReelResult<bool> {
        self.pending = None;
        if !self.props.is_effectively_visible() {
            return Ok(false);
        }
        let Some(clip_index) = self.active_clip_index(frame) else {
            return Ok(false);
        };
        let (track_matrix, _) = self.transform(width, height);
        let track_opacity = self.props.opacity();
        let track = self.id;

        let clip = &mut self.clips[clip_index];
        let relative = frame - clip.span().begin;
        let cx = PrepareContext {
            frame: relative,
            media_frame: relative + clip.media_frame_offset(),
            quality,
            width,
            height,
            opacity: clip.props.opacity(),
        };
        let ready = clip.content.prepare(&cx).map_err(|e| {
            ReelError::render(format!("{track}: preparing {} failed: {e:#}", clip.id()))
        })?;
        if !ready {
            return Ok(false);
        }
        let size = clip.reference_size(width, height);
        let (clip_matrix, _) = clip.local_transform(size);
        self.pending = Some(PendingRender {
            frame,
            clip_index,
            clip_id: clip.id(),
            track_matrix,
            clip_matrix,
            track_opacity,
            clip_opacity: clip.props.opacity(),
            custom_opacity: clip.content.uses_custom_opacity(),
        });
        Ok(true)
    }

    /// Worker half of a render: draw the pending clip into this track's surface.
    ///
    /// Returns `Ok(false)` when nothing is pending or readers hold the surface. A failing draw
    /// leaves the canvas unwound and the surface empty, then reports the error.
    #[tracing::instrument(level = "debug", skip(self), fields(track = %self.id))]
    pub fn render_pending(&self, width: u32, height: u32) -> ReelResult<bool> {
        let Some(p) = self.pending else {
            return Ok(false);
        };
        let clip = self
            .clips
            .get(p.clip_index)
            .filter(|c| c.id() == p.clip_id)
            .ok_or_else(|| ReelError::render(format!("{}: pending clip was removed", self.id)))?;

        self.render.render_with(width, height, p.frame, |canvas| {
            let depth = canvas.save();
            canvas.concat(p.track_matrix);
            if !p.custom_opacity && p.clip_opacity < 1.0 {
                canvas.push_opacity(p.clip_opacity as f32);
            }
            canvas.concat(p.clip_matrix);
            let mut used = canvas.frame_rect();
            let result = clip.content.draw(canvas, &mut used);
            canvas.restore_to(depth);
            match result {
                Ok(()) => Ok(used),
                Err(e) => {
                    tracing::warn!(track = %self.id, clip = %clip.id(), error = %e, "clip draw failed");
                    Err(ReelError::render(format!(
                        "{}: drawing {} failed: {e:#}",
                        self.id,
                        clip.id()
                    )))
                }
            }
        })
    }

    fn recompute_largest_frame(&mut self) {
        self.largest_frame = self
            .clips
            .iter()
            .map(|c| c.span().end_index())
            .max()
            .unwrap_or(0);
    }

    pub fn write(&self, d: &mut DataDict) {
        d.set("Name", self.name.as_str());
        d.set("Colour", i64::from(self.colour.to_u32()));
        d.set("Height", self.height as i32);
        let mut automation = DataDict::new();
        self.automation.write(&mut automation);
        d.set("Automation", automation);
        let clips: Vec<DataValue> = self
            .clips
            .iter()
            .map(|c| {
                let mut cd = DataDict::new();
                c.write(&mut cd);
                DataValue::Dict(cd)
            })
            .collect();
        d.set("Clips", clips);
    }

    pub fn read(
        d: &DataDict,
        table: &ParameterTable,
        registry: &ContentRegistry,
    ) -> ReelResult<Self> {
        let mut track = Self::new(d.get_str("Name")?);
        track.colour = Rgba8::from_u32(d.get_i64("Colour")? as u32);
        track.set_height(u32::try_from(d.get_i32("Height")?).unwrap_or(DEFAULT_TRACK_HEIGHT));
        track.automation =
            AutomationData::read(d.get_dict("Automation")?, OwnerKind::Track, table)?;
        track.automation.update_backing_storage(&mut track.props);
        for item in d.get_list("Clips")? {
            let clip = Clip::read(item.as_dict()?, table, registry)?;
            track.add_clip(clip)?;
        }
        Ok(track)
    }
}

/// Drop `id` from an insertion-ordered selection list. Deselection usually hits the most recent
/// or the oldest entry, so both ends are checked before scanning.
pub(crate) fn remove_selected<T: PartialEq + Copy>(list: &mut Vec<T>, id: T) -> bool {
    if list.last() == Some(&id) {
        list.pop();
        return true;
    }
    if list.first() == Some(&id) {
        list.remove(0);
        return true;
    }
    match list.iter().position(|x| *x == id) {
        Some(i) => {
            list.remove(i);
            true
        }
        None => false,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/track.rs"]
mod tests;
