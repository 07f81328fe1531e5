use std::sync::atomic::{AtomicU64, Ordering};

use kurbo::{Affine, Vec2};

use crate::automation::data::AutomationData;
use crate::automation::parameter::{OwnerKind, ParameterTable};
use crate::foundation::core::FrameSpan;
use crate::foundation::error::{ReelError, ReelResult};
use crate::persist::data::DataDict;
use crate::render::content::{ClipContent, ContentRegistry};
use crate::timeline::props::VideoProps;

static NEXT_CLIP_ID: AtomicU64 = AtomicU64::new(1);

/// Runtime identity of a clip. Not persisted; reading a project assigns fresh ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(u64);

impl ClipId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CLIP_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug)]
struct AbsoluteMatrix {
    size: Vec2,
    track: Affine,
    forward: Affine,
    inverse: Affine,
}

/// A time-bounded placement of content on a track.
#[derive(Debug)]
pub struct Clip {
    id: ClipId,
    name: String,
    span: FrameSpan,
    media_frame_offset: i64,
    pub(crate) props: VideoProps,
    pub(crate) automation: AutomationData,
    pub(crate) content: Box<dyn ClipContent>,
    pub(crate) selected: bool,
    absolute: Option<AbsoluteMatrix>,
}

pub(crate) fn check_placement(span: FrameSpan) -> ReelResult<()> {
    if span.begin < 0 || span.duration < 1 {
        return Err(ReelError::validation(format!(
            "clip span must start at >= 0 and last at least one frame, got {span}"
        )));
    }
    Ok(())
}

impl Clip {
    pub fn new(
        name: impl Into<String>,
        span: FrameSpan,
        content: Box<dyn ClipContent>,
    ) -> ReelResult<Self> {
        check_placement(span)?;
        Ok(Self {
            id: ClipId::next(),
            name: name.into(),
            span,
            media_frame_offset: 0,
            props: VideoProps::default(),
            automation: AutomationData::new(OwnerKind::Clip),
            content,
            selected: false,
            absolute: None,
        })
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn span(&self) -> FrameSpan {
        self.span
    }

    /// Placement setter for clips not yet on a track; placed clips move through the timeline.
    pub fn set_span(&mut self, span: FrameSpan) -> ReelResult<FrameSpan> {
        check_placement(span)?;
        Ok(std::mem::replace(&mut self.span, span))
    }

    /// Frames skipped at the start of the media.
    pub fn media_frame_offset(&self) -> i64 {
        self.media_frame_offset
    }

    pub fn set_media_frame_offset(&mut self, offset: i64) {
        self.media_frame_offset = offset;
    }

    pub fn props(&self) -> &VideoProps {
        &self.props
    }

    pub fn automation(&self) -> &AutomationData {
        &self.automation
    }

    /// Direct automation access for clips not yet on a track.
    pub fn automation_mut(&mut self) -> &mut AutomationData {
        &mut self.automation
    }

    pub fn content(&self) -> &dyn ClipContent {
        self.content.as_ref()
    }

    pub fn content_mut(&mut self) -> &mut dyn ClipContent {
        self.content.as_mut()
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn intersects_frame(&self, frame: i64) -> bool {
        self.span.intersects_frame(frame)
    }

    /// Playhead relative to the clip's begin, if the clip covers it.
    pub fn relative_frame(&self, playhead: i64) -> Option<i64> {
        self.span
            .intersects_frame(playhead)
            .then(|| playhead - self.span.begin)
    }

    /// Copy with fresh identity, deselected.
    pub fn duplicate(&self) -> Self {
        Self {
            id: ClipId::next(),
            name: self.name.clone(),
            span: self.span,
            media_frame_offset: self.media_frame_offset,
            props: self.props.clone(),
            automation: self.automation.clone(),
            content: self.content.clone(),
            selected: false,
            absolute: None,
        }
    }

    /// Drop the cached track-composed matrix.
    pub fn invalidate_absolute_transform(&mut self) {
        self.absolute = None;
    }

    /// Reference size used to resolve relative transform origins.
    pub fn reference_size(&self, frame_width: u32, frame_height: u32) -> Vec2 {
        self.content
            .render_size()
            .unwrap_or_else(|| Vec2::new(f64::from(frame_width), f64::from(frame_height)))
    }

    /// Local forward/inverse matrices.
    pub fn local_transform(&mut self, size: Vec2) -> (Affine, Affine) {
        self.props.transform(size)
    }

    /// Track matrix composed with the local matrix, forward and inverse.
    pub fn absolute_transform(
        &mut self,
        track_forward: Affine,
        track_inverse: Affine,
        size: Vec2,
    ) -> (Affine, Affine) {
        if !self.props.is_transform_dirty()
            && let Some(m) = self.absolute
            && m.size == size
            && m.track == track_forward
        {
            return (m.forward, m.inverse);
        }
        let (local, local_inv) = self.props.transform(size);
        let forward = track_forward * local;
        let inverse = local_inv * track_inverse;
        self.absolute = Some(AbsoluteMatrix {
            size,
            track: track_forward,
            forward,
            inverse,
        });
        (forward, inverse)
    }

    pub fn write(&self, d: &mut DataDict) {
        d.set("Name", self.name.as_str());
        let mut span = DataDict::new();
        span.set("Begin", self.span.begin);
        span.set("Duration", self.span.duration);
        d.set("Span", span);
        d.set("MediaFrameOffset", self.media_frame_offset);
        d.set("ContentKind", self.content.kind());
        let mut content = DataDict::new();
        self.content.write(&mut content);
        d.set("Content", content);
        let mut automation = DataDict::new();
        self.automation.write(&mut automation);
        d.set("Automation", automation);
    }

    pub fn read(
        d: &DataDict,
        table: &ParameterTable,
        registry: &ContentRegistry,
    ) -> ReelResult<Self> {
        let sd = d.get_dict("Span")?;
        let span = FrameSpan::new(sd.get_i64("Begin")?, sd.get_i64("Duration")?);
        let content = registry.create(d.get_str("ContentKind")?, d.get_dict("Content")?)?;
        let mut clip = Self::new(d.get_str("Name")?, span, content)
            .map_err(|e| ReelError::serde(e.to_string()))?;
        clip.media_frame_offset = d.get_i64("MediaFrameOffset")?;
        clip.automation = AutomationData::read(d.get_dict("Automation")?, OwnerKind::Clip, table)?;
        clip.automation.update_backing_storage(&mut clip.props);
        Ok(clip)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/clip.rs"]
mod tests;
