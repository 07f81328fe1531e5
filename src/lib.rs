//! Reel is the playback and composition core of a non-linear video editor.
//!
//! A [`Timeline`] holds ordered [`Track`]s of [`Clip`]s placed on integer frame spans. Every
//! visual property is a parameter whose value may be driven by an [`AutomationSequence`] of
//! key frames, evaluated at the playhead. A [`RenderManager`] prepares the active clip of each
//! track, draws tracks into their own surfaces (optionally on a rayon pool) and composites
//! them into one premultiplied RGBA frame.
//!
//! - Build or [`Timeline::read`] a timeline
//! - Move the playhead with [`Timeline::set_playhead`]
//! - Call [`RenderManager::render`] and read [`RenderManager::latest_frame`]
#![forbid(unsafe_code)]

pub mod automation;
pub mod foundation;
pub mod persist;
pub mod render;
pub mod timeline;

pub use crate::automation::data::AutomationData;
pub use crate::automation::keyframe::KeyFrame;
pub use crate::automation::parameter::{
    OwnerKind, Parameter, ParameterFlags, ParameterKey, ParameterRegistry, ParameterTable,
};
pub use crate::automation::sequence::AutomationSequence;
pub use crate::automation::value::{AutomationValue, DataType, LongRounding};
pub use crate::foundation::core::{Affine, FrameSpan, Point, Rect, Rgba8, Vec2};
pub use crate::foundation::error::{ReelError, ReelResult};
pub use crate::persist::data::{DataDict, DataValue};
pub use crate::render::content::{
    ClipContent, ContentRegistry, DecodedFrame, FrameSource, MediaContent, RenderQuality,
    SolidColorContent,
};
pub use crate::render::manager::{
    CancellationToken, RenderEvent, RenderManager, RenderOutcome, RenderRequest, RenderSettings,
    RenderThreading, RenderedFrame,
};
pub use crate::timeline::clip::{Clip, ClipId};
pub use crate::timeline::events::{AutomationTarget, SubscriptionId, TimelineEvent};
pub use crate::timeline::timeline::{SelectionType, Timeline, TimelineSettings};
pub use crate::timeline::track::{Track, TrackId};
