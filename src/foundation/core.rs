use crate::foundation::error::{ReelError, ReelResult};

pub use kurbo::{Affine, Point, Rect, Vec2};

/// Half-open integer frame interval `[begin, begin + duration)`.
///
/// Construction never validates: a negative duration is representable so that span algebra
/// composes (for example [`FrameSpan::clamp`] of two disjoint spans). Callers placing a span
/// on a track check [`FrameSpan::is_valid`] or normalise with [`FrameSpan::abs`] first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameSpan {
    pub begin: i64,
    pub duration: i64,
}

impl FrameSpan {
    pub const fn new(begin: i64, duration: i64) -> Self {
        Self { begin, duration }
    }

    pub const fn empty() -> Self {
        Self::new(0, 0)
    }

    /// Span covering `[begin, end)`.
    pub const fn from_index(begin: i64, end: i64) -> Self {
        Self::new(begin, end - begin)
    }

    /// Exclusive end frame.
    pub const fn end_index(self) -> i64 {
        self.begin + self.duration
    }

    pub const fn is_empty(self) -> bool {
        self.duration == 0
    }

    pub const fn is_valid(self) -> bool {
        self.duration >= 0
    }

    /// Grow by `count` frames on both edges.
    pub const fn expand(self, count: i64) -> Self {
        Self::new(self.begin - count, self.duration + count + count)
    }

    /// Shrink by `count` frames on both edges.
    pub const fn contract(self, count: i64) -> Self {
        Self::new(self.begin + count, self.duration - count - count)
    }

    pub const fn offset(self, frames: i64) -> Self {
        Self::new(self.begin + frames, self.duration)
    }

    pub const fn offset_duration(self, frames: i64) -> Self {
        Self::new(self.begin, self.duration + frames)
    }

    pub const fn with_begin(self, begin: i64) -> Self {
        Self::new(begin, self.duration)
    }

    pub const fn with_duration(self, duration: i64) -> Self {
        Self::new(self.begin, duration)
    }

    /// Keep `begin`, move the end edge to `end`. Fails if `end < begin`.
    pub fn move_end_index(self, end: i64) -> ReelResult<Self> {
        if end < self.begin {
            return Err(ReelError::validation(format!(
                "end index cannot be smaller than the begin index ({end} < {})",
                self.begin
            )));
        }
        Ok(Self::new(self.begin, end - self.begin))
    }

    /// Like [`FrameSpan::move_end_index`] but collapses to an empty span at `begin` instead of
    /// failing, and caps the end at `upper`.
    pub fn move_end_index_clamped(self, end: i64, upper: i64) -> Self {
        if end > self.begin {
            Self::new(self.begin, end.min(upper) - self.begin)
        } else {
            Self::new(self.begin, 0)
        }
    }

    /// Keep the end edge, move `begin`. Fails if `begin` would pass the end.
    pub fn move_begin(self, begin: i64) -> ReelResult<Self> {
        let end = self.end_index();
        if begin > end {
            return Err(ReelError::validation(format!(
                "begin cannot exceed the end index ({begin} > {end})"
            )));
        }
        Ok(Self::new(begin, end - begin))
    }

    /// Like [`FrameSpan::move_begin`] but raises `begin` to at least `lower` and collapses to an
    /// empty span at the end edge instead of failing.
    pub fn move_begin_clamped(self, begin: i64, lower: i64) -> Self {
        let end = self.end_index();
        let begin = begin.max(lower);
        if begin < end {
            Self::new(begin, end - begin)
        } else {
            Self::new(end, 0)
        }
    }

    pub fn add_end_index(self, frames: i64) -> ReelResult<Self> {
        self.move_end_index(self.end_index() + frames)
    }

    pub fn add_end_index_clamped(self, frames: i64, upper: i64) -> Self {
        self.move_end_index_clamped(self.end_index() + frames, upper)
    }

    pub fn add_begin_index(self, frames: i64) -> ReelResult<Self> {
        self.move_begin(self.begin + frames)
    }

    pub fn add_begin_index_clamped(self, frames: i64, lower: i64) -> Self {
        self.move_begin_clamped(self.begin + frames, lower)
    }

    /// Span with non-negative begin and duration.
    pub fn abs(self) -> Self {
        Self::new(self.begin.abs(), self.duration.abs())
    }

    /// Smallest span covering both.
    pub fn union(self, other: Self) -> Self {
        let begin = self.begin.min(other.begin);
        let end = self.end_index().max(other.end_index());
        Self::from_index(begin, end)
    }

    /// Intersection of both spans. A negative duration in the result means they are disjoint.
    pub fn clamp(self, other: Self) -> Self {
        Self::from_index(
            self.begin.max(other.begin),
            self.end_index().min(other.end_index()),
        )
    }

    pub fn intersects_frame(self, frame: i64) -> bool {
        frame >= self.begin && frame < self.end_index()
    }

    pub fn intersects(self, other: Self) -> bool {
        self.begin < other.end_index() && self.end_index() > other.begin
    }

    /// Union of every span, or `None` when the iterator is empty.
    pub fn union_all(spans: impl IntoIterator<Item = Self>) -> Option<Self> {
        spans.into_iter().reduce(Self::union)
    }
}

impl std::fmt::Display for FrameSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{} ({})", self.begin, self.end_index(), self.duration)
    }
}

/// Straight (non-premultiplied) RGBA8 colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }

    pub const fn from_u32(v: u32) -> Self {
        let [r, g, b, a] = v.to_be_bytes();
        Self::new(r, g, b, a)
    }
}

/// Round a rectangle outward to whole pixels after clipping it to `[0, width) x [0, height)`.
///
/// Partially covered edge pixels are kept.
pub fn clip_round_out(area: Rect, width: u32, height: u32) -> Rect {
    let frame = Rect::new(0.0, 0.0, f64::from(width), f64::from(height));
    let clipped = area.abs().intersect(frame);
    if clipped.width() <= 0.0 || clipped.height() <= 0.0 || !clipped.is_finite() {
        return Rect::ZERO;
    }
    clipped.expand()
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
