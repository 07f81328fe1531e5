use std::collections::BTreeMap;
use std::sync::Arc;

use kurbo::{Ellipse, Rect, Shape, Vec2};

use crate::foundation::core::Rgba8;
use crate::foundation::error::{ReelError, ReelResult};
use crate::persist::data::DataDict;
use crate::render::canvas::Canvas;

/// Preview quality hint passed through to clip content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderQuality {
    /// Interactive scrubbing; content may skip expensive work.
    Draft,
    #[default]
    Full,
}

/// Per-frame inputs handed to [`ClipContent::prepare`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrepareContext {
    /// Frame relative to the clip's begin.
    pub frame: i64,
    /// `frame` shifted by the clip's media offset.
    pub media_frame: i64,
    pub quality: RenderQuality,
    pub width: u32,
    pub height: u32,
    /// Clip opacity snapshot, for content that applies opacity itself.
    pub opacity: f64,
}

/// Clip-specific drawing.
///
/// `prepare` runs on the control thread with exclusive access; `draw` runs on a render worker and
/// must only read what `prepare` captured. `draw` writes back the device-space bounds it touched;
/// the caller pre-fills it with the whole frame.
pub trait ClipContent: Send + Sync + std::fmt::Debug {
    /// Stable identifier used by [`ContentRegistry`] when reading projects back.
    fn kind(&self) -> &'static str;

    /// Capture what `draw` needs for this frame. Returning `false` skips the draw.
    fn prepare(&mut self, cx: &PrepareContext) -> anyhow::Result<bool>;

    fn draw(&self, canvas: &mut Canvas<'_>, used: &mut Rect) -> anyhow::Result<()>;

    /// Natural content size; relative transform origins scale against it. `None` uses the frame.
    fn render_size(&self) -> Option<Vec2> {
        None
    }

    /// Content applies the clip opacity itself, so no opacity layer is opened around `draw`.
    fn uses_custom_opacity(&self) -> bool {
        false
    }

    fn write(&self, data: &mut DataDict);

    fn clone_box(&self) -> Box<dyn ClipContent>;
}

impl Clone for Box<dyn ClipContent> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SolidShape {
    #[default]
    Rect,
    Ellipse,
}

impl SolidShape {
    fn to_byte(self) -> u8 {
        match self {
            Self::Rect => 0,
            Self::Ellipse => 1,
        }
    }

    fn from_byte(b: u8) -> ReelResult<Self> {
        match b {
            0 => Ok(Self::Rect),
            1 => Ok(Self::Ellipse),
            other => Err(ReelError::serde(format!("unknown solid shape {other}"))),
        }
    }
}

/// Flat colour fill, either covering the frame or a fixed-size box at the clip origin.
#[derive(Clone, Debug, PartialEq)]
pub struct SolidColorContent {
    color: Rgba8,
    size: Option<Vec2>,
    shape: SolidShape,
    // captured by prepare
    bounds: Rect,
}

impl SolidColorContent {
    pub const KIND: &'static str = "SolidColor";

    pub fn new(color: Rgba8) -> Self {
        Self {
            color,
            size: None,
            shape: SolidShape::Rect,
            bounds: Rect::ZERO,
        }
    }

    pub fn with_size(mut self, size: Vec2) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_shape(mut self, shape: SolidShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn color(&self) -> Rgba8 {
        self.color
    }

    pub fn set_color(&mut self, color: Rgba8) {
        self.color = color;
    }

    pub fn size(&self) -> Option<Vec2> {
        self.size
    }

    pub fn shape(&self) -> SolidShape {
        self.shape
    }

    pub fn read(data: &DataDict) -> ReelResult<Self> {
        let color = Rgba8::from_u32(data.get_i64("Colour")? as u32);
        let size = if data.contains("Size") {
            Some(data.get_vec2("Size")?)
        } else {
            None
        };
        let shape = if data.contains("Shape") {
            SolidShape::from_byte(data.get_u8("Shape")?)?
        } else {
            SolidShape::Rect
        };
        Ok(Self {
            color,
            size,
            shape,
            bounds: Rect::ZERO,
        })
    }
}

impl ClipContent for SolidColorContent {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn prepare(&mut self, cx: &PrepareContext) -> anyhow::Result<bool> {
        let size = self
            .size
            .unwrap_or_else(|| Vec2::new(f64::from(cx.width), f64::from(cx.height)));
        if !(size.x > 0.0 && size.y > 0.0) || self.color.a == 0 {
            return Ok(false);
        }
        self.bounds = Rect::from_origin_size((0.0, 0.0), (size.x, size.y));
        Ok(true)
    }

    fn draw(&self, canvas: &mut Canvas<'_>, used: &mut Rect) -> anyhow::Result<()> {
        match self.shape {
            SolidShape::Rect => canvas.fill_rect(self.bounds, self.color),
            SolidShape::Ellipse => {
                let path = Ellipse::from_rect(self.bounds).to_path(0.1);
                canvas.fill_path(&path, self.color);
            }
        }
        *used = canvas.device_bounds(self.bounds);
        Ok(())
    }

    fn render_size(&self) -> Option<Vec2> {
        self.size
    }

    fn write(&self, data: &mut DataDict) {
        data.set("Colour", i64::from(self.color.to_u32()));
        if let Some(size) = self.size {
            data.set_vec2("Size", size);
        }
        data.set("Shape", self.shape.to_byte());
    }

    fn clone_box(&self) -> Box<dyn ClipContent> {
        Box::new(self.clone())
    }
}

/// One decoded media frame, ready to paint.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    width: u32,
    height: u32,
    image: vello_cpu::Image,
}

impl DecodedFrame {
    /// Build from premultiplied RGBA8 bytes, row-major.
    pub fn from_premul_rgba8(rgba8_premul: &[u8], width: u32, height: u32) -> ReelResult<Self> {
        let w: u16 = width
            .try_into()
            .map_err(|_| ReelError::render("frame width exceeds u16"))?;
        let h: u16 = height
            .try_into()
            .map_err(|_| ReelError::render("frame height exceeds u16"))?;
        if rgba8_premul.len() != width as usize * height as usize * 4 {
            return Err(ReelError::render("decoded frame byte length mismatch"));
        }

        let mut may_have_opacities = false;
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for px in rgba8_premul.chunks_exact(4) {
            may_have_opacities |= px[3] != 255;
            pixels.push(vello_cpu::peniko::color::PremulRgba8 {
                r: px[0],
                g: px[1],
                b: px[2],
                a: px[3],
            });
        }
        let pixmap = vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, may_have_opacities);
        Ok(Self {
            width,
            height,
            image: vello_cpu::Image {
                image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
                sampler: vello_cpu::peniko::ImageSampler::default(),
            },
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(f64::from(self.width), f64::from(self.height))
    }
}

/// External decoder boundary: hands out decoded frames by media frame index.
///
/// Decoding must be synchronous or pre-fetched; `frame_at` is called from `prepare`.
pub trait FrameSource: Send + Sync + std::fmt::Debug {
    /// Identifier persisted with the clip so a project can be reconnected to its media.
    fn source_id(&self) -> &str;

    fn size(&self) -> Vec2;

    /// `Ok(None)` when the source has no frame at `media_frame`.
    fn frame_at(&self, media_frame: i64) -> anyhow::Result<Option<Arc<DecodedFrame>>>;
}

/// Clip content that paints frames pulled from a [`FrameSource`].
#[derive(Clone, Debug)]
pub struct MediaContent {
    source: Arc<dyn FrameSource>,
    current: Option<Arc<DecodedFrame>>,
}

impl MediaContent {
    pub const KIND: &'static str = "Media";

    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            current: None,
        }
    }

    pub fn source(&self) -> &Arc<dyn FrameSource> {
        &self.source
    }

    /// Factory for [`ContentRegistry::register`] that reconnects saved clips through `resolve`.
    pub fn factory(
        resolve: impl Fn(&str) -> Option<Arc<dyn FrameSource>> + Send + Sync + 'static,
    ) -> impl Fn(&DataDict) -> ReelResult<Box<dyn ClipContent>> + Send + Sync + 'static {
        move |data| {
            let id = data.get_str("SourceId")?;
            let source = resolve(id)
                .ok_or_else(|| ReelError::serde(format!("unknown media source '{id}'")))?;
            Ok(Box::new(MediaContent::new(source)) as Box<dyn ClipContent>)
        }
    }
}

impl ClipContent for MediaContent {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn prepare(&mut self, cx: &PrepareContext) -> anyhow::Result<bool> {
        self.current = self.source.frame_at(cx.media_frame)?;
        Ok(self.current.is_some())
    }

    fn draw(&self, canvas: &mut Canvas<'_>, used: &mut Rect) -> anyhow::Result<()> {
        let Some(frame) = self.current.as_ref() else {
            *used = Rect::ZERO;
            return Ok(());
        };
        let size = frame.size();
        canvas.draw_image(&frame.image, size.x, size.y);
        *used = canvas.device_bounds(Rect::from_origin_size((0.0, 0.0), (size.x, size.y)));
        Ok(())
    }

    fn render_size(&self) -> Option<Vec2> {
        Some(self.source.size())
    }

    fn write(&self, data: &mut DataDict) {
        data.set("SourceId", self.source.source_id());
    }

    fn clone_box(&self) -> Box<dyn ClipContent> {
        Box::new(self.clone())
    }
}

type ContentFactory = Box<dyn Fn(&DataDict) -> ReelResult<Box<dyn ClipContent>> + Send + Sync>;

/// Maps persisted content kinds back to constructors.
pub struct ContentRegistry {
    factories: BTreeMap<String, ContentFactory>,
}

impl std::fmt::Debug for ContentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ContentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ContentRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry knowing [`SolidColorContent`]. Media needs a resolver, see
    /// [`MediaContent::factory`].
    pub fn with_builtins() -> Self {
        let mut r = Self::empty();
        r.register(SolidColorContent::KIND, |d| {
            Ok(Box::new(SolidColorContent::read(d)?) as Box<dyn ClipContent>)
        });
        r
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&DataDict) -> ReelResult<Box<dyn ClipContent>> + Send + Sync + 'static,
    ) {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn create(&self, kind: &str, data: &DataDict) -> ReelResult<Box<dyn ClipContent>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ReelError::serde(format!("unknown clip content kind '{kind}'")))?;
        factory(data)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/content.rs"]
mod tests;
