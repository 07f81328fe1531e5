use kurbo::{Affine, BezPath, PathEl, Rect};
use smallvec::SmallVec;

use crate::foundation::core::Rgba8;

#[derive(Clone, Copy, Debug)]
struct SavedState {
    transform: Affine,
    layers: usize,
}

/// Drawing surface handed to clip content.
///
/// Wraps a `vello_cpu` context with a save/restore stack of transform and opacity-layer depth.
/// Dropping the canvas closes any layer still open, so a failed draw always leaves the context
/// balanced.
pub struct Canvas<'a> {
    ctx: &'a mut vello_cpu::RenderContext,
    width: u32,
    height: u32,
    transform: Affine,
    layers: usize,
    stack: SmallVec<[SavedState; 8]>,
}

impl<'a> Canvas<'a> {
    pub(crate) fn new(ctx: &'a mut vello_cpu::RenderContext) -> Self {
        let width = u32::from(ctx.width());
        let height = u32::from(ctx.height());
        Self {
            ctx,
            width,
            height,
            transform: Affine::IDENTITY,
            layers: 0,
            stack: SmallVec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whole-frame rectangle in device space.
    pub fn frame_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Push the current transform and layer depth; returns the depth to pass to
    /// [`Canvas::restore_to`].
    pub fn save(&mut self) -> usize {
        let depth = self.stack.len();
        self.stack.push(SavedState {
            transform: self.transform,
            layers: self.layers,
        });
        depth
    }

    /// Pop one saved state, closing layers opened since.
    pub fn restore(&mut self) {
        let Some(saved) = self.stack.pop() else {
            return;
        };
        while self.layers > saved.layers {
            self.ctx.pop_layer();
            self.layers -= 1;
        }
        self.transform = saved.transform;
    }

    pub fn restore_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            self.restore();
        }
    }

    /// Pre-multiply `a` onto the current transform (it applies first).
    pub fn concat(&mut self, a: Affine) {
        self.transform = self.transform * a;
    }

    pub fn push_opacity(&mut self, opacity: f32) {
        self.ctx.push_opacity_layer(opacity.clamp(0.0, 1.0));
        self.layers += 1;
    }

    pub fn pop_layer(&mut self) {
        let floor = self.stack.last().map_or(0, |s| s.layers);
        if self.layers > floor {
            self.ctx.pop_layer();
            self.layers -= 1;
        }
    }

    /// Device-space bounding box of a local rectangle.
    pub fn device_bounds(&self, local: Rect) -> Rect {
        self.transform.transform_rect_bbox(local)
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgba8) {
        self.ctx.set_transform(affine_to_cpu(self.transform));
        self.ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            color.r, color.g, color.b, color.a,
        ));
        self.ctx
            .fill_rect(&vello_cpu::kurbo::Rect::new(rect.x0, rect.y0, rect.x1, rect.y1));
    }

    pub fn fill_path(&mut self, path: &BezPath, color: Rgba8) {
        self.ctx.set_transform(affine_to_cpu(self.transform));
        self.ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            color.r, color.g, color.b, color.a,
        ));
        self.ctx.fill_path(&bezpath_to_cpu(path));
    }

    /// Draw an image with its top-left corner at the local origin.
    pub fn draw_image(&mut self, image: &vello_cpu::Image, width: f64, height: f64) {
        self.ctx.set_transform(affine_to_cpu(self.transform));
        self.ctx.set_paint(image.clone());
        self.ctx
            .fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, width, height));
    }
}

impl Drop for Canvas<'_> {
    fn drop(&mut self) {
        while self.layers > 0 {
            self.ctx.pop_layer();
            self.layers -= 1;
        }
    }
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    let p = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(a) => out.move_to(p(a)),
            PathEl::LineTo(a) => out.line_to(p(a)),
            PathEl::QuadTo(a, b) => out.quad_to(p(a), p(b)),
            PathEl::CurveTo(a, b, c) => out.curve_to(p(a), p(b), p(c)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/canvas.rs"]
mod tests;
