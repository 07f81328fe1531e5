use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard};

use kurbo::Rect;

use crate::foundation::core::clip_round_out;
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::canvas::Canvas;
use crate::render::usage::UsageGuard;

#[derive(Default)]
struct Surface {
    pixmap: Option<vello_cpu::Pixmap>,
    used_area: Rect,
    frame: i64,
}

/// Render output of one track: a pixmap plus the area the last render touched.
///
/// Writers go through [`TrackRenderData::render_with`], readers through
/// [`TrackRenderData::try_read`]; both only proceed if the usage guard admits them, so the
/// inner lock is never contended for long.
pub struct TrackRenderData {
    guard: UsageGuard,
    surface: RwLock<Surface>,
    // writer-only; kept apart so readers never touch the context
    ctx: Mutex<Option<vello_cpu::RenderContext>>,
}

impl std::fmt::Debug for TrackRenderData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackRenderData")
            .field("state", &self.guard.state())
            .finish_non_exhaustive()
    }
}

impl Default for TrackRenderData {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackRenderData {
    pub fn new() -> Self {
        Self {
            guard: UsageGuard::new(),
            surface: RwLock::new(Surface::default()),
            ctx: Mutex::new(None),
        }
    }

    pub fn guard(&self) -> &UsageGuard {
        &self.guard
    }

    /// Render into the surface. `draw` returns the touched device-space bounds.
    ///
    /// Returns `Ok(false)` when readers hold the surface and the frame was skipped. On error
    /// the surface is marked empty and the error is passed through.
    pub(crate) fn render_with(
        &self,
        width: u32,
        height: u32,
        frame: i64,
        draw: impl FnOnce(&mut Canvas<'_>) -> ReelResult<Rect>,
    ) -> ReelResult<bool> {
        let w: u16 = width
            .try_into()
            .map_err(|_| ReelError::render("surface width exceeds u16"))?;
        let h: u16 = height
            .try_into()
            .map_err(|_| ReelError::render("surface height exceeds u16"))?;
        if !self.guard.try_begin_write() {
            return Ok(false);
        }

        let mut ctx_slot = self.ctx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut surface = self.surface.write().unwrap_or_else(PoisonError::into_inner);
        let reuse = surface
            .pixmap
            .as_ref()
            .is_some_and(|p| p.width() == w && p.height() == h)
            && ctx_slot.is_some();
        if !reuse {
            tracing::debug!(width, height, "allocating track surface");
            surface.pixmap = Some(vello_cpu::Pixmap::new(w, h));
            *ctx_slot = Some(vello_cpu::RenderContext::new(w, h));
        }
        let (Some(pixmap), Some(ctx)) = (surface.pixmap.as_mut(), ctx_slot.as_mut()) else {
            self.guard.abort_write();
            return Err(ReelError::render("track surface missing after allocation"));
        };
        ctx.reset();

        let result = {
            let mut canvas = Canvas::new(ctx);
            draw(&mut canvas)
        };
        match result {
            Ok(area) => {
                ctx.flush();
                ctx.render_to_pixmap(pixmap);
                surface.used_area = clip_round_out(area, width, height);
                surface.frame = frame;
                drop(surface);
                self.guard.complete_write();
                Ok(true)
            }
            Err(e) => {
                surface.used_area = Rect::ZERO;
                drop(surface);
                self.guard.abort_write();
                Err(e)
            }
        }
    }

    /// Borrow the last completed frame, or `None` if nothing is ready or a write is active.
    pub fn try_read(&self) -> Option<SurfaceRead<'_>> {
        if !self.guard.try_begin_read() {
            return None;
        }
        let surface = self.surface.read().unwrap_or_else(PoisonError::into_inner);
        if surface.pixmap.is_none() {
            self.guard.complete_read();
            return None;
        }
        Some(SurfaceRead {
            guard: &self.guard,
            surface,
        })
    }
}

/// Read access to a completed track surface. Releases its usage on drop.
pub struct SurfaceRead<'a> {
    guard: &'a UsageGuard,
    surface: RwLockReadGuard<'a, Surface>,
}

impl SurfaceRead<'_> {
    pub fn width(&self) -> u32 {
        self.surface.pixmap.as_ref().map_or(0, |p| u32::from(p.width()))
    }

    pub fn height(&self) -> u32 {
        self.surface.pixmap.as_ref().map_or(0, |p| u32::from(p.height()))
    }

    /// Premultiplied RGBA8 pixels, row-major.
    pub fn data(&self) -> &[u8] {
        self.surface
            .pixmap
            .as_ref()
            .map_or(&[][..], |p| p.data_as_u8_slice())
    }

    /// Whole-pixel device rectangle the last render touched.
    pub fn used_area(&self) -> Rect {
        self.surface.used_area
    }

    /// Frame the surface was rendered for.
    pub fn frame(&self) -> i64 {
        self.surface.frame
    }
}

impl Drop for SurfaceRead<'_> {
    fn drop(&mut self) {
        self.guard.complete_read();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface.rs"]
mod tests;
