use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use arc_swap::ArcSwapOption;
use kurbo::Rect;
use rayon::prelude::*;

use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::opacity_to_u8;
use crate::render::composite::over_region;
use crate::render::content::RenderQuality;
use crate::timeline::events::{EventBus, SubscriptionId, TimelineEvent};
use crate::timeline::timeline::Timeline;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderThreading {
    /// Render prepared tracks on a rayon pool instead of the calling thread.
    pub parallel: bool,
    /// Pool size; `None` lets rayon pick.
    pub threads: Option<usize>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub threading: RenderThreading,
    /// Used when a request does not carry its own quality.
    pub quality: RenderQuality,
}

/// Cooperative cancellation flag, checked between tracks. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What to render: target size, a frame offset from the playhead and a quality hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderRequest {
    pub width: u32,
    pub height: u32,
    pub offset: i64,
    pub quality: Option<RenderQuality>,
}

impl RenderRequest {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            offset: 0,
            quality: None,
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_quality(mut self, quality: RenderQuality) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// A composited frame. Pixels are premultiplied RGBA8, row-major, no padding.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedFrame {
    pub frame: i64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Union of the track areas that contributed pixels.
    pub used_area: Rect,
}

impl RenderedFrame {
    /// Premultiplied pixel at `(x, y)`, if inside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

#[derive(Clone, Debug)]
pub enum RenderOutcome {
    Completed(Arc<RenderedFrame>),
    Cancelled,
}

impl RenderOutcome {
    pub fn frame(&self) -> Option<&Arc<RenderedFrame>> {
        match self {
            Self::Completed(f) => Some(f),
            Self::Cancelled => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum RenderEvent {
    /// Something visible changed; the host should schedule a render.
    RenderRequested,
    RenderCompleted(Arc<RenderedFrame>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderStats {
    pub frames_rendered: u64,
    pub average_render_millis: f64,
}

struct Shared {
    suspended: AtomicUsize,
    requested: AtomicBool,
    events: Mutex<EventBus<RenderEvent>>,
}

impl Shared {
    fn emit(&self, event: &RenderEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(event);
    }

    fn invalidate(&self) -> bool {
        self.requested.store(true, Ordering::Release);
        if self.suspended.load(Ordering::Acquire) > 0 {
            return false;
        }
        self.emit(&RenderEvent::RenderRequested);
        true
    }
}

/// Drives prepare, render and composite for a timeline and publishes the result.
///
/// Only one render runs at a time; a concurrent call fails instead of queueing. Render event
/// handlers run synchronously on the rendering or invalidating thread and must not call back
/// into the manager's subscription methods.
pub struct RenderManager {
    settings: RenderSettings,
    pool: Option<rayon::ThreadPool>,
    rendering: AtomicBool,
    latest: ArcSwapOption<RenderedFrame>,
    stats: Mutex<RenderStats>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RenderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderManager")
            .field("settings", &self.settings)
            .field("rendering", &self.is_rendering())
            .finish_non_exhaustive()
    }
}

impl RenderManager {
    pub fn new(settings: RenderSettings) -> ReelResult<Self> {
        let pool = if settings.threading.parallel {
            Some(build_thread_pool(settings.threading.threads)?)
        } else {
            None
        };
        Ok(Self {
            settings,
            pool,
            rendering: AtomicBool::new(false),
            latest: ArcSwapOption::empty(),
            stats: Mutex::new(RenderStats::default()),
            shared: Arc::new(Shared {
                suspended: AtomicUsize::new(0),
                requested: AtomicBool::new(false),
                events: Mutex::new(EventBus::new()),
            }),
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::Acquire)
    }

    /// Most recently published frame.
    pub fn latest_frame(&self) -> Option<Arc<RenderedFrame>> {
        self.latest.load_full()
    }

    pub fn stats(&self) -> RenderStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn average_render_millis(&self) -> f64 {
        self.stats().average_render_millis
    }

    pub fn subscribe(&self, handler: impl FnMut(&RenderEvent) + Send + 'static) -> SubscriptionId {
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unsubscribe(id)
    }

    /// Forward the timeline's render invalidations to this manager.
    pub fn connect(&self, timeline: &mut Timeline) -> SubscriptionId {
        let shared = Arc::clone(&self.shared);
        timeline.subscribe(move |event| {
            if matches!(event, TimelineEvent::RenderInvalidated) {
                shared.invalidate();
            }
        })
    }

    /// Request a render. While invalidation is suspended the request is only recorded.
    ///
    /// Returns `true` if subscribers were notified.
    pub fn invalidate_render(&self) -> bool {
        self.shared.invalidate()
    }

    /// Clear and return the recorded render request.
    pub fn take_render_request(&self) -> bool {
        self.shared.requested.swap(false, Ordering::AcqRel)
    }

    /// Hold invalidation notifications until the guard drops; one notification is sent then
    /// if anything was invalidated in between.
    pub fn suspend_invalidation(&self) -> InvalidationSuspension<'_> {
        self.shared.suspended.fetch_add(1, Ordering::AcqRel);
        InvalidationSuspension { manager: self }
    }

    pub fn is_invalidation_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::Acquire) > 0
    }

    /// Render the frame at `playhead + request.offset`.
    ///
    /// Tracks are prepared and composited bottom (last index) to top. Tracks that fail to
    /// prepare or draw are left out; the frame is still published and the first error is
    /// returned afterwards.
    #[tracing::instrument(skip(self, timeline, cancel), fields(playhead = timeline.playhead()))]
    pub fn render(
        &self,
        timeline: &mut Timeline,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> ReelResult<RenderOutcome> {
        let (width, height) = (request.width, request.height);
        if width == 0 || height == 0 {
            return Err(ReelError::validation(format!(
                "render target must be non-empty, got {width}x{height}"
            )));
        }
        if self
            .rendering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReelError::render("a render is already in progress"));
        }
        let _in_flight = InFlight(&self.rendering);

        let started = Instant::now();
        let frame = timeline.playhead() + request.offset;
        let quality = request.quality.unwrap_or(self.settings.quality);
        let mut first_error: Option<ReelError> = None;

        let mut prepared = vec![false; timeline.track_count()];
        for i in (0..prepared.len()).rev() {
            if cancel.is_cancelled() {
                tracing::debug!(frame, "render cancelled while preparing");
                clear_pending(timeline);
                return Ok(RenderOutcome::Cancelled);
            }
            let track = &mut timeline.tracks_mut()[i];
            match track.prepare_render(frame, quality, width, height) {
                Ok(ready) => prepared[i] = ready,
                Err(e) => {
                    tracing::warn!(track = %track.id(), error = %e, "track prepare failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        let tracks = timeline.tracks();
        let jobs: Vec<usize> = (0..tracks.len()).rev().filter(|&i| prepared[i]).collect();
        let render_one = |&i: &usize| -> ReelResult<bool> {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            tracks[i].render_pending(width, height)
        };
        let results: Vec<ReelResult<bool>> = match &self.pool {
            Some(pool) => pool.install(|| jobs.par_iter().map(render_one).collect()),
            None => jobs.iter().map(render_one).collect(),
        };
        if cancel.is_cancelled() {
            tracing::debug!(frame, "render cancelled before compositing");
            clear_pending(timeline);
            return Ok(RenderOutcome::Cancelled);
        }
        let mut failed = Vec::new();
        for (&i, result) in jobs.iter().zip(results) {
            match result {
                Ok(true) => {}
                Ok(false) => tracing::trace!(track = %tracks[i].id(), "surface busy, reusing last"),
                Err(e) => {
                    prepared[i] = false;
                    failed.push(i);
                    first_error.get_or_insert(e);
                }
            }
        }

        let mut data = vec![0u8; width as usize * height as usize * 4];
        let mut used_area: Option<Rect> = None;
        for &i in &jobs {
            if !prepared[i] {
                continue;
            }
            let track = &tracks[i];
            let Some(surface) = track.render_data().try_read() else {
                continue;
            };
            if surface.width() != width || surface.height() != height {
                continue;
            }
            let area = surface.used_area();
            if area.area() <= 0.0 {
                continue;
            }
            let opacity = track.pending().map_or(1.0, |p| p.track_opacity);
            if let Err(e) = over_region(
                &mut data,
                surface.data(),
                width,
                height,
                area,
                opacity_to_u8(opacity),
            ) {
                first_error.get_or_insert(e);
                continue;
            }
            used_area = Some(used_area.map_or(area, |u| u.union(area)));
        }

        for i in failed {
            timeline.tracks_mut()[i].clear_pending();
        }

        let rendered = Arc::new(RenderedFrame {
            frame,
            width,
            height,
            data,
            used_area: used_area.unwrap_or(Rect::ZERO),
        });
        self.latest.store(Some(Arc::clone(&rendered)));

        let millis = started.elapsed().as_secs_f64() * 1000.0;
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.frames_rendered += 1;
            let n = stats.frames_rendered as f64;
            stats.average_render_millis += (millis - stats.average_render_millis) / n;
        }
        tracing::debug!(frame, millis, tracks = jobs.len(), "frame rendered");
        self.shared
            .emit(&RenderEvent::RenderCompleted(Arc::clone(&rendered)));

        match first_error {
            Some(e) => Err(e),
            None => Ok(RenderOutcome::Completed(rendered)),
        }
    }
}

/// Returned by [`RenderManager::suspend_invalidation`].
#[must_use = "invalidation resumes when the guard is dropped"]
pub struct InvalidationSuspension<'a> {
    manager: &'a RenderManager,
}

impl Drop for InvalidationSuspension<'_> {
    fn drop(&mut self) {
        let shared = &self.manager.shared;
        if shared.suspended.fetch_sub(1, Ordering::AcqRel) == 1
            && shared.requested.load(Ordering::Acquire)
        {
            shared.emit(&RenderEvent::RenderRequested);
        }
    }
}

fn clear_pending(timeline: &mut Timeline) {
    for track in timeline.tracks_mut() {
        track.clear_pending();
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn build_thread_pool(threads: Option<usize>) -> ReelResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ReelError::validation(
            "render threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("reel-render-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ReelError::render(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/render/manager.rs"]
mod tests;
