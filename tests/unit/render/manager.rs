use super::*;
use crate::foundation::core::{FrameSpan, Rgba8};
use crate::render::content::{ClipContent, PrepareContext, SolidColorContent};
use crate::render::canvas::Canvas;
use crate::timeline::clip::Clip;
use crate::timeline::track::Track;
use crate::timeline::track::TrackId;
use crate::persist::data::DataDict;
use std::sync::Mutex as StdMutex;

fn solid_clip(begin: i64, duration: i64, color: Rgba8) -> Clip {
    Clip::new(
        "solid",
        FrameSpan::new(begin, duration),
        Box::new(SolidColorContent::new(color)),
    )
    .unwrap()
}

fn small_timeline() -> Timeline {
    Timeline::new(crate::timeline::timeline::TimelineSettings {
        resolution: (8, 8),
        ..Default::default()
    })
}

fn add_track(tl: &mut Timeline, clip: Clip) -> TrackId {
    let t = Track::new("V");
    let id = t.id();
    tl.add_track(t).unwrap();
    tl.add_clip(id, clip).unwrap();
    id
}

#[derive(Clone, Debug)]
struct Broken;

impl ClipContent for Broken {
    fn kind(&self) -> &'static str {
        "Broken"
    }

    fn prepare(&mut self, _: &PrepareContext) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn draw(&self, _: &mut Canvas<'_>, _: &mut Rect) -> anyhow::Result<()> {
        anyhow::bail!("decoder went away")
    }

    fn write(&self, _: &mut DataDict) {}

    fn clone_box(&self) -> Box<dyn ClipContent> {
        Box::new(self.clone())
    }
}

/// Cancels the render it is being prepared for.
#[derive(Clone, Debug)]
struct CancelOnPrepare(CancellationToken);

impl ClipContent for CancelOnPrepare {
    fn kind(&self) -> &'static str {
        "CancelOnPrepare"
    }

    fn prepare(&mut self, _: &PrepareContext) -> anyhow::Result<bool> {
        self.0.cancel();
        Ok(true)
    }

    fn draw(&self, _: &mut Canvas<'_>, _: &mut Rect) -> anyhow::Result<()> {
        Ok(())
    }

    fn write(&self, _: &mut DataDict) {}

    fn clone_box(&self) -> Box<dyn ClipContent> {
        Box::new(self.clone())
    }
}

fn render(manager: &RenderManager, tl: &mut Timeline) -> ReelResult<RenderOutcome> {
    manager.render(tl, RenderRequest::new(8, 8), &CancellationToken::new())
}

#[test]
fn zero_threads_is_rejected() {
    let settings = RenderSettings {
        threading: RenderThreading {
            parallel: true,
            threads: Some(0),
        },
        ..Default::default()
    };
    assert!(RenderManager::new(settings).is_err());
}

#[test]
fn empty_timeline_renders_transparent() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let mut tl = small_timeline();
    let out = render(&manager, &mut tl).unwrap();
    let frame = out.frame().unwrap();
    assert!(frame.data.iter().all(|b| *b == 0));
    assert_eq!(frame.used_area, Rect::ZERO);
    assert!(Arc::ptr_eq(frame, &manager.latest_frame().unwrap()));
}

#[test]
fn top_track_composites_over_bottom() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let mut tl = small_timeline();
    add_track(&mut tl, solid_clip(0, 10, Rgba8::opaque(255, 0, 0)));
    add_track(&mut tl, solid_clip(0, 10, Rgba8::opaque(0, 0, 255)));

    let out = render(&manager, &mut tl).unwrap();
    let frame = out.frame().unwrap();
    // index 0 is the top track
    assert_eq!(frame.pixel(4, 4), Some([255, 0, 0, 255]));
    assert_eq!(frame.used_area, Rect::new(0.0, 0.0, 8.0, 8.0));
    assert_eq!(manager.stats().frames_rendered, 1);
}

#[test]
fn track_opacity_tints_the_composite() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let mut tl = small_timeline();
    let id = add_track(&mut tl, solid_clip(0, 10, Rgba8::opaque(255, 255, 255)));
    let opacity = Arc::clone(&tl.table().builtins().track.opacity);
    tl.set_parameter_value(
        crate::timeline::events::AutomationTarget::Track(id),
        &opacity,
        crate::automation::value::AutomationValue::Double(0.5),
    )
    .unwrap();

    let out = render(&manager, &mut tl).unwrap();
    let [r, _, _, a] = out.frame().unwrap().pixel(0, 0).unwrap();
    assert!((127..=129).contains(&a), "alpha {a}");
    assert_eq!(r, a);
}

#[test]
fn only_clips_under_the_playhead_render() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let mut tl = small_timeline();
    add_track(&mut tl, solid_clip(10, 30, Rgba8::opaque(0, 255, 0)));

    tl.set_playhead(39).unwrap();
    let out = render(&manager, &mut tl).unwrap();
    assert_eq!(out.frame().unwrap().pixel(0, 0), Some([0, 255, 0, 255]));

    tl.set_playhead(40).unwrap();
    let out = render(&manager, &mut tl).unwrap();
    assert_eq!(out.frame().unwrap().pixel(0, 0), Some([0, 0, 0, 0]));
    assert_eq!(out.frame().unwrap().frame, 40);
}

#[test]
fn request_offset_shifts_the_rendered_frame() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let mut tl = small_timeline();
    add_track(&mut tl, solid_clip(5, 5, Rgba8::opaque(0, 255, 0)));
    let out = manager
        .render(
            &mut tl,
            RenderRequest::new(8, 8).with_offset(6),
            &CancellationToken::new(),
        )
        .unwrap();
    let frame = out.frame().unwrap();
    assert_eq!(frame.frame, 6);
    assert_eq!(frame.pixel(1, 1), Some([0, 255, 0, 255]));
}

#[test]
fn failing_track_is_skipped_and_reported_after_publish() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let mut tl = small_timeline();
    add_track(
        &mut tl,
        Clip::new("broken", FrameSpan::new(0, 10), Box::new(Broken)).unwrap(),
    );
    add_track(&mut tl, solid_clip(0, 10, Rgba8::opaque(0, 0, 255)));

    let err = render(&manager, &mut tl).unwrap_err();
    assert!(matches!(err, ReelError::Render(_)));
    let published = manager.latest_frame().unwrap();
    assert_eq!(published.pixel(2, 2), Some([0, 0, 255, 255]));
    assert!(!manager.is_rendering());
    assert!(tl.tracks()[0].pending().is_none());
    assert!(tl.tracks()[1].pending().is_some());
}

#[test]
fn cancelling_mid_render_drops_pending_snapshots() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let mut tl = small_timeline();
    let token = CancellationToken::new();
    add_track(
        &mut tl,
        Clip::new(
            "cancel",
            FrameSpan::new(0, 10),
            Box::new(CancelOnPrepare(token.clone())),
        )
        .unwrap(),
    );
    add_track(&mut tl, solid_clip(0, 10, Rgba8::opaque(0, 0, 255)));

    // the bottom track prepares first, then the top one cancels
    let out = manager
        .render(&mut tl, RenderRequest::new(8, 8), &token)
        .unwrap();
    assert!(matches!(out, RenderOutcome::Cancelled));
    assert!(manager.latest_frame().is_none());
    assert!(tl.tracks().iter().all(|t| t.pending().is_none()));
}

#[test]
fn cancelled_render_publishes_nothing() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let mut tl = small_timeline();
    add_track(&mut tl, solid_clip(0, 10, Rgba8::opaque(0, 0, 255)));
    let token = CancellationToken::new();
    token.clone().cancel();
    let out = manager
        .render(&mut tl, RenderRequest::new(8, 8), &token)
        .unwrap();
    assert!(matches!(out, RenderOutcome::Cancelled));
    assert!(manager.latest_frame().is_none());
    assert!(!manager.is_rendering());
}

#[test]
fn parallel_matches_sequential() {
    let sequential = RenderManager::new(RenderSettings::default()).unwrap();
    let parallel = RenderManager::new(RenderSettings {
        threading: RenderThreading {
            parallel: true,
            threads: Some(2),
        },
        ..Default::default()
    })
    .unwrap();

    let mut tl = small_timeline();
    for i in 0..4u8 {
        let c = Clip::new(
            "solid",
            FrameSpan::new(0, 10),
            Box::new(
                SolidColorContent::new(Rgba8::new(60 * i, 0, 0, 128))
                    .with_size(kurbo::Vec2::new(4.0 + f64::from(i), 4.0)),
            ),
        )
        .unwrap();
        add_track(&mut tl, c);
    }
    let a = render(&sequential, &mut tl).unwrap();
    let b = render(&parallel, &mut tl).unwrap();
    assert_eq!(a.frame().unwrap().data, b.frame().unwrap().data);
}

#[test]
fn zero_sized_request_is_rejected() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let mut tl = small_timeline();
    let err = manager
        .render(&mut tl, RenderRequest::new(0, 8), &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, ReelError::Validation(_)));
}

#[test]
fn completion_callbacks_receive_the_published_frame() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.subscribe(move |e| {
        if let RenderEvent::RenderCompleted(f) = e {
            sink.lock().unwrap().push(f.frame);
        }
    });
    let mut tl = small_timeline();
    render(&manager, &mut tl).unwrap();
    tl.set_playhead(3).unwrap();
    render(&manager, &mut tl).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![0, 3]);
    assert_eq!(manager.stats().frames_rendered, 2);
    assert!(manager.average_render_millis() >= 0.0);
}

#[test]
fn suspended_invalidation_coalesces_into_one_request() {
    let manager = RenderManager::new(RenderSettings::default()).unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    manager.subscribe(move |e| {
        if matches!(e, RenderEvent::RenderRequested) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    let mut tl = small_timeline();
    manager.connect(&mut tl);

    {
        let _hold = manager.suspend_invalidation();
        assert!(manager.is_invalidation_suspended());
        tl.set_playhead(1).unwrap();
        tl.set_playhead(2).unwrap();
        assert!(!manager.invalidate_render());
        assert_eq!(requests.load(Ordering::SeqCst), 0);
    }
    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert!(manager.take_render_request());
    assert!(!manager.take_render_request());

    assert!(manager.invalidate_render());
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}
