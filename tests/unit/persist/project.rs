use super::*;
use crate::foundation::core::{FrameSpan, Rgba8};
use crate::render::content::SolidColorContent;
use crate::timeline::clip::Clip;
use crate::timeline::track::Track;

fn sample() -> Timeline {
    let mut tl = Timeline::new(TimelineSettings {
        resolution: (320, 180),
        ..TimelineSettings::default()
    });
    let track = Track::new("V1");
    let id = track.id();
    tl.add_track(track).unwrap();
    let clip = Clip::new(
        "red",
        FrameSpan::new(0, 48),
        Box::new(SolidColorContent::new(Rgba8::opaque(255, 0, 0))),
    )
    .unwrap();
    tl.add_clip(id, clip).unwrap();
    tl.set_playhead(12).unwrap();
    tl
}

#[test]
fn dict_round_trip_keeps_resolution_and_clips() {
    let root = project_dict(&sample());
    let back = timeline_from_dict(&root, &ContentRegistry::with_builtins()).unwrap();
    assert_eq!(back.resolution(), (320, 180));
    assert_eq!(back.playhead(), 12);
    assert_eq!(back.tracks()[0].clips()[0].name(), "red");
}

#[test]
fn unknown_version_is_rejected() {
    let mut root = project_dict(&sample());
    root.set("Version", 99i32);
    let err = timeline_from_dict(&root, &ContentRegistry::with_builtins()).unwrap_err();
    assert!(matches!(err, ReelError::Serde(_)));
}

#[test]
fn zero_width_is_rejected() {
    let mut root = project_dict(&sample());
    root.set("Width", 0i64);
    assert!(timeline_from_dict(&root, &ContentRegistry::with_builtins()).is_err());
}

#[test]
fn file_round_trip() {
    let path = std::env::temp_dir().join(format!("reel-project-{}.reel", std::process::id()));
    save_project(&path, &sample()).unwrap();
    let back = load_project(&path, &ContentRegistry::with_builtins()).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(back.track_count(), 1);
    assert!(!back.is_modified());
}
