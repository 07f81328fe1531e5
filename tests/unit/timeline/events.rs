use super::*;
use std::sync::{Arc, Mutex};

#[test]
fn handlers_run_in_subscription_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut bus = EventBus::<i32>::new();
    for tag in ["a", "b"] {
        let log = Arc::clone(&log);
        bus.subscribe(move |e| log.lock().unwrap().push(format!("{tag}{e}")));
    }
    bus.emit(&1);
    assert_eq!(*log.lock().unwrap(), ["a1", "b1"]);
}

#[test]
fn unsubscribe_stops_delivery() {
    let hits = Arc::new(Mutex::new(0));
    let mut bus = EventBus::<()>::new();
    let h = Arc::clone(&hits);
    let id = bus.subscribe(move |_| *h.lock().unwrap() += 1);
    bus.emit(&());
    assert!(bus.unsubscribe(id));
    assert!(!bus.unsubscribe(id));
    bus.emit(&());
    assert_eq!(*hits.lock().unwrap(), 1);
    assert!(bus.is_empty());
}

#[test]
fn clip_target_reports_its_track() {
    let t = TrackId::from_raw(7);
    let c = ClipId::from_raw(3);
    assert_eq!(AutomationTarget::Clip { track: t, clip: c }.track(), t);
    assert_eq!(AutomationTarget::Track(t).track(), t);
}
