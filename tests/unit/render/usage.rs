use super::*;
use std::sync::{Arc, Barrier};

#[test]
fn reader_fails_before_first_frame() {
    let g = UsageGuard::new();
    assert!(!g.try_begin_read());
    assert_eq!(g.state(), UsageState::Idle);
}

#[test]
fn reader_and_writer_exclude_each_other() {
    let g = UsageGuard::new();
    assert!(g.try_begin_write());
    assert!(!g.try_begin_read());
    assert!(!g.try_begin_write());
    g.complete_write();

    assert!(g.try_begin_read());
    assert!(g.try_begin_read());
    assert_eq!(g.state(), UsageState::Reading(2));
    assert!(!g.try_begin_write());
    g.complete_read();
    g.complete_read();
    assert_eq!(g.state(), UsageState::Ready);
    assert!(g.try_begin_write());
}

#[test]
fn aborted_write_hides_the_surface() {
    let g = UsageGuard::new();
    assert!(g.try_begin_write());
    g.complete_write();
    assert!(g.try_begin_write());
    g.abort_write();
    assert!(!g.has_frame());
    assert!(!g.try_begin_read());
}

#[test]
fn later_reader_succeeds_after_completion() {
    let g = Arc::new(UsageGuard::new());
    assert!(g.try_begin_write());
    g.complete_write();
    assert!(g.try_begin_read());
    g.complete_read();
    let other = Arc::clone(&g);
    let ok = std::thread::spawn(move || {
        let ok = other.try_begin_read();
        if ok {
            other.complete_read();
        }
        ok
    })
    .join()
    .unwrap();
    assert!(ok);
}

#[test]
fn concurrent_writer_and_reader_never_both_succeed() {
    for _ in 0..200 {
        let g = Arc::new(UsageGuard::new());
        assert!(g.try_begin_write());
        g.complete_write();

        let barrier = Arc::new(Barrier::new(2));
        let (gw, bw) = (Arc::clone(&g), Arc::clone(&barrier));
        let writer = std::thread::spawn(move || {
            bw.wait();
            gw.try_begin_write()
        });
        let (gr, br) = (Arc::clone(&g), Arc::clone(&barrier));
        let reader = std::thread::spawn(move || {
            br.wait();
            gr.try_begin_read()
        });
        let w = writer.join().unwrap();
        let r = reader.join().unwrap();
        assert!(!(w && r), "writer and reader both acquired");
        assert!(w || r);
    }
}
