use std::sync::Arc;

use super::*;
use crate::render::canvas::EncodedFormat;

fn image() -> EncodedImage {
    EncodedImage {
        width: 1,
        height: 1,
        format: EncodedFormat::Png,
        bytes: Arc::new(vec![1, 2, 3]),
    }
}

#[test]
fn new_record_is_idle() {
    let record = ProgressRecord::new();
    let snap = record.snapshot();
    assert_eq!(snap.state, SessionState::Idle);
    assert!(!snap.is_running);
}

#[test]
fn begin_is_single_flight() {
    let record = ProgressRecord::new();
    let g1 = record.begin(Progress::new(0, 100, "starting")).unwrap();
    assert!(record.begin(Progress::new(0, 100, "starting")).is_none());
    assert!(record.snapshot().is_running);

    assert!(record.finish(g1, SessionState::Completed, Progress::new(100, 100, "completed"), |_| {}));
    let g2 = record.begin(Progress::new(0, 100, "starting")).unwrap();
    assert!(g2 > g1);
}

#[test]
fn stale_generation_cannot_mutate_or_finish() {
    let record = ProgressRecord::new();
    let g1 = record.begin(Progress::new(0, 100, "starting")).unwrap();
    record.finish(g1, SessionState::TimedOut, Progress::failed("timed out"), |_| {});
    let g2 = record.begin(Progress::new(0, 100, "starting")).unwrap();

    assert_eq!(record.update(g1, |p| p.set(50, 100, "late")), None);
    assert!(!record.finish(g1, SessionState::Completed, Progress::new(100, 100, "late"), |_| {
        panic!("stale finish callback must not run")
    }));
    assert_eq!(record.update(g2, |p| p.set(40, 100, "rendering")), Some(()));

    let snap = record.snapshot();
    assert_eq!(snap.progress.current, 40);
    assert_eq!(snap.progress.message, "rendering");
    assert_eq!(snap.state, SessionState::Running);
}

#[test]
fn finish_runs_once() {
    let record = ProgressRecord::new();
    let g = record.begin(Progress::new(0, 100, "starting")).unwrap();
    let mut calls = 0;
    assert!(record.finish(g, SessionState::Failed, Progress::failed("boom"), |_| calls += 1));
    assert!(!record.finish(g, SessionState::TimedOut, Progress::failed("x"), |_| calls += 1));
    assert_eq!(calls, 1);

    let snap = record.snapshot();
    assert_eq!(snap.state, SessionState::Failed);
    assert!(!snap.is_running);
    assert!(!snap.progress.success);
    assert_eq!(snap.progress.message, "failed: boom");
}

#[test]
fn snapshot_serializes_camel_case_with_base64_image() {
    let record = ProgressRecord::new();
    let g = record.begin(Progress::new(0, 100, "starting")).unwrap();
    record.finish(
        g,
        SessionState::Completed,
        Progress::new(100, 100, "completed").with_image(image()),
        |_| {},
    );
    let json = serde_json::to_value(record.snapshot()).unwrap();
    assert_eq!(json["current"], 100);
    assert_eq!(json["imageData"], "AQID");
    assert_eq!(json["isRunning"], false);
    assert_eq!(json["state"], "completed");
    assert_eq!(json["success"], true);
}

#[test]
fn image_data_is_omitted_when_absent() {
    let json = serde_json::to_value(Progress::new(1, 2, "x")).unwrap();
    assert!(json.get("imageData").is_none());
}
