mod common;

use calib_ar::{
    ArObject, ArStyle, Frame, FrameStream, HeadlessSurface, Key, MemorySource, PoseOverlay,
};
use common::*;
use std::f64::consts::PI;

const GREEN: [u8; 3] = [0, 255, 0];

#[test]
fn frame_without_board_is_untouched() {
    let overlay = PoseOverlay::new(Lookup::none(), pattern(), ArObject::default());
    let original = tagged_frame(0, 200, 200);
    let mut frame = original.clone();
    assert!(!overlay.render(&mut frame));
    assert_eq!(frame, original);
}

#[test]
fn flat_ring_endpoints_sit_on_the_circle() {
    let ar = ArObject::default();
    let overlay = PoseOverlay::new(Square { cx: 100.0, cy: 100.0 }, pattern(), ar.clone());
    let mut frame = Frame::new(200, 200);
    assert!(overlay.render(&mut frame));

    for i in 0..ar.segments {
        let theta = 2.0 * PI * i as f64 / ar.segments as f64;
        for angle in [theta, theta + PI] {
            let x = (100.0 + ar.radius * angle.cos()) as u32;
            let y = (100.0 + ar.radius * angle.sin()) as u32;
            assert_eq!(frame.get_pixel(x, y).0, GREEN, "endpoint {i} at ({x}, {y})");
        }
    }
    // Diametric segments all pass through the centre.
    assert_eq!(frame.get_pixel(100, 100).0, GREEN);
    // Nothing is drawn outside the ring plus marker radius.
    assert_eq!(frame.get_pixel(100, 100 - 60).0, [0, 0, 0]);
    assert_eq!(frame.get_pixel(160, 100).0, [0, 0, 0]);
}

#[test]
fn custom_colour_and_radius() {
    let ar = ArObject {
        radius: 20.0,
        color: [255, 0, 0],
        ..ArObject::default()
    };
    let overlay = PoseOverlay::new(Square { cx: 50.0, cy: 50.0 }, pattern(), ar);
    let mut frame = Frame::new(100, 100);
    overlay.render(&mut frame);
    assert_eq!(frame.get_pixel(70, 50).0, [255, 0, 0]);
    assert_eq!(frame.get_pixel(30, 50).0, [255, 0, 0]);
    assert_eq!(frame.get_pixel(80, 50).0, [0, 0, 0]);
}

#[test]
fn extruded_object_uses_the_board_pose() {
    let ar = ArObject {
        style: ArStyle::Extruded,
        ..ArObject::default()
    };
    let overlay = PoseOverlay::new(Lookup::all(), pattern(), ar).with_camera(camera(), cell());
    let original = tagged_frame(0, WIDTH, HEIGHT);
    let mut frame = original.clone();
    assert!(overlay.render(&mut frame));
    assert_ne!(frame, original);

    // A cylinder in board space, not the image-space ring.
    let flat = PoseOverlay::new(Lookup::all(), pattern(), ArObject::default());
    let mut ring = original.clone();
    flat.render(&mut ring);
    assert_ne!(frame, ring);
}

#[test]
fn extruded_without_camera_draws_the_flat_ring() {
    let extruded = ArObject {
        style: ArStyle::Extruded,
        ..ArObject::default()
    };
    let a = PoseOverlay::new(Square { cx: 100.0, cy: 100.0 }, pattern(), extruded);
    let b = PoseOverlay::new(Square { cx: 100.0, cy: 100.0 }, pattern(), ArObject::default());
    let (mut fa, mut fb) = (Frame::new(200, 200), Frame::new(200, 200));
    a.render(&mut fa);
    b.render(&mut fb);
    assert_eq!(fa, fb);
}

#[test]
fn playback_stops_on_escape() {
    let overlay = PoseOverlay::new(Lookup::all(), pattern(), ArObject::default());
    let mut stream = FrameStream::open(MemorySource::new(tagged_frames(5)), "memory").unwrap();
    let mut surface = HeadlessSurface::new().idle(1).press(Key::Char('p')).press(Key::Escape);

    let summary = overlay.run(&mut stream, &mut surface, 10).unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.anchored, 3);
    assert!(summary.stopped);
    assert_eq!(surface.captions(), ["", "", ""]);
}

#[test]
fn playback_runs_to_end_of_stream() {
    let mut detector = Lookup::all();
    detector.views[2] = None;
    let overlay = PoseOverlay::new(detector, pattern(), ArObject::default());
    let mut stream = FrameStream::open(MemorySource::new(tagged_frames(5)), "memory").unwrap();
    let mut surface = HeadlessSurface::new();

    let summary = overlay.run(&mut stream, &mut surface, 10).unwrap();
    assert_eq!(summary.frames, 5);
    assert_eq!(summary.anchored, 4);
    assert!(!summary.stopped);
}

#[test]
fn huge_radius_renders_without_overflow() {
    let ar = ArObject {
        radius: 1e30,
        ..ArObject::default()
    };
    let overlay = PoseOverlay::new(Square { cx: 100.0, cy: 100.0 }, pattern(), ar);
    let mut frame = Frame::new(200, 200);
    let start = std::time::Instant::now();
    assert!(overlay.render(&mut frame));
    assert!(start.elapsed() < std::time::Duration::from_secs(2));
    // Every diameter still crosses the centre.
    assert_eq!(frame.get_pixel(100, 100).0, GREEN);
}

#[test]
fn extruded_object_close_to_the_camera_is_clipped() {
    let ar = ArObject {
        style: ArStyle::Extruded,
        height: 549.0,
        radius: 400.0,
        ..ArObject::default()
    };
    let overlay = PoseOverlay::new(Lookup::all(), pattern(), ar).with_camera(camera(), cell());
    let mut frame = tagged_frame(0, WIDTH, HEIGHT);
    let start = std::time::Instant::now();
    assert!(overlay.render(&mut frame));
    assert!(start.elapsed() < std::time::Duration::from_secs(2));
}
