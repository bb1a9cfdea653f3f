mod common;

use approx::assert_relative_eq;
use calib_ar::{
    select_all, CalibrationEngine, CalibrationError, CalibrationSeeds, FrameStream, ImageSize,
    MemorySource, PlanarSolver, SelectedFrame,
};
use common::*;

fn engine(detector: Lookup) -> CalibrationEngine<Lookup, PlanarSolver> {
    CalibrationEngine::new(detector, PlanarSolver::default())
}

#[test]
fn five_frames_in_all_mode() {
    let mut stream = FrameStream::open(MemorySource::new(tagged_frames(5)), "memory").unwrap();
    let selected = select_all(&mut stream);
    assert_eq!(selected.len(), 5);
    assert!(selected.iter().all(|s| s.corners().is_none()));

    let model = engine(Lookup::all())
        .calibrate(&selected, pattern(), cell(), &CalibrationSeeds::default())
        .unwrap();

    assert_eq!(model.extrinsics.len(), 5);
    assert!(model.rms >= 0.0);
    assert!(model.rms < 1e-3, "rms = {}", model.rms);
    assert_eq!(model.image_size, ImageSize::new(WIDTH, HEIGHT));

    let k = model.intrinsic_matrix();
    assert_relative_eq!(k[(0, 0)], 620.0, epsilon = 0.5);
    assert_relative_eq!(k[(1, 1)], 610.0, epsilon = 0.5);
    assert_relative_eq!(k[(0, 2)], 322.0, epsilon = 0.5);
    assert_relative_eq!(k[(1, 2)], 236.0, epsilon = 0.5);
    assert_eq!(model.distortion().len(), 5);

    for (est, gt) in model.extrinsics.iter().zip(poses()) {
        assert_relative_eq!(est.translation, gt.translation, epsilon = 1e-3);
    }
}

#[test]
fn frames_without_a_board_are_skipped() {
    let mut detector = Lookup::all();
    detector.views[1] = None;
    detector.views[3] = None;
    let selected: Vec<_> = tagged_frames(5).into_iter().map(SelectedFrame::new).collect();

    let model = engine(detector)
        .calibrate(&selected, pattern(), cell(), &CalibrationSeeds::default())
        .unwrap();
    assert_eq!(model.extrinsics.len(), 3);
    assert!(model.rms >= 0.0);
}

#[test]
fn no_detections_is_an_error() {
    let selected: Vec<_> = tagged_frames(3).into_iter().map(SelectedFrame::new).collect();
    let err = engine(Lookup::none())
        .calibrate(&selected, pattern(), cell(), &CalibrationSeeds::default())
        .unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::InsufficientObservations {
            columns: 10,
            rows: 7
        }
    ));
}

#[test]
fn mixed_frame_sizes_fail_fast() {
    let mut frames = tagged_frames(4);
    frames[2] = tagged_frame(2, 320, 240);
    let selected: Vec<_> = frames.into_iter().map(SelectedFrame::new).collect();

    let err = engine(Lookup::all())
        .calibrate(&selected, pattern(), cell(), &CalibrationSeeds::default())
        .unwrap_err();
    match err {
        CalibrationError::FrameSizeMismatch {
            index,
            expected,
            found,
        } => {
            assert_eq!(index, 2);
            assert_eq!(expected, ImageSize::new(WIDTH, HEIGHT));
            assert_eq!(found, ImageSize::new(320, 240));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn undetected_frames_do_not_count_towards_size() {
    let mut detector = Lookup::all();
    detector.views[0] = None;
    let mut frames = tagged_frames(5);
    frames[0] = tagged_frame(0, 320, 240);
    let selected: Vec<_> = frames.into_iter().map(SelectedFrame::new).collect();

    let model = engine(detector)
        .calibrate(&selected, pattern(), cell(), &CalibrationSeeds::default())
        .unwrap();
    assert_eq!(model.extrinsics.len(), 4);
}
