use approx::assert_relative_eq;
use calib_ar_core::{object_points, BoardPattern, CellSize, ImagePointSet, ImageSize};
use calib_ar_solver::{
    estimate_pose, project_points, CalibrationSeeds, CalibrationSolver, Camera, Distortion,
    Intrinsics, LmOptions, Observation, PlanarSolver, Pose, SolverError, SolverFlags,
};
use nalgebra::{Point2, Vector3};

const SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

fn camera() -> Camera {
    Camera::new(
        Intrinsics::new(620.0, 610.0, 322.0, 236.0),
        Distortion {
            k1: -0.08,
            k2: 0.02,
            p1: 0.0005,
            p2: -0.0003,
            k3: 0.0,
        },
    )
}

fn poses() -> Vec<Pose> {
    vec![
        Pose::new(Vector3::new(0.10, -0.20, 0.02), Vector3::new(-0.11, -0.07, 0.55)),
        Pose::new(Vector3::new(-0.25, 0.05, 0.10), Vector3::new(-0.10, -0.08, 0.60)),
        Pose::new(Vector3::new(0.05, 0.30, -0.05), Vector3::new(-0.12, -0.06, 0.50)),
        Pose::new(Vector3::new(0.30, 0.15, 0.20), Vector3::new(-0.09, -0.09, 0.65)),
        Pose::new(Vector3::new(-0.15, -0.25, -0.15), Vector3::new(-0.13, -0.05, 0.58)),
    ]
}

fn observations(camera: &Camera, poses: &[Pose]) -> Vec<Observation> {
    let pattern = BoardPattern::new(10, 7).unwrap();
    let object = object_points(pattern, CellSize::new(0.025).unwrap());
    poses
        .iter()
        .map(|pose| {
            let image: ImagePointSet = project_points(camera, pose, object.points())
                .into_iter()
                .map(|p| Point2::new(p.x as f32, p.y as f32))
                .collect();
            Observation::new(object.clone(), image)
        })
        .collect()
}

#[test]
fn recovers_camera_from_five_views() {
    let cam = camera();
    let obs = observations(&cam, &poses());
    let result = PlanarSolver::default()
        .solve(&obs, SIZE, &CalibrationSeeds::default())
        .unwrap();

    assert_eq!(5, result.extrinsics.len());
    assert!(result.rms >= 0.0);
    // Corners are rounded to f32, so the fit is limited by that noise.
    assert!(result.rms < 1e-3, "rms = {}", result.rms);

    let k = result.camera.intrinsics;
    assert_relative_eq!(k.fx, 620.0, epsilon = 0.5);
    assert_relative_eq!(k.fy, 610.0, epsilon = 0.5);
    assert_relative_eq!(k.cx, 322.0, epsilon = 0.5);
    assert_relative_eq!(k.cy, 236.0, epsilon = 0.5);
    assert_relative_eq!(result.camera.distortion.k1, -0.08, epsilon = 1e-2);

    for (est, gt) in result.extrinsics.iter().zip(poses()) {
        assert_relative_eq!(est.rotation, gt.rotation, epsilon = 1e-3);
        assert_relative_eq!(est.translation, gt.translation, epsilon = 1e-3);
    }
    assert_eq!(5, result.distortion_coefficients().len());
}

#[test]
fn evaluation_budget_comes_from_lm_options() {
    let obs = observations(&camera(), &poses());
    let seeds = CalibrationSeeds::default();
    let full = PlanarSolver::default().solve(&obs, SIZE, &seeds).unwrap();
    let tight = PlanarSolver::new(LmOptions {
        patience: 1,
        ..LmOptions::default()
    })
    .solve(&obs, SIZE, &seeds)
    .unwrap();

    assert_eq!(5, tight.extrinsics.len());
    assert!(tight.rms.is_finite());
    assert!(tight.rms >= full.rms - 1e-9, "{} < {}", tight.rms, full.rms);

    let json = serde_json::to_string(&PlanarSolver::default()).unwrap();
    assert!(json.contains("\"patience\":100"), "{json}");
}

#[test]
fn single_view_still_calibrates() {
    let cam = Camera::new(Intrinsics::new(600.0, 600.0, 320.0, 240.0), Distortion::default());
    let obs = observations(&cam, &poses()[..1]);
    let result = PlanarSolver::default()
        .solve(&obs, SIZE, &CalibrationSeeds::default())
        .unwrap();
    assert_eq!(1, result.extrinsics.len());
    assert!(result.rms >= 0.0 && result.rms < 0.5, "rms = {}", result.rms);
}

#[test]
fn fixed_parameters_keep_their_seed() {
    let cam = camera();
    let obs = observations(&cam, &poses());
    let seeds = CalibrationSeeds {
        initial_intrinsics: Some(Intrinsics::new(600.0, 600.0, 320.0, 240.0)),
        initial_distortion: None,
        flags: SolverFlags {
            fix_principal_point: true,
            fix_aspect_ratio: true,
            zero_tangent_dist: true,
            fix_k3: true,
            ..Default::default()
        },
    };
    let result = PlanarSolver::default().solve(&obs, SIZE, &seeds).unwrap();
    let k = result.camera.intrinsics;
    assert_eq!(320.0, k.cx);
    assert_eq!(240.0, k.cy);
    assert_relative_eq!(k.fx, k.fy, epsilon = 1e-9);
    assert_eq!(0.0, result.camera.distortion.p1);
    assert_eq!(0.0, result.camera.distortion.p2);
    assert_eq!(0.0, result.camera.distortion.k3);
}

#[test]
fn fix_distortion_keeps_all_coefficients() {
    let cam = camera();
    let obs = observations(&cam, &poses());
    let seeds = CalibrationSeeds {
        initial_distortion: Some(Distortion {
            k1: 0.01,
            ..Default::default()
        }),
        flags: SolverFlags {
            fix_distortion: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = PlanarSolver::default().solve(&obs, SIZE, &seeds).unwrap();
    assert_eq!([0.01, 0.0, 0.0, 0.0, 0.0], result.camera.distortion.coefficients());
}

#[test]
fn degenerate_inputs_are_rejected() {
    let solver = PlanarSolver::default();
    let seeds = CalibrationSeeds::default();
    assert_eq!(
        Err(SolverError::NoObservations),
        solver.solve(&[], SIZE, &seeds)
    );

    let cam = camera();
    let mut obs = observations(&cam, &poses()[..2]);
    let short = obs[1].image.points()[1..].to_vec();
    obs[1].image = short.into();
    assert_eq!(
        Err(SolverError::PointCountMismatch {
            view: 1,
            object: 70,
            image: 69
        }),
        solver.solve(&obs, SIZE, &seeds)
    );

    let obs = observations(&cam, &poses()[..1]);
    let collapsed: ImagePointSet = vec![Point2::new(5.0f32, 5.0); 70].into();
    let bad = vec![Observation::new(obs[0].object.clone(), collapsed)];
    assert_eq!(
        Err(SolverError::DegenerateView { view: 0 }),
        solver.solve(&bad, SIZE, &seeds)
    );

    assert!(matches!(
        solver.solve(&obs, ImageSize::new(0, 480), &seeds),
        Err(SolverError::EmptyImage { .. })
    ));
}

#[test]
fn pose_is_recovered_with_known_camera() {
    let cam = camera();
    let pattern = BoardPattern::new(10, 7).unwrap();
    let object = object_points(pattern, CellSize::new(0.025).unwrap());
    for gt in poses() {
        let image = project_points(&cam, &gt, object.points());
        let pose = estimate_pose(&cam, object.points(), &image).unwrap();
        assert_relative_eq!(pose.rotation, gt.rotation, epsilon = 1e-6);
        assert_relative_eq!(pose.translation, gt.translation, epsilon = 1e-6);
    }
}

#[test]
fn pose_rejects_short_input() {
    let cam = camera();
    let pattern = BoardPattern::new(2, 2).unwrap();
    let object = object_points(pattern, CellSize::new(0.025).unwrap());
    let image = vec![Point2::new(1.0, 1.0); 3];
    assert!(estimate_pose(&cam, object.points(), &image).is_none());
}
