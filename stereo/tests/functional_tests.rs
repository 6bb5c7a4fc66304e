use gcam_core::{Eucm, Transformation};
use gcam_stereo::synthetic::{plane_distance_grid, rectangle, render_view, NoiseTexture, PlanarTarget};
use gcam_stereo::*;
use image::GrayImage;
use nalgebra::{Point2, Vector3};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const PLANE_DISTANCE: f64 = 1.0;

fn camera() -> Eucm {
    Eucm::new(0.5, 1.0, 100.0, 100.0, 80.0, 60.0)
}

fn baseline() -> Transformation {
    Transformation::from_translation(Vector3::new(0.2, 0.0, 0.0))
}

fn target() -> PlanarTarget {
    PlanarTarget::new(
        Transformation::from_translation(Vector3::new(0.0, 0.0, PLANE_DISTANCE)),
        0.35,
        0.25,
        NoiseTexture::new(11, 20.0),
    )
}

fn stereo_pair(pose: &Transformation) -> (GrayImage, GrayImage) {
    let cam = camera();
    let target = target();
    let background = NoiseTexture::new(23, 25.0);
    let img1 = render_view(&cam, &Transformation::identity(), WIDTH, HEIGHT, &target, &background);
    let img2 = render_view(&cam, pose, WIDTH, HEIGHT, &target, &background);
    (img1, img2)
}

/// Background next to the plane that camera 2 at `tx` cannot see.
fn occlusion_margin(tx: f64) -> Vec<Vector3<f64>> {
    if tx > 0.0 {
        rectangle(-0.65, 0.43, -0.33, 0.33)
    } else {
        rectangle(-0.43, 0.65, -0.33, 0.33)
    }
}

/// Fractions of plane cells within 10% of the truth and of background cells at max distance.
fn plane_scores(params: &StereoParameters, distance: &DistanceGrid, tx: f64) -> (f64, f64) {
    let cam = camera();
    let target = target();
    let inner = plane_distance_grid(&cam, params, &target.pose, &rectangle(-0.29, 0.29, -0.19, 0.19));
    let outer = plane_distance_grid(&cam, params, &target.pose, &occlusion_margin(tx));

    let (mut inside, mut inside_ok, mut outside, mut outside_ok) = (0, 0, 0, 0);
    for v in 0..distance.height {
        for u in 0..distance.width {
            let truth = inner.get(u, v);
            let estimate = distance.get(u, v);
            if truth > 0.0 {
                inside += 1;
                if ((estimate - truth) / truth).abs() < 0.1 {
                    inside_ok += 1;
                }
            } else if outer.get(u, v) == 0.0 {
                outside += 1;
                if estimate == params.max_distance {
                    outside_ok += 1;
                }
            }
        }
    }
    assert!(inside > 100 && outside > 100);
    (
        inside_ok as f64 / inside as f64,
        outside_ok as f64 / outside as f64,
    )
}

#[test]
fn test_fronto_parallel_plane_curve_profile() {
    let pose = baseline();
    let (img1, img2) = stereo_pair(&pose);
    let params = StereoParameters::new(WIDTH, HEIGHT).with_disparity_max(32);
    let mut stereo = CurveStereo::new(pose, camera(), camera(), params.clone()).unwrap();

    let distance = stereo.compute_distance(&img1, &img2).unwrap();
    let (inside, outside) = plane_scores(&params, &distance, 0.2);
    assert!(inside > 0.85, "plane recovered on {:.1}% of cells", inside * 100.0);
    assert!(outside > 0.85, "background at infinity on {:.1}% of cells", outside * 100.0);
}

#[test]
fn test_fronto_parallel_plane_block() {
    let pose = baseline();
    let (img1, img2) = stereo_pair(&pose);
    let params = StereoParameters::new(WIDTH, HEIGHT)
        .with_disparity_max(32)
        .with_cost_strategy(CostStrategy::Block);
    let mut stereo = CurveStereo::new(pose, camera(), camera(), params.clone()).unwrap();

    let distance = stereo.compute_distance(&img1, &img2).unwrap();
    let (inside, outside) = plane_scores(&params, &distance, 0.2);
    assert!(inside > 0.75, "plane recovered on {:.1}% of cells", inside * 100.0);
    assert!(outside > 0.75, "background at infinity on {:.1}% of cells", outside * 100.0);
}

#[test]
fn test_fronto_parallel_plane_block_with_camera_two_on_the_left() {
    let pose = Transformation::from_translation(Vector3::new(-0.2, 0.0, 0.0));
    let (img1, img2) = stereo_pair(&pose);
    for strategy in [CostStrategy::Block, CostStrategy::CurveProfile] {
        let params = StereoParameters::new(WIDTH, HEIGHT)
            .with_disparity_max(32)
            .with_cost_strategy(strategy);
        let mut stereo = CurveStereo::new(pose, camera(), camera(), params.clone()).unwrap();

        let distance = stereo.compute_distance(&img1, &img2).unwrap();
        let (inside, outside) = plane_scores(&params, &distance, -0.2);
        assert!(inside > 0.75, "{strategy:?}: plane recovered on {:.1}% of cells", inside * 100.0);
        assert!(outside > 0.75, "{strategy:?}: background at infinity on {:.1}% of cells", outside * 100.0);
    }
}

#[test]
fn test_plane_center_disparity() {
    let pose = baseline();
    let (img1, img2) = stereo_pair(&pose);
    let params = StereoParameters::new(WIDTH, HEIGHT).with_disparity_max(32);
    let mut stereo = CurveStereo::new(pose, camera(), camera(), params).unwrap();
    let disparity = stereo.compute_disparity(&img1, &img2).unwrap();

    // center of the plane: about 20 px of parallax
    let (u, v) = (26, 20);
    let d = disparity.get(u, v) as i32;
    assert!((18..=22).contains(&d), "disparity {d}");
    assert!(disparity.error(u, v) >= 0);

    let mut raster = stereo.rasterizer(u, v).unwrap();
    let start = raster.pixel();
    raster.steps(d);
    assert!(raster.x() < start.0);
}

#[test]
fn test_zero_baseline_never_triangulates() {
    let cam = camera();
    let params = StereoParameters::new(WIDTH, HEIGHT);
    let triangulator = Triangulator::new(cam, cam, Transformation::identity());
    for v in 0..params.disp_height() {
        for u in 0..params.disp_width() {
            let p = Point2::new(params.u_img(u) as f64, params.v_img(v) as f64);
            let result = triangulator.triangulate(&p, &p);
            assert!(matches!(result, Err(Error::DegenerateGeometry(_))), "({u}, {v})");
        }
    }

    let engine = CurveStereo::new(Transformation::identity(), cam, cam, params);
    assert!(matches!(engine, Err(Error::DegenerateGeometry(_))));
}

#[test]
fn test_forward_motion_sees_a_static_scene_at_infinity() {
    let cam = Eucm::new(0.6, 1.0, 100.0, 100.0, 80.0, 60.0);
    let pose = Transformation::from_translation(Vector3::new(0.0, 0.0, 0.3));
    let img = NoiseTexture::new(4, 0.25).to_image(WIDTH, HEIGHT);
    let params = StereoParameters::new(WIDTH, HEIGHT).with_disparity_max(16);
    let mut stereo = CurveStereo::new(pose, cam, cam, params).unwrap();
    assert_eq!(stereo.epipolar().heading(), Heading::Away);

    let disparity = stereo.compute_disparity(&img, &img).unwrap();
    let zeros = disparity.data.iter().filter(|&&d| d == 0).count();
    assert!(zeros as f64 > 0.6 * disparity.data.len() as f64);
}

#[test]
fn test_configuration_from_json() {
    let params: StereoParameters = serde_json::from_str(
        r#"{ "image_width": 160, "image_height": 120, "scale": 4, "lambda_jump": 20 }"#,
    )
    .unwrap();
    let stereo = CurveStereo::new(baseline(), camera(), camera(), params).unwrap();
    assert_eq!(stereo.params().disp_max, 48);
    assert_eq!(stereo.grid().width(), 40);
    assert_eq!(stereo.epipolar().num_buckets(), 2000);
}
