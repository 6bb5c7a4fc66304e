//! Stereo engine tying the stages together.

use crate::cost::{block_cost, curve_profile_cost, CostVolume};
use crate::dynamic::DirectionalTableaus;
use crate::epipolar::EpipolarCurves;
use crate::grid::SampleGrid;
use crate::params::{CostStrategy, StereoParameters};
use crate::rasterizer::CurveRasterizer;
use crate::selection::select_disparities;
use crate::triangulation::Triangulator;
use crate::{DisparityGrid, DistanceGrid, Error, Result};
use gcam_core::{CameraModel, Eucm, Transformation};
use image::GrayImage;
use nalgebra::{Point2, Vector3};
use rayon::prelude::*;
use tracing::{debug, trace, warn};

/// Scratch buffers owned by one engine; resized only on reconfiguration.
#[derive(Debug, Clone)]
struct Buffers {
    cost: CostVolume,
    tableaus: DirectionalTableaus,
    disparity: DisparityGrid,
    distance: DistanceGrid,
}

impl Buffers {
    fn new(params: &StereoParameters) -> Self {
        let (w, h, dm) = (params.disp_width(), params.disp_height(), params.disp_count());
        Self {
            cost: CostVolume::new(w, h, dm),
            tableaus: DirectionalTableaus::new(w, h, dm),
            disparity: DisparityGrid::new(w, h, dm),
            distance: DistanceGrid::for_params(params),
        }
    }

    fn ensure(&mut self, params: &StereoParameters) {
        let (w, h, dm) = (params.disp_width(), params.disp_height(), params.disp_count());
        if !self.cost.same_shape(w, h, dm) {
            self.cost = CostVolume::new(w, h, dm);
        }
        if !self.tableaus.same_shape(w, h, dm) {
            self.tableaus = DirectionalTableaus::new(w, h, dm);
        }
        if self.disparity.width != w || self.disparity.height != h || self.disparity.disp_max != dm {
            self.disparity = DisparityGrid::new(w, h, dm);
        }
        let distance = &self.distance;
        if distance.width != w
            || distance.height != h
            || distance.scale != params.scale
            || distance.u0 != params.u0()
            || distance.v0 != params.v0()
        {
            self.distance = DistanceGrid::for_params(params);
        }
    }
}

/// Curve-based stereo for a fixed EUCM camera pair and relative pose.
///
/// Curves and per-sample caches are built once; each call to
/// [`compute_disparity`](Self::compute_disparity) reuses them together
/// with the engine's buffers. An engine handles one frame pair at a time.
#[derive(Debug, Clone)]
pub struct CurveStereo {
    params: StereoParameters,
    transform: Transformation,
    cam1: Eucm,
    cam2: Eucm,
    epipolar: EpipolarCurves,
    grid: SampleGrid,
    triangulator: Triangulator<Eucm, Eucm>,
    buffers: Buffers,
}

impl CurveStereo {
    /// `transform` is the pose of camera 2 in camera 1 (`X1 = R X2 + t`).
    pub fn new(
        transform: Transformation,
        cam1: Eucm,
        cam2: Eucm,
        params: StereoParameters,
    ) -> Result<Self> {
        params.validate()?;
        Eucm::from_params(&cam1.params())?;
        Eucm::from_params(&cam2.params())?;

        let epipolar = EpipolarCurves::new(&transform, &cam2, params.num_buckets)?;
        let grid = SampleGrid::new(&cam1, &cam2, &transform, &params, &epipolar);
        let buffers = Buffers::new(&params);
        debug!(
            width = params.disp_width(),
            height = params.disp_height(),
            disp_max = params.disp_max,
            strategy = ?params.cost_strategy,
            "stereo engine created"
        );

        Ok(Self {
            triangulator: Triangulator::new(cam1, cam2, transform),
            params,
            transform,
            cam1,
            cam2,
            epipolar,
            grid,
            buffers,
        })
    }

    /// Swap parameters, rebuilding only what depends on the changed fields.
    pub fn reconfigure(&mut self, params: StereoParameters) -> Result<()> {
        params.validate()?;
        let buckets_changed = params.num_buckets != self.params.num_buckets;
        if buckets_changed {
            self.epipolar = EpipolarCurves::new(&self.transform, &self.cam2, params.num_buckets)?;
        }
        if buckets_changed || !params.same_grid(&self.params) {
            self.grid = SampleGrid::new(&self.cam1, &self.cam2, &self.transform, &params, &self.epipolar);
        }
        self.buffers.ensure(&params);
        debug!(?buckets_changed, "stereo engine reconfigured");
        self.params = params;
        Ok(())
    }

    fn check_images(&self, img1: &GrayImage, img2: &GrayImage) -> Result<()> {
        let expected = (self.params.image_width, self.params.image_height);
        for (name, img) in [("first", img1), ("second", img2)] {
            if img.dimensions() != expected {
                return Err(Error::DimensionMismatch(format!(
                    "{name} image is {}x{}, expected {}x{}",
                    img.width(),
                    img.height(),
                    expected.0,
                    expected.1
                )));
            }
        }
        Ok(())
    }

    /// Fill the cost volume; returns the number of samples left at zero cost.
    pub fn compute_cost(&mut self, img1: &GrayImage, img2: &GrayImage) -> Result<usize> {
        self.check_images(img1, img2)?;
        debug!(strategy = ?self.params.cost_strategy, "matching cost");
        let volume = &mut self.buffers.cost;
        let degenerate = match self.params.cost_strategy {
            CostStrategy::CurveProfile => {
                curve_profile_cost(img1, img2, &self.grid, &self.epipolar, &self.params, volume)
            }
            CostStrategy::Block => {
                block_cost(img1, img2, &self.grid, &self.epipolar, &self.params, volume)
            }
        };
        if degenerate > 0 {
            warn!(
                degenerate,
                total = self.grid.len(),
                "samples without a usable epipolar curve match every disparity at zero cost"
            );
        }
        Ok(degenerate)
    }

    pub fn compute_dynamic_programming(&mut self) -> Result<()> {
        self.buffers.tableaus.compute(
            &self.buffers.cost,
            self.params.lambda_step,
            self.params.lambda_jump,
        )
    }

    pub fn select_disparity(&mut self) {
        debug!("disparity selection");
        select_disparities(
            &self.buffers.tableaus,
            &self.buffers.cost,
            &mut self.buffers.disparity,
        );
    }

    /// Disparity of every grid cell, held in the engine until the next frame.
    pub fn compute_disparity(&mut self, img1: &GrayImage, img2: &GrayImage) -> Result<&DisparityGrid> {
        self.compute_cost(img1, img2)?;
        self.compute_dynamic_programming()?;
        self.select_disparity();
        Ok(&self.buffers.disparity)
    }

    /// Distance of every grid cell, held in the engine until the next frame.
    pub fn compute_distance(&mut self, img1: &GrayImage, img2: &GrayImage) -> Result<&DistanceGrid> {
        self.compute_cost(img1, img2)?;
        self.compute_dynamic_programming()?;
        self.select_disparity();
        debug!("distance");

        let Self {
            params,
            epipolar,
            grid,
            triangulator,
            buffers,
            ..
        } = &mut *self;
        let (params, epipolar, grid, triangulator) = (&*params, &*epipolar, &*grid, &*triangulator);
        let disparity = &buffers.disparity;
        let distance = &mut buffers.distance;
        let width = distance.width;
        distance
            .data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(v, row)| {
                for (u, cell) in row.iter_mut().enumerate() {
                    *cell = cell_distance(params, grid, epipolar, triangulator, disparity.get(u, v), u, v);
                }
            });
        Ok(&self.buffers.distance)
    }

    /// Distance of cell `(u, v)` from the last selected disparity.
    ///
    /// Zero disparity gives `max_distance`; a failed triangulation gives `0.0`.
    pub fn distance_at(&self, u: usize, v: usize) -> f64 {
        cell_distance(
            &self.params,
            &self.grid,
            &self.epipolar,
            &self.triangulator,
            self.buffers.disparity.get(u, v),
            u,
            v,
        )
    }

    pub fn triangulate(&self, p1: &Point2<f64>, p2: &Point2<f64>) -> Result<Vector3<f64>> {
        self.triangulator.triangulate(p1, p2)
    }

    /// Rasterizer along the epipolar curve of grid cell `(u, v)`, at disparity zero.
    pub fn rasterizer(&self, u: usize, v: usize) -> Option<CurveRasterizer> {
        self.grid.rasterizer(self.grid.index(u, v), &self.epipolar)
    }

    /// Draw the curve of cell `(u, v)` from its anchor to the epipole in black.
    pub fn trace_epipolar_curve(&self, u: usize, v: usize, out: &mut GrayImage) {
        let idx = self.grid.index(u, v);
        let (anchor, mut raster) = match (
            self.grid.sample(idx).anchor,
            self.grid.rasterizer(idx, &self.epipolar),
        ) {
            (Some(anchor), Some(raster)) => (anchor, raster),
            _ => return,
        };
        let (ex, ey) = self.epipolar.epipole_px();
        let count = (((anchor.0 - ex) as f64).powi(2) + ((anchor.1 - ey) as f64).powi(2)).sqrt() as usize;
        let (w, h) = (out.width() as i32, out.height() as i32);
        for _ in 0..count {
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (x, y) = (raster.x() + dx, raster.y() + dy);
                if x >= 0 && y >= 0 && x < w && y < h {
                    out.put_pixel(x as u32, y as u32, image::Luma([0]));
                }
            }
            raster.step();
        }
    }

    pub fn params(&self) -> &StereoParameters {
        &self.params
    }

    pub fn transform(&self) -> &Transformation {
        &self.transform
    }

    pub fn epipolar(&self) -> &EpipolarCurves {
        &self.epipolar
    }

    pub fn grid(&self) -> &SampleGrid {
        &self.grid
    }

    pub fn cost_volume(&self) -> &CostVolume {
        &self.buffers.cost
    }

    pub fn tableaus(&self) -> &DirectionalTableaus {
        &self.buffers.tableaus
    }

    pub fn disparity(&self) -> &DisparityGrid {
        &self.buffers.disparity
    }

    pub fn distance(&self) -> &DistanceGrid {
        &self.buffers.distance
    }
}

fn cell_distance(
    params: &StereoParameters,
    grid: &SampleGrid,
    epipolar: &EpipolarCurves,
    triangulator: &Triangulator<Eucm, Eucm>,
    disparity: u8,
    u: usize,
    v: usize,
) -> f64 {
    if disparity == 0 {
        return params.max_distance;
    }
    let idx = grid.index(u, v);
    let mut raster = match grid.rasterizer(idx, epipolar) {
        Some(raster) => raster,
        None => return 0.0,
    };
    raster.steps(disparity as i32);
    let p1 = grid.sample(idx).point;
    let p2 = Point2::new(raster.x() as f64, raster.y() as f64);
    match triangulator.triangulate(&p1, &p2) {
        Ok(x) => x.norm(),
        Err(e) => {
            if params.verbosity > 2 {
                trace!(u, v, disparity, error = %e, "no distance");
            }
            0.0
        }
    }
}
