//! Integer walker along an implicit conic.

use crate::epipolar::Conic;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Direction of forward steps relative to the target pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Heading {
    Toward,
    Away,
}

/// Walks a conic one pixel at a time.
///
/// Each move advances by one pixel along the dominant axis of the curve
/// tangent and picks the minor offset keeping `|F|` smallest. Visited
/// pixels are remembered, so `steps(k)` followed by `steps(-k)` always
/// lands where it started.
#[derive(Debug, Clone)]
pub struct CurveRasterizer {
    conic: Conic,
    target: (i32, i32),
    heading: Heading,
    orientation: f64,
    trail: VecDeque<(i32, i32)>,
    cursor: usize,
}

impl CurveRasterizer {
    pub fn new(start: (i32, i32), target: (i32, i32), conic: Conic, heading: Heading) -> Self {
        let mut raster = Self {
            conic,
            target,
            heading,
            orientation: 1.0,
            trail: VecDeque::from([start]),
            cursor: 0,
        };
        let (tx, ty) = raster.raw_tangent(start);
        let (dx, dy) = raster.target_direction(start);
        if tx * dx + ty * dy < 0.0 {
            raster.orientation = -1.0;
        }
        raster
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.trail[self.cursor].0
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.trail[self.cursor].1
    }

    pub fn pixel(&self) -> (i32, i32) {
        self.trail[self.cursor]
    }

    pub fn heading(&self) -> Heading {
        self.heading
    }

    /// Advance one pixel along the heading.
    pub fn step(&mut self) {
        if self.cursor + 1 < self.trail.len() {
            self.cursor += 1;
            return;
        }
        let next = self.neighbour(self.pixel(), 1.0);
        self.trail.push_back(next);
        self.cursor += 1;
    }

    /// Retreat one pixel.
    pub fn step_back(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            return;
        }
        let prev = self.neighbour(self.pixel(), -1.0);
        self.trail.push_front(prev);
    }

    pub fn steps(&mut self, k: i32) {
        if k >= 0 {
            for _ in 0..k {
                self.step();
            }
        } else {
            for _ in 0..k.unsigned_abs() {
                self.step_back();
            }
        }
    }

    fn raw_tangent(&self, (x, y): (i32, i32)) -> (f64, f64) {
        let (gu, gv) = self.conic.gradient(x as f64, y as f64);
        (-gv, gu)
    }

    fn target_direction(&self, (x, y): (i32, i32)) -> (f64, f64) {
        let dx = (self.target.0 - x) as f64;
        let dy = (self.target.1 - y) as f64;
        match self.heading {
            Heading::Toward => (dx, dy),
            Heading::Away => (-dx, -dy),
        }
    }

    fn neighbour(&self, from: (i32, i32), direction: f64) -> (i32, i32) {
        let (mut tx, mut ty) = self.raw_tangent(from);
        tx *= self.orientation * direction;
        ty *= self.orientation * direction;
        if tx.abs() < f64::EPSILON && ty.abs() < f64::EPSILON {
            let (dx, dy) = self.target_direction(from);
            tx = dx * direction;
            ty = dy * direction;
            if tx == 0.0 && ty == 0.0 {
                tx = direction;
            }
        }

        let minor_sign = |t: f64| if t < 0.0 { -1 } else { 1 };
        let candidates = if tx.abs() >= ty.abs() {
            let x = from.0 + minor_sign(tx);
            let sy = minor_sign(ty);
            [(x, from.1), (x, from.1 + sy), (x, from.1 - sy)]
        } else {
            let y = from.1 + minor_sign(ty);
            let sx = minor_sign(tx);
            [(from.0, y), (from.0 + sx, y), (from.0 - sx, y)]
        };

        let mut best = candidates[0];
        let mut best_err = self.error(best);
        for &candidate in &candidates[1..] {
            let err = self.error(candidate);
            if err < best_err {
                best = candidate;
                best_err = err;
            }
        }
        best
    }

    #[inline]
    fn error(&self, (x, y): (i32, i32)) -> f64 {
        self.conic.eval(x as f64, y as f64).abs()
    }
}
