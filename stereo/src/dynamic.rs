//! Four-direction dynamic-programming cost smoothing.

use crate::cost::CostVolume;
use crate::{Error, Result};
use rayon::prelude::*;
use tracing::debug;

/// One scan direction of the smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

impl ScanDirection {
    pub const ALL: [ScanDirection; 4] = [
        ScanDirection::LeftToRight,
        ScanDirection::RightToLeft,
        ScanDirection::TopToBottom,
        ScanDirection::BottomToTop,
    ];
}

/// One recurrence step along a scan line:
/// `out[d] = cost[d] + min(in[d], in[d ± 1] + step, min(in) + jump)`.
pub fn dynamic_step(input: &[i32], cost: &[u8], output: &mut [i32], lambda_step: i32, lambda_jump: i32) {
    let n = cost.len();
    let best = input.iter().take(n).copied().min().unwrap_or(0);
    let jump = best.saturating_add(lambda_jump);
    for d in 0..n {
        let mut val = input[d].min(jump);
        if d > 0 {
            val = val.min(input[d - 1].saturating_add(lambda_step));
        }
        if d + 1 < n {
            val = val.min(input[d + 1].saturating_add(lambda_step));
        }
        output[d] = val + cost[d] as i32;
    }
}

fn copy_cost(cost: &[u8], output: &mut [i32]) {
    for (out, &c) in output.iter_mut().zip(cost) {
        *out = c as i32;
    }
}

/// The four smoothed volumes, same layout as the cost volume.
#[derive(Debug, Clone, Default)]
pub struct DirectionalTableaus {
    width: usize,
    height: usize,
    disp_max: usize,
    left: Vec<i32>,
    right: Vec<i32>,
    top: Vec<i32>,
    bottom: Vec<i32>,
}

impl DirectionalTableaus {
    pub fn new(width: usize, height: usize, disp_max: usize) -> Self {
        let len = width * height * disp_max;
        Self {
            width,
            height,
            disp_max,
            left: vec![0; len],
            right: vec![0; len],
            top: vec![0; len],
            bottom: vec![0; len],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn disp_max(&self) -> usize {
        self.disp_max
    }

    pub fn tableau(&self, direction: ScanDirection) -> &[i32] {
        match direction {
            ScanDirection::LeftToRight => &self.left,
            ScanDirection::RightToLeft => &self.right,
            ScanDirection::TopToBottom => &self.top,
            ScanDirection::BottomToTop => &self.bottom,
        }
    }

    pub fn cell(&self, direction: ScanDirection, u: usize, v: usize) -> &[i32] {
        let base = (v * self.width + u) * self.disp_max;
        &self.tableau(direction)[base..base + self.disp_max]
    }

    pub(crate) fn same_shape(&self, width: usize, height: usize, disp_max: usize) -> bool {
        self.width == width && self.height == height && self.disp_max == disp_max
    }

    /// Run all four passes over `cost`; the directions run concurrently.
    pub fn compute(&mut self, cost: &CostVolume, lambda_step: i32, lambda_jump: i32) -> Result<()> {
        if !cost.same_shape(self.width, self.height, self.disp_max) {
            return Err(Error::DimensionMismatch(format!(
                "cost volume is {}x{}x{}, tableaus are {}x{}x{}",
                cost.width(),
                cost.height(),
                cost.disp_max(),
                self.width,
                self.height,
                self.disp_max
            )));
        }
        if self.width == 0 || self.height == 0 || self.disp_max == 0 {
            return Ok(());
        }
        debug!(
            width = self.width,
            height = self.height,
            disp_max = self.disp_max,
            "dynamic programming"
        );
        let (width, height, dm) = (self.width, self.height, self.disp_max);
        let costs = cost.as_slice();
        let Self {
            left,
            right,
            top,
            bottom,
            ..
        } = self;
        rayon::join(
            || {
                rayon::join(
                    || horizontal_pass(left, costs, width, dm, false, lambda_step, lambda_jump),
                    || horizontal_pass(right, costs, width, dm, true, lambda_step, lambda_jump),
                )
            },
            || {
                rayon::join(
                    || vertical_pass(top, costs, width, height, dm, false, lambda_step, lambda_jump),
                    || vertical_pass(bottom, costs, width, height, dm, true, lambda_step, lambda_jump),
                )
            },
        );
        Ok(())
    }
}

fn horizontal_pass(
    table: &mut [i32],
    costs: &[u8],
    width: usize,
    dm: usize,
    reverse: bool,
    lambda_step: i32,
    lambda_jump: i32,
) {
    let stride = width * dm;
    table
        .par_chunks_mut(stride)
        .zip(costs.par_chunks(stride))
        .for_each(|(row, cost_row)| {
            if reverse {
                let base = (width - 1) * dm;
                copy_cost(&cost_row[base..base + dm], &mut row[base..base + dm]);
                for u in (0..width - 1).rev() {
                    let (current, next) = row.split_at_mut((u + 1) * dm);
                    dynamic_step(
                        &next[..dm],
                        &cost_row[u * dm..(u + 1) * dm],
                        &mut current[u * dm..],
                        lambda_step,
                        lambda_jump,
                    );
                }
            } else {
                copy_cost(&cost_row[..dm], &mut row[..dm]);
                for u in 1..width {
                    let (previous, current) = row.split_at_mut(u * dm);
                    dynamic_step(
                        &previous[(u - 1) * dm..],
                        &cost_row[u * dm..(u + 1) * dm],
                        &mut current[..dm],
                        lambda_step,
                        lambda_jump,
                    );
                }
            }
        });
}

#[allow(clippy::too_many_arguments)]
fn vertical_pass(
    table: &mut [i32],
    costs: &[u8],
    width: usize,
    height: usize,
    dm: usize,
    reverse: bool,
    lambda_step: i32,
    lambda_jump: i32,
) {
    let stride = width * dm;
    let step_row = |input: &[i32], cost_row: &[u8], output: &mut [i32]| {
        output
            .par_chunks_mut(dm)
            .zip(input.par_chunks(dm))
            .zip(cost_row.par_chunks(dm))
            .for_each(|((out, inp), c)| dynamic_step(inp, c, out, lambda_step, lambda_jump));
    };

    if reverse {
        let base = (height - 1) * stride;
        copy_cost(&costs[base..base + stride], &mut table[base..base + stride]);
        for v in (0..height - 1).rev() {
            let (current, next) = table.split_at_mut((v + 1) * stride);
            step_row(
                &next[..stride],
                &costs[v * stride..(v + 1) * stride],
                &mut current[v * stride..],
            );
        }
    } else {
        copy_cost(&costs[..stride], &mut table[..stride]);
        for v in 1..height {
            let (previous, current) = table.split_at_mut(v * stride);
            step_row(
                &previous[(v - 1) * stride..],
                &costs[v * stride..(v + 1) * stride],
                &mut current[..stride],
            );
        }
    }
}
