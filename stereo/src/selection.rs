//! Winner-take-all selection over the fused tableaus.

use crate::cost::CostVolume;
use crate::dynamic::{DirectionalTableaus, ScanDirection};
use crate::DisparityGrid;
use rayon::prelude::*;

/// Each tableau holds the local cost once, so the sum of four counts it
/// four times; two of them are removed.
#[inline]
pub fn fused_score(left: i32, right: i32, top: i32, bottom: i32, cost: u8) -> i32 {
    left + right + top + bottom - 2 * cost as i32
}

/// Best disparity of one cell and its fused score. Ties keep the smallest disparity.
pub fn select_disparity(
    left: &[i32],
    right: &[i32],
    top: &[i32],
    bottom: &[i32],
    cost: &[u8],
) -> (u8, i32) {
    let mut best_disp = 0u8;
    let mut best_score = i32::MAX;
    for d in 0..cost.len() {
        let score = fused_score(left[d], right[d], top[d], bottom[d], cost[d]);
        if score < best_score {
            best_score = score;
            best_disp = d as u8;
        }
    }
    (best_disp, best_score)
}

pub fn select_disparities(
    tableaus: &DirectionalTableaus,
    cost: &CostVolume,
    output: &mut DisparityGrid,
) {
    let width = output.width;
    let dm = cost.disp_max();
    let stride = width * dm;
    let left = tableaus.tableau(ScanDirection::LeftToRight);
    let right = tableaus.tableau(ScanDirection::RightToLeft);
    let top = tableaus.tableau(ScanDirection::TopToBottom);
    let bottom = tableaus.tableau(ScanDirection::BottomToTop);
    let costs = cost.as_slice();

    output
        .data
        .par_chunks_mut(width)
        .zip(output.errors.par_chunks_mut(width))
        .enumerate()
        .for_each(|(v, (disp_row, err_row))| {
            for u in 0..width {
                let base = v * stride + u * dm;
                let range = base..base + dm;
                let (d, score) = select_disparity(
                    &left[range.clone()],
                    &right[range.clone()],
                    &top[range.clone()],
                    &bottom[range.clone()],
                    &costs[range],
                );
                disp_row[u] = d;
                err_row[u] = score;
            }
        });
}
