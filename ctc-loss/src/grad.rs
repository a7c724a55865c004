//! Gradient of the negative log-likelihood with respect to the model output.
//!
//! `err(t, k)` accumulates the negated soft occupancy of class `k` at frame
//! `t`, `-sum_{s: exp[s]=k} exp(alpha + beta - log P)`. The softmax Jacobian
//! is folded in directly: `diff = err - y * rowsum(err)`, which equals
//! `y - gamma` in exact arithmetic.

use crate::expand::PaddedLabels;
use ctc_utils::safe_exp;
use ndarray::{Array2, Axis};

/// Fills `err` (`T x C`) from the single-sequence alpha/beta tables.
pub fn ctc_error_single(
    err: &mut Array2<f64>,
    alpha: &Array2<f64>,
    beta: &Array2<f64>,
    expanded: &[usize],
    log_like: f64,
) {
    err.fill(0.0);
    for t in 0..alpha.nrows() {
        for (s, &class) in expanded.iter().enumerate() {
            err[[t, class]] -= safe_exp(alpha[[t, s]] + beta[[t, s]] - log_like);
        }
    }
}

/// Batched form of [`ctc_error_single`]: each sequence is normalized by its
/// own log-likelihood, and rows past a sequence's frame count stay zero.
pub fn ctc_error_mseq(
    err: &mut Array2<f64>,
    alpha: &Array2<f64>,
    beta: &Array2<f64>,
    labels: &PaddedLabels,
    frame_num_utt: &[usize],
    log_like: &[f64],
) {
    let num_seq = frame_num_utt.len();
    err.fill(0.0);
    for s in 0..num_seq {
        for t in 0..frame_num_utt[s] {
            let row = t * num_seq + s;
            for u in 0..labels.exp_len(s) {
                let class = labels.label_at(s, u);
                err[[row, class]] -= safe_exp(alpha[[row, u]] + beta[[row, u]] - log_like[s]);
            }
        }
    }
}

/// Back-propagates `err` through the softmax: `diff = err - y * rowsum(err)`.
/// The result is not yet clipped; clipping happens after the acceptance
/// policy so a non-finite gradient is still detectable.
pub fn assemble_diff(err: &Array2<f64>, net_out: &Array2<f32>) -> Array2<f32> {
    let row_sum = err.sum_axis(Axis(1));
    Array2::from_shape_fn(err.dim(), |(t, k)| {
        (err[[t, k]] - net_out[[t, k]] as f64 * row_sum[t]) as f32
    })
}

/// Bounds every gradient entry to `[-1, 1]`.
pub fn clip_diff(diff: &mut Array2<f32>) {
    diff.mapv_inplace(|v| v.clamp(-1.0, 1.0));
}
