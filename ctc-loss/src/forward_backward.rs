//! Alpha/beta recursions of the CTC dynamic program, in log space.
//!
//! Tables are laid out `T x (2L+1)` for a single sequence. The padded batch
//! variant interleaves sequences on the time axis: sequence `s` at padded
//! time `t` lives in row `t * num_sequences + s`, and every recurrence bound
//! comes from that sequence's own frame count and expanded length, never from
//! the padded maxima.

use crate::expand::PaddedLabels;
use ctc_utils::{log_add, LOG_ZERO};
use ndarray::Array2;

/// Forward table over `log_probs` (`T x C`, log scale) and an expanded label
/// sequence. Fully overwrites `alpha`, which must be `T x (2L+1)`.
pub fn alpha_single(alpha: &mut Array2<f64>, log_probs: &Array2<f64>, expanded: &[usize]) {
    let num_frames = log_probs.nrows();
    let num_states = expanded.len();
    alpha.fill(LOG_ZERO);

    alpha[[0, 0]] = log_probs[[0, expanded[0]]];
    if num_states > 1 {
        alpha[[0, 1]] = log_probs[[0, expanded[1]]];
    }
    for t in 1..num_frames {
        for s in 0..num_states {
            let mut sum = alpha[[t - 1, s]];
            if s >= 1 {
                sum = log_add(sum, alpha[[t - 1, s - 1]]);
            }
            // skip over the previous blank, unless the two-back label repeats
            if s >= 2 && s % 2 == 1 && expanded[s] != expanded[s - 2] {
                sum = log_add(sum, alpha[[t - 1, s - 2]]);
            }
            alpha[[t, s]] = sum + log_probs[[t, expanded[s]]];
        }
    }
}

/// Backward table, mirror of [`alpha_single`]. `beta(t, s)` excludes the
/// emission at frame `t` itself, so the frame-0 likelihood cross-check is
/// `log_add(beta(0,0) + log p(0, blank), beta(0,1) + log p(0, y1))`.
pub fn beta_single(beta: &mut Array2<f64>, log_probs: &Array2<f64>, expanded: &[usize]) {
    let num_frames = log_probs.nrows();
    let num_states = expanded.len();
    beta.fill(LOG_ZERO);

    beta[[num_frames - 1, num_states - 1]] = 0.0;
    if num_states > 1 {
        beta[[num_frames - 1, num_states - 2]] = 0.0;
    }
    for t in (0..num_frames - 1).rev() {
        for s in (0..num_states).rev() {
            let mut sum = beta[[t + 1, s]] + log_probs[[t + 1, expanded[s]]];
            if s + 1 < num_states {
                sum = log_add(sum, beta[[t + 1, s + 1]] + log_probs[[t + 1, expanded[s + 1]]]);
            }
            if s + 2 < num_states && s % 2 == 1 && expanded[s] != expanded[s + 2] {
                sum = log_add(sum, beta[[t + 1, s + 2]] + log_probs[[t + 1, expanded[s + 2]]]);
            }
            beta[[t, s]] = sum;
        }
    }
}

/// Total sequence log-likelihood read off the last alpha row: the two valid
/// ending states are the trailing blank and the last label run.
pub fn log_likelihood_single(alpha: &Array2<f64>, num_states: usize) -> f64 {
    let last = alpha.nrows() - 1;
    let mut like = alpha[[last, num_states - 1]];
    if num_states > 1 {
        like = log_add(like, alpha[[last, num_states - 2]]);
    }
    like
}

/// Forward tables for a padded batch, all sequences advanced together at each
/// padded time step. `alpha` must be `(T_max * N) x max_exp_len`.
pub fn alpha_mseq(
    alpha: &mut Array2<f64>,
    log_probs: &Array2<f64>,
    labels: &PaddedLabels,
    frame_num_utt: &[usize],
) {
    let num_seq = frame_num_utt.len();
    let max_frames = frame_num_utt.iter().copied().max().unwrap_or(0);
    alpha.fill(LOG_ZERO);

    for t in 0..max_frames {
        for s in 0..num_seq {
            if t >= frame_num_utt[s] {
                continue;
            }
            let row = t * num_seq + s;
            let num_states = labels.exp_len(s);
            if t == 0 {
                alpha[[row, 0]] = log_probs[[row, labels.label_at(s, 0)]];
                if num_states > 1 {
                    alpha[[row, 1]] = log_probs[[row, labels.label_at(s, 1)]];
                }
                continue;
            }
            let prev = (t - 1) * num_seq + s;
            for u in 0..num_states {
                let mut sum = alpha[[prev, u]];
                if u >= 1 {
                    sum = log_add(sum, alpha[[prev, u - 1]]);
                }
                if u >= 2 && u % 2 == 1 && labels.label_at(s, u) != labels.label_at(s, u - 2) {
                    sum = log_add(sum, alpha[[prev, u - 2]]);
                }
                alpha[[row, u]] = sum + log_probs[[row, labels.label_at(s, u)]];
            }
        }
    }
}

/// Backward tables for a padded batch; each sequence's boundary sits at its
/// own last valid frame and last two valid expanded positions.
pub fn beta_mseq(
    beta: &mut Array2<f64>,
    log_probs: &Array2<f64>,
    labels: &PaddedLabels,
    frame_num_utt: &[usize],
) {
    let num_seq = frame_num_utt.len();
    let max_frames = frame_num_utt.iter().copied().max().unwrap_or(0);
    beta.fill(LOG_ZERO);

    for t in (0..max_frames).rev() {
        for s in 0..num_seq {
            if t >= frame_num_utt[s] {
                continue;
            }
            let row = t * num_seq + s;
            let num_states = labels.exp_len(s);
            if t == frame_num_utt[s] - 1 {
                beta[[row, num_states - 1]] = 0.0;
                if num_states > 1 {
                    beta[[row, num_states - 2]] = 0.0;
                }
                continue;
            }
            let next = (t + 1) * num_seq + s;
            for u in (0..num_states).rev() {
                let mut sum = beta[[next, u]] + log_probs[[next, labels.label_at(s, u)]];
                if u + 1 < num_states {
                    sum = log_add(
                        sum,
                        beta[[next, u + 1]] + log_probs[[next, labels.label_at(s, u + 1)]],
                    );
                }
                if u + 2 < num_states
                    && u % 2 == 1
                    && labels.label_at(s, u) != labels.label_at(s, u + 2)
                {
                    sum = log_add(
                        sum,
                        beta[[next, u + 2]] + log_probs[[next, labels.label_at(s, u + 2)]],
                    );
                }
                beta[[row, u]] = sum;
            }
        }
    }
}

/// Per-sequence log-likelihoods of a padded batch, each read at that
/// sequence's own last valid frame and expanded-length boundary.
pub fn log_likelihood_mseq(
    alpha: &Array2<f64>,
    labels: &PaddedLabels,
    frame_num_utt: &[usize],
) -> Vec<f64> {
    let num_seq = frame_num_utt.len();
    (0..num_seq)
        .map(|s| {
            let row = (frame_num_utt[s] - 1) * num_seq + s;
            let num_states = labels.exp_len(s);
            let mut like = alpha[[row, num_states - 1]];
            if num_states > 1 {
                like = log_add(like, alpha[[row, num_states - 2]]);
            }
            like
        })
        .collect()
}
