//! Running training statistics and the per-utterance gradient acceptance
//! policies. A [`CtcStats`] value is owned by the caller and passed into
//! every evaluation/scoring call; workers that cannot share one serialize
//! their access or keep one tracker each and [`CtcStats::merge`] externally.

use crate::config::GradPolicy;
use log::{info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Total loss outside this range marks a numerically broken utterance.
const LOSS_SANE_MAX: f64 = 3000.0;
/// Deviation bound, in window sigmas, of the average-loss check.
const LOSS_SIGMA_BOUND: f64 = 6.0;

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct CtcStats {
    /// Cumulative objective, sum of per-sequence `-log P(z|x)`.
    pub obj: f64,
    pub frames: usize,
    pub sequences: usize,
    /// Cumulative edit-distance errors and reference-token count.
    pub error_num: usize,
    pub ref_num: usize,

    // progress window, reset after each report
    pub obj_progress: f64,
    pub frames_progress: usize,
    pub sequences_progress: usize,
    pub error_num_progress: usize,
    pub ref_num_progress: usize,

    // rolling per-frame loss window of the average-loss check
    pub normal_num: usize,
    pub loss_sum: f64,
    pub loss_sum_bak: f64,
    pub loss_square_sum: f64,
    pub loss_square_sum_bak: f64,
}

impl CtcStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Folds another tracker into this one. Counters and window sums add;
    /// the merged window behaves as if both trackers' accepted utterances
    /// had been seen by one.
    pub fn merge(&mut self, other: &CtcStats) {
        self.obj += other.obj;
        self.frames += other.frames;
        self.sequences += other.sequences;
        self.error_num += other.error_num;
        self.ref_num += other.ref_num;
        self.obj_progress += other.obj_progress;
        self.frames_progress += other.frames_progress;
        self.sequences_progress += other.sequences_progress;
        self.error_num_progress += other.error_num_progress;
        self.ref_num_progress += other.ref_num_progress;
        self.normal_num += other.normal_num;
        self.loss_sum += other.loss_sum;
        self.loss_sum_bak += other.loss_sum_bak;
        self.loss_square_sum += other.loss_square_sum;
        self.loss_square_sum_bak += other.loss_square_sum_bak;
    }

    /// Cumulative summary: objective per sequence, per frame, token accuracy.
    pub fn report(&self) -> String {
        format!(
            " Obj(log[Pzx]) = {} Obj(frame) = {} TOKEN_ACCURACY >> {} % <<",
            self.obj / self.sequences as f64,
            self.obj / self.frames as f64,
            100.0 * (1.0 - self.error_num as f64 / self.ref_num as f64)
        )
    }

    /// Emits the periodic progress line and resets the progress window once
    /// `report_step` sequences have been processed since the last report.
    pub(crate) fn progress_report(&mut self, report_step: usize) {
        if self.sequences_progress < report_step {
            return;
        }
        info!(
            "Progress {} sequences ({:.2}Hr): Obj(log[Pzx]) = {} Obj(frame) = {} TokenAcc = {} %",
            self.sequences,
            self.frames as f64 / (100.0 * 3600.0),
            self.obj_progress / self.sequences_progress as f64,
            self.obj_progress / self.frames_progress as f64,
            100.0 * (1.0 - self.error_num_progress as f64 / self.ref_num_progress as f64)
        );
        self.sequences_progress = 0;
        self.frames_progress = 0;
        self.obj_progress = 0.0;
        self.error_num_progress = 0;
        self.ref_num_progress = 0;
    }

    fn accept(&mut self, loss: f64) {
        self.obj += loss;
        self.obj_progress += loss;
    }
}

fn utt_id(utt: &[String], s: usize) -> &str {
    utt.get(s).map(String::as_str).unwrap_or("?")
}

fn zero_sequence_rows(diff: &mut Array2<f32>, seq: usize, num_seq: usize, frames: usize) {
    for t in 0..frames {
        diff.row_mut(t * num_seq + seq).fill(0.0);
    }
}

/// Applies the configured acceptance policy to a batch gradient: updates the
/// running statistics with each utterance's loss, zeroes the gradient rows of
/// rejected utterances, and finally zeroes the whole buffer if its sum is not
/// finite.
pub(crate) fn apply_grad_policy(
    policy: GradPolicy,
    stat_period: usize,
    utt: &[String],
    frame_num_utt: &[usize],
    losses: &[f64],
    diff: &mut Array2<f32>,
    stats: &mut CtcStats,
) {
    let num_seq = frame_num_utt.len();
    match policy {
        GradPolicy::StatOnly => {
            for s in 0..num_seq {
                stats.accept(losses[s]);
            }
        }
        GradPolicy::SumLossCheck => {
            for s in 0..num_seq {
                if losses[s] < 0.0 || losses[s] > LOSS_SANE_MAX {
                    warn!(
                        "sequence {} loss is abnormal ({}), dropping its gradient and stats",
                        utt_id(utt, s),
                        losses[s]
                    );
                    zero_sequence_rows(diff, s, num_seq, frame_num_utt[s]);
                } else {
                    stats.accept(losses[s]);
                }
            }
        }
        GradPolicy::AvgLossCheck => {
            for s in 0..num_seq {
                avg_loss_check(stat_period, utt, frame_num_utt, losses, diff, stats, s);
            }
        }
    }
    for s in 0..num_seq {
        stats.frames += frame_num_utt[s];
        stats.frames_progress += frame_num_utt[s];
    }
    stats.sequences += num_seq;
    stats.sequences_progress += num_seq;

    // last line of defense: never export NaN/Inf to the model
    let grad_sum: f64 = diff.iter().map(|&v| v as f64).sum();
    if !grad_sum.is_finite() {
        warn!("gradient sum is not finite, zeroing the whole batch gradient");
        diff.fill(0.0);
    }
}

fn avg_loss_check(
    stat_period: usize,
    utt: &[String],
    frame_num_utt: &[usize],
    losses: &[f64],
    diff: &mut Array2<f32>,
    stats: &mut CtcStats,
    s: usize,
) {
    let loss = losses[s];
    let in_range = loss.is_finite() && loss > 0.0 && loss < LOSS_SANE_MAX;
    let per_frame = loss / frame_num_utt[s] as f64;

    // bootstrap: accumulate the first half-window unconditionally, so the
    // window statistics exist before any division happens
    if stats.normal_num < stat_period / 2 {
        if in_range {
            stats.normal_num += 1;
            stats.loss_sum += per_frame;
            stats.loss_sum_bak += per_frame;
            stats.loss_square_sum += per_frame * per_frame;
            stats.loss_square_sum_bak += per_frame * per_frame;
            stats.accept(loss);
        }
        return;
    }

    let mean = stats.loss_sum / stats.normal_num as f64;
    let sigma = (stats.loss_square_sum / stats.normal_num as f64).sqrt();
    if in_range
        && per_frame >= mean - LOSS_SIGMA_BOUND * sigma
        && per_frame <= mean + LOSS_SIGMA_BOUND * sigma
    {
        stats.normal_num += 1;
        stats.loss_sum += per_frame;
        stats.loss_square_sum += per_frame * per_frame;
        stats.accept(loss);
        // half-window renormalization: forget the older half of the window
        if stats.normal_num == stat_period {
            stats.loss_sum -= stats.loss_sum_bak;
            stats.loss_square_sum -= stats.loss_square_sum_bak;
            stats.loss_sum_bak = stats.loss_sum;
            stats.loss_square_sum_bak = stats.loss_square_sum;
            stats.normal_num = stat_period / 2;
        }
    } else {
        warn!(
            "sequence {} loss is abnormal (sum {} per_frame {} mean {} sigma {}), \
             dropping its gradient and stats",
            utt_id(utt, s),
            loss,
            per_frame,
            mean,
            sigma
        );
        zero_sequence_rows(diff, s, frame_num_utt.len(), frame_num_utt[s]);
    }
}
