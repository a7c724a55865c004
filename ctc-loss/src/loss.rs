use crate::config::CtcConfig;
use crate::decode::{collapse_path, greedy_path};
use crate::expand::{expand_label, expand_labels_padded};
use crate::forward_backward::{
    alpha_mseq, alpha_single, beta_mseq, beta_single, log_likelihood_mseq, log_likelihood_single,
};
use crate::grad::{assemble_diff, clip_diff, ctc_error_mseq, ctc_error_single};
use crate::stats::{apply_grad_policy, CtcStats};
use anyhow::{anyhow, Result};
use ctc_utils::{edit_distance, safe_log};
use ndarray::Array2;

/// A per-sequence loss this far outside plausibility is clamped before it
/// reaches the running statistics.
const LOSS_CLAMP: f64 = 10000.0;

/// CTC training objective: forward-backward log-likelihood, output gradient,
/// and greedy decode scoring. One value owns the alpha/beta/error scratch
/// tables, reshaped and fully overwritten on every call; running statistics
/// live in a caller-owned [`CtcStats`].
pub struct CtcLoss {
    config: CtcConfig,
    alpha: Array2<f64>,
    beta: Array2<f64>,
    err: Array2<f64>,
}

impl CtcLoss {
    pub fn new(config: CtcConfig) -> Self {
        Self {
            config,
            alpha: Array2::zeros((0, 0)),
            beta: Array2::zeros((0, 0)),
            err: Array2::zeros((0, 0)),
        }
    }

    pub fn config(&self) -> &CtcConfig {
        &self.config
    }

    /// Evaluates one sequence: returns the `T x C` gradient of
    /// `-log P(label | input)` with respect to the model output, clipped to
    /// `[-1, 1]`, and folds the loss into `stats`.
    pub fn eval(
        &mut self,
        net_out: &Array2<f32>,
        label: &[usize],
        stats: &mut CtcStats,
    ) -> Result<Array2<f32>> {
        let (num_frames, num_classes) = net_out.dim();
        if num_frames == 0 || num_classes == 0 {
            return Err(anyhow!("empty posterior matrix ({}x{})", num_frames, num_classes));
        }
        let expanded = expand_label(label, num_classes)?;
        let num_states = expanded.len();

        let log_probs = net_out.mapv(|v| safe_log(v as f64));
        reshape(&mut self.alpha, num_frames, num_states);
        reshape(&mut self.beta, num_frames, num_states);
        alpha_single(&mut self.alpha, &log_probs, &expanded);
        beta_single(&mut self.beta, &log_probs, &expanded);
        let log_like = log_likelihood_single(&self.alpha, num_states);

        reshape(&mut self.err, num_frames, num_classes);
        ctc_error_single(&mut self.err, &self.alpha, &self.beta, &expanded, log_like);
        let mut diff = assemble_diff(&self.err, net_out);

        let loss = (-log_like).clamp(-LOSS_CLAMP, LOSS_CLAMP);
        apply_grad_policy(
            self.config.grad_policy,
            self.config.stat_period,
            &[],
            &[num_frames],
            &[loss],
            &mut diff,
            stats,
        );
        clip_diff(&mut diff);
        stats.progress_report(self.config.report_step);
        Ok(diff)
    }

    /// Batched evaluation over a padded layout where sequence `s` at padded
    /// time `t` occupies row `t * N + s`. Rows past a sequence's own frame
    /// count get a zero gradient. Rejected utterances are zeroed per the
    /// configured policy; their frames still advance the progress counters.
    pub fn eval_parallel(
        &mut self,
        utt: &[String],
        frame_num_utt: &[usize],
        net_out: &Array2<f32>,
        labels: &[Vec<usize>],
        stats: &mut CtcStats,
    ) -> Result<Array2<f32>> {
        let num_seq = frame_num_utt.len();
        let (num_frames, num_classes) = net_out.dim();
        if num_seq == 0 {
            return Err(anyhow!("empty batch"));
        }
        if labels.len() != num_seq {
            return Err(anyhow!(
                "{} label sequences for {} frame counts",
                labels.len(),
                num_seq
            ));
        }
        if num_frames == 0 || num_frames % num_seq != 0 {
            return Err(anyhow!(
                "padded frame count {} is not a multiple of {} sequences",
                num_frames,
                num_seq
            ));
        }
        let frames_per_seq = num_frames / num_seq;
        for (s, &frames) in frame_num_utt.iter().enumerate() {
            if frames == 0 || frames > frames_per_seq {
                return Err(anyhow!(
                    "sequence {}: frame count {} outside padded stride {}",
                    s,
                    frames,
                    frames_per_seq
                ));
            }
        }

        let padded = expand_labels_padded(labels, num_classes)?;
        let log_probs = net_out.mapv(|v| safe_log(v as f64));
        reshape(&mut self.alpha, num_frames, padded.max_exp_len());
        reshape(&mut self.beta, num_frames, padded.max_exp_len());
        alpha_mseq(&mut self.alpha, &log_probs, &padded, frame_num_utt);
        beta_mseq(&mut self.beta, &log_probs, &padded, frame_num_utt);
        let log_like = log_likelihood_mseq(&self.alpha, &padded, frame_num_utt);

        reshape(&mut self.err, num_frames, num_classes);
        ctc_error_mseq(
            &mut self.err,
            &self.alpha,
            &self.beta,
            &padded,
            frame_num_utt,
            &log_like,
        );
        let mut diff = assemble_diff(&self.err, net_out);

        let losses: Vec<f64> = log_like
            .iter()
            .map(|&like| (-like).clamp(-LOSS_CLAMP, LOSS_CLAMP))
            .collect();
        apply_grad_policy(
            self.config.grad_policy,
            self.config.stat_period,
            utt,
            frame_num_utt,
            &losses,
            &mut diff,
            stats,
        );
        clip_diff(&mut diff);
        stats.progress_report(self.config.report_step);
        Ok(diff)
    }

    /// Greedy decode of one sequence scored against its reference. Returns
    /// the token error rate in percent and the hypothesis sequence.
    pub fn error_rate(
        &self,
        net_out: &Array2<f32>,
        label: &[usize],
        stats: &mut CtcStats,
    ) -> Result<(f64, Vec<usize>)> {
        let (num_frames, num_classes) = net_out.dim();
        if num_frames == 0 || num_classes == 0 {
            return Err(anyhow!("empty posterior matrix ({}x{})", num_frames, num_classes));
        }
        let hyp = collapse_path(greedy_path(net_out));
        let counts = edit_distance(label, &hyp);
        stats.error_num += counts.total();
        stats.ref_num += label.len();
        stats.error_num_progress += counts.total();
        stats.ref_num_progress += label.len();
        let err_rate = 100.0 * counts.total() as f64 / label.len() as f64;
        Ok((err_rate, hyp))
    }

    /// Batched decode + score over the padded layout, accumulating into the
    /// running counters only.
    pub fn error_rate_mseq(
        &self,
        frame_num_utt: &[usize],
        net_out: &Array2<f32>,
        labels: &[Vec<usize>],
        stats: &mut CtcStats,
    ) -> Result<()> {
        let num_seq = frame_num_utt.len();
        let num_frames = net_out.nrows();
        if num_seq == 0 {
            return Err(anyhow!("empty batch"));
        }
        if labels.len() != num_seq {
            return Err(anyhow!(
                "{} label sequences for {} frame counts",
                labels.len(),
                num_seq
            ));
        }
        if num_frames == 0 || num_frames % num_seq != 0 {
            return Err(anyhow!(
                "padded frame count {} is not a multiple of {} sequences",
                num_frames,
                num_seq
            ));
        }
        let frames_per_seq = num_frames / num_seq;
        for (s, &frames) in frame_num_utt.iter().enumerate() {
            if frames == 0 || frames > frames_per_seq {
                return Err(anyhow!(
                    "sequence {}: frame count {} outside padded stride {}",
                    s,
                    frames,
                    frames_per_seq
                ));
            }
        }

        let path = greedy_path(net_out);
        for s in 0..num_seq {
            let hyp = collapse_path((0..frame_num_utt[s]).map(|t| path[t * num_seq + s]));
            let counts = edit_distance(&labels[s], &hyp);
            stats.error_num += counts.total();
            stats.ref_num += labels[s].len();
            stats.error_num_progress += counts.total();
            stats.ref_num_progress += labels[s].len();
        }
        Ok(())
    }
}

fn reshape(table: &mut Array2<f64>, rows: usize, cols: usize) {
    if table.dim() != (rows, cols) {
        *table = Array2::zeros((rows, cols));
    }
}
