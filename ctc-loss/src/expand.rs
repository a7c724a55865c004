use anyhow::{anyhow, Result};

/// Class index reserved for the CTC blank.
pub const BLANK: usize = 0;

/// Sentinel filling the padded tail of short sequences in a batched label
/// buffer. Never equal to a real class index, so padded positions can never
/// match a posterior column.
pub const PAD_LABEL: usize = usize::MAX;

/// Expands a reference label sequence of length `L` into the CTC state
/// sequence of length `2L+1`: `[blank, y1, blank, y2, ..., yL, blank]`.
pub fn expand_label(label: &[usize], num_classes: usize) -> Result<Vec<usize>> {
    let mut expanded = vec![BLANK; 2 * label.len() + 1];
    for (l, &class) in label.iter().enumerate() {
        if class >= num_classes {
            return Err(anyhow!(
                "label {} at position {} is out of range ({} classes)",
                class,
                l,
                num_classes
            ));
        }
        expanded[2 * l + 1] = class;
    }
    Ok(expanded)
}

/// Expanded label sequences of a batch, packed into one fixed-stride buffer.
#[derive(Debug, Clone)]
pub struct PaddedLabels {
    buffer: Vec<usize>,
    max_exp_len: usize,
    exp_lens: Vec<usize>,
}

impl PaddedLabels {
    pub fn num_sequences(&self) -> usize {
        self.exp_lens.len()
    }

    /// Stride between consecutive sequences' slots, `2 * max(L_i) + 1`.
    pub fn max_exp_len(&self) -> usize {
        self.max_exp_len
    }

    /// Expanded length `2 * L_i + 1` of sequence `seq`.
    pub fn exp_len(&self, seq: usize) -> usize {
        self.exp_lens[seq]
    }

    /// Expanded label at position `pos` of sequence `seq`; [`PAD_LABEL`] in
    /// the padded tail.
    pub fn label_at(&self, seq: usize, pos: usize) -> usize {
        self.buffer[seq * self.max_exp_len + pos]
    }
}

/// Batched form of [`expand_label`]: each sequence's expansion occupies a slot
/// of `2 * max(L_i) + 1` entries, padded with [`PAD_LABEL`] so the recurrences
/// can never read another sequence's labels through a short slot.
pub fn expand_labels_padded(labels: &[Vec<usize>], num_classes: usize) -> Result<PaddedLabels> {
    let max_label_len = labels.iter().map(|l| l.len()).max().unwrap_or(0);
    let max_exp_len = 2 * max_label_len + 1;

    let mut buffer = vec![PAD_LABEL; labels.len() * max_exp_len];
    let mut exp_lens = Vec::with_capacity(labels.len());
    for (s, label) in labels.iter().enumerate() {
        let slot = &mut buffer[s * max_exp_len..(s + 1) * max_exp_len];
        for (l, &class) in label.iter().enumerate() {
            if class >= num_classes {
                return Err(anyhow!(
                    "sequence {}: label {} at position {} is out of range ({} classes)",
                    s,
                    class,
                    l,
                    num_classes
                ));
            }
            slot[2 * l] = BLANK;
            slot[2 * l + 1] = class;
        }
        slot[2 * label.len()] = BLANK;
        exp_lens.push(2 * label.len() + 1);
    }

    Ok(PaddedLabels {
        buffer,
        max_exp_len,
        exp_lens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_label() {
        assert_eq!(expand_label(&[], 4).unwrap(), vec![0]);
        assert_eq!(expand_label(&[2], 4).unwrap(), vec![0, 2, 0]);
        // expansion is independent of repeated classes
        assert_eq!(
            expand_label(&[1, 2, 1], 4).unwrap(),
            vec![0, 1, 0, 2, 0, 1, 0]
        );
    }

    #[test]
    fn test_expand_label_out_of_range() {
        assert!(expand_label(&[4], 4).is_err());
        assert!(expand_label(&[1, 2, 7], 4).is_err());
    }

    #[test]
    fn test_expand_labels_padded() {
        let padded =
            expand_labels_padded(&[vec![1, 2, 3], vec![2]], 5).unwrap();
        assert_eq!(padded.num_sequences(), 2);
        assert_eq!(padded.max_exp_len(), 7);
        assert_eq!(padded.exp_len(0), 7);
        assert_eq!(padded.exp_len(1), 3);

        let seq0: Vec<usize> = (0..7).map(|p| padded.label_at(0, p)).collect();
        assert_eq!(seq0, vec![0, 1, 0, 2, 0, 3, 0]);
        let seq1: Vec<usize> = (0..7).map(|p| padded.label_at(1, p)).collect();
        assert_eq!(
            seq1,
            vec![0, 2, 0, PAD_LABEL, PAD_LABEL, PAD_LABEL, PAD_LABEL]
        );
    }

    #[test]
    fn test_expand_labels_padded_out_of_range() {
        assert!(expand_labels_padded(&[vec![1], vec![9]], 5).is_err());
    }
}
